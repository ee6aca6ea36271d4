//! Gemini REST adapter for the tutor capabilities.
//!
//! Builds `generateContent` requests with a declarative response schema per
//! call and parses the model's JSON reply at the boundary. Prompt text and
//! model choice live here and nowhere else.

use super::{
    AssessmentAnalysis, ChatReply, MemoryCard, PersonaUpdate, PlanSeed, Question, SpellingWord,
    SuggestedWord, TutorCapability, TutorError,
};
use crate::config::ModelConfig;
use crate::types::{
    AssessmentRecord, ChatTurn, GrammarSlip, LearningProfile, UserLevel, VocabularyWord,
};
use async_trait::async_trait;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub struct GeminiTutor {
    client: reqwest::Client,
    config: ModelConfig,
}

impl GeminiTutor {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// POST one `generateContent` request and return the reply text.
    async fn call(&self, parts: Vec<Value>, schema: Option<Value>) -> Result<String, TutorError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(TutorError::MissingApiKey)?;

        let mut generation_config = json!({
            "temperature": self.config.temperature,
            "topP": self.config.top_p,
            "topK": self.config.top_k,
        });
        if let Some(schema) = schema {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = schema;
        }

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&json!({
                "contents": [{"parts": parts}],
                "generationConfig": generation_config,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TutorError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if text.is_empty() {
            return Err(TutorError::Empty);
        }
        Ok(text)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: String,
        schema: Value,
    ) -> Result<T, TutorError> {
        let text = self.call(vec![json!({"text": prompt})], Some(schema)).await?;
        parse_reply(&text)
    }
}

/// Strip markdown fences the model sometimes wraps around JSON, then parse.
fn parse_reply<T: DeserializeOwned>(text: &str) -> Result<T, TutorError> {
    let cleaned = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(cleaned).map_err(|error| TutorError::Malformed(error.to_string()))
}

fn question_array_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "question": {"type": "STRING"},
                "options": {"type": "ARRAY", "items": {"type": "STRING"}},
                "correctAnswer": {"type": "STRING"}
            },
            "required": ["question", "options", "correctAnswer"]
        }
    })
}

fn word_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "word": {"type": "STRING"},
            "definition": {"type": "STRING"},
            "example": {"type": "STRING"}
        },
        "required": ["word", "definition", "example"]
    })
}

#[async_trait]
impl TutorCapability for GeminiTutor {
    async fn assessment_questions(
        &self,
        history: &[AssessmentRecord],
    ) -> Result<Vec<Question>, TutorError> {
        let weakness_hint = history
            .last()
            .filter(|record| !record.weaknesses.is_empty())
            .map(|record| {
                format!(
                    " The user has previously shown weaknesses in: {}. Test these areas while still covering a general range of topics.",
                    record.weaknesses.join(", ")
                )
            })
            .unwrap_or_default();
        let prompt = format!(
            "You are an English proficiency assessment tool. Generate an 8-question \
             multiple-choice test covering vocabulary, reading comprehension, and \
             grammar, spanning primary-school to university difficulty.{weakness_hint} \
             Vary the question formats. Respond with a JSON array."
        );
        let questions: Vec<Question> = self.call_json(prompt, question_array_schema()).await?;
        if questions.is_empty() {
            return Err(TutorError::Empty);
        }
        Ok(questions)
    }

    async fn assessment_from_context(
        &self,
        context: &str,
        level: UserLevel,
    ) -> Result<Vec<Question>, TutorError> {
        let prompt = format!(
            "Based on the following text, generate a 5-question multiple-choice \
             assessment for a user at the \"{level}\" level, testing vocabulary \
             from the text, comprehension of its main ideas, and one grammatical \
             structure it uses. Text: \"\"\"{context}\"\"\". Respond in JSON."
        );
        let questions: Vec<Question> = self.call_json(prompt, question_array_schema()).await?;
        if questions.is_empty() {
            return Err(TutorError::Empty);
        }
        Ok(questions)
    }

    async fn analyze_assessment(
        &self,
        answers: &BTreeMap<usize, String>,
    ) -> Result<AssessmentAnalysis, TutorError> {
        let prompt = format!(
            "Analyze these answers to an English proficiency test. Determine the \
             user's level ('Beginner', 'Intermediate', 'Advanced' or 'Proficient'), \
             their strengths and weaknesses, and 3 concrete recommendations. \
             Answers: {}. Respond in JSON.",
            serde_json::to_string(answers).unwrap_or_default()
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "level": {"type": "STRING", "enum": ["Beginner", "Intermediate", "Advanced", "Proficient"]},
                "strengths": {"type": "ARRAY", "items": {"type": "STRING"}},
                "weaknesses": {"type": "ARRAY", "items": {"type": "STRING"}},
                "recommendations": {"type": "ARRAY", "items": {"type": "STRING"}}
            },
            "required": ["level", "strengths", "weaknesses", "recommendations"]
        });
        self.call_json(prompt, schema).await
    }

    async fn quiz_questions(
        &self,
        topic: &str,
        level: UserLevel,
    ) -> Result<Vec<Question>, TutorError> {
        let prompt = format!(
            "Generate a 5-question multiple-choice quiz about \"{topic}\" for an \
             English learner at the \"{level}\" level. Each question has 4 \
             options and exactly one correct answer. Respond with a JSON array."
        );
        let questions: Vec<Question> = self.call_json(prompt, question_array_schema()).await?;
        if questions.is_empty() {
            return Err(TutorError::Empty);
        }
        Ok(questions)
    }

    async fn vocabulary_from_context(
        &self,
        context: &str,
        level: UserLevel,
    ) -> Result<Vec<SuggestedWord>, TutorError> {
        let prompt = format!(
            "From the provided text, identify 3-5 vocabulary words appropriate for \
             an English learner at the \"{level}\" level. For each, give a simple \
             definition and the sentence from the text where it appears. \
             Text: \"\"\"{context}\"\"\". Respond in JSON."
        );
        let schema = json!({"type": "ARRAY", "items": word_schema()});
        self.call_json(prompt, schema).await
    }

    async fn spelling_word(&self, level: UserLevel) -> Result<SpellingWord, TutorError> {
        let prompt = format!(
            "Provide a single, moderately challenging English word for a spelling \
             challenge at the \"{level}\" level. Avoid very simple words. Include \
             its definition and an example sentence. Respond in JSON."
        );
        let word: SpellingWord = self.call_json(prompt, word_schema()).await?;
        if word.word.is_empty() {
            return Err(TutorError::Empty);
        }
        Ok(word)
    }

    async fn chat_reply(
        &self,
        history: &[ChatTurn],
        profile: &LearningProfile,
    ) -> Result<ChatReply, TutorError> {
        let persona = &profile.profile.persona;
        let interest_hint = if persona.interests.is_empty() {
            String::new()
        } else {
            format!(
                " The user is interested in {}; work these topics in naturally.",
                persona.interests.join(", ")
            )
        };
        let transcript = history
            .iter()
            .map(|turn| {
                format!(
                    "{}: {}",
                    match turn.role {
                        crate::types::ChatRole::User => "user",
                        crate::types::ChatRole::Model => "tutor",
                    },
                    turn.text()
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You are an AI English tutor named Alex helping a student at the \
             \"{}\" level practice through conversation.{interest_hint} Below is \
             the conversation so far; reply to the last user message \
             conversationally, and also analyze that message for grammar, \
             spelling or style errors. Respond ONLY with a JSON object with keys \
             \"response\" (your reply) and \"corrections\" (array of \
             {{error, correction, explanation}}; empty if there are none).\n\n{transcript}",
            profile.profile.level
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "response": {"type": "STRING"},
                "corrections": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "error": {"type": "STRING"},
                            "correction": {"type": "STRING"},
                            "explanation": {"type": "STRING"}
                        },
                        "required": ["error", "correction", "explanation"]
                    }
                }
            },
            "required": ["response", "corrections"]
        });
        self.call_json(prompt, schema).await
    }

    async fn memory_cards(
        &self,
        recent_errors: &[GrammarSlip],
        recent_vocab: &[VocabularyWord],
    ) -> Result<Vec<MemoryCard>, TutorError> {
        let errors: Vec<Value> = recent_errors
            .iter()
            .map(|e| json!({"error": e.error, "correction": e.correction, "explanation": e.explanation}))
            .collect();
        let vocab: Vec<Value> = recent_vocab
            .iter()
            .map(|v| json!({"word": v.word, "definition": v.definition}))
            .collect();
        let prompt = format!(
            "Create 5 fill-in-the-blank challenge cards from a user's recent \
             grammar mistakes and learned vocabulary. For grammar, write a \
             sentence that tempts the user into their specific mistake and ask \
             for the correct word or phrase. For vocabulary, write a sentence \
             with the learned word missing and give the definition as a clue. \
             Each card has a category ('Grammar' or 'Vocabulary'), the challenge \
             sentence with a blank, the single-word answer, and a brief hint. \
             Recent errors: {}. Recent vocab: {}. Respond in JSON.",
            serde_json::to_string(&errors).unwrap_or_default(),
            serde_json::to_string(&vocab).unwrap_or_default()
        );
        let schema = json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "category": {"type": "STRING", "enum": ["Grammar", "Vocabulary"]},
                    "challenge": {"type": "STRING"},
                    "answer": {"type": "STRING"},
                    "hint": {"type": "STRING"}
                },
                "required": ["category", "challenge", "answer", "hint"]
            }
        });
        self.call_json(prompt, schema).await
    }

    async fn refresh_persona(
        &self,
        profile: &LearningProfile,
    ) -> Result<PersonaUpdate, TutorError> {
        let recent_chat: Vec<&str> = profile
            .chat_history
            .iter()
            .rev()
            .take(10)
            .map(|turn| turn.text())
            .collect();
        let recent_errors: Vec<&str> = profile
            .grammar_errors
            .iter()
            .rev()
            .take(5)
            .map(|e| e.error.as_str())
            .collect();
        let recent_vocab: Vec<&str> = profile
            .vocabulary
            .iter()
            .rev()
            .take(5)
            .map(|v| v.word.as_str())
            .collect();
        let recent_topics: Vec<&str> = profile
            .quiz_history
            .iter()
            .rev()
            .take(3)
            .map(|q| q.topic.as_str())
            .collect();
        let prompt = format!(
            "You are an AI learning coach. From the data below, refine the user's \
             persona (at most 5 key interests plus a concise one-sentence summary) \
             and generate 3 personalized, actionable recommendations that connect \
             the app's features to the user's interests and weaknesses. \
             Level: {}. Known interests: {}. Recent chat: {:?}. Recent grammar \
             errors: {:?}. Recent vocabulary: {:?}. Recent quiz topics: {:?}. \
             Respond with a single JSON object.",
            profile.profile.level,
            if profile.profile.persona.interests.is_empty() {
                "none yet".to_string()
            } else {
                profile.profile.persona.interests.join(", ")
            },
            recent_chat,
            recent_errors,
            recent_vocab,
            recent_topics,
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "persona": {
                    "type": "OBJECT",
                    "properties": {
                        "interests": {"type": "ARRAY", "items": {"type": "STRING"}},
                        "summary": {"type": "STRING"}
                    },
                    "required": ["interests", "summary"]
                },
                "recommendations": {"type": "ARRAY", "items": {"type": "STRING"}}
            },
            "required": ["persona", "recommendations"]
        });
        self.call_json(prompt, schema).await
    }

    async fn learning_plan(&self, profile: &LearningProfile) -> Result<Vec<PlanSeed>, TutorError> {
        let weaknesses = profile
            .assessment_history
            .last()
            .map(|record| record.weaknesses.join(", "))
            .unwrap_or_else(|| "unknown".into());
        let prompt = format!(
            "You are an AI learning coach. Generate a personalized learning plan \
             of 5 actionable items for a \"{}\"-level English learner. Each item \
             has \"type\" ('quiz', 'spelling' or 'chat_topic'), \"title\" (for \
             'spelling' the word itself) and \"description\" (for 'spelling' the \
             definition). Recent assessment weaknesses: {}. Recent quiz \
             performance: {}. Respond with a JSON array.",
            profile.profile.level,
            weaknesses,
            serde_json::to_string(
                &profile.quiz_history.iter().rev().take(3).collect::<Vec<_>>()
            )
            .unwrap_or_default(),
        );
        let schema = json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "type": {"type": "STRING", "enum": ["quiz", "spelling", "chat_topic"]},
                    "title": {"type": "STRING"},
                    "description": {"type": "STRING"}
                },
                "required": ["type", "title", "description"]
            }
        });
        self.call_json(prompt, schema).await
    }

    async fn extract_text(&self, mime: &str, data: &[u8]) -> Result<String, TutorError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        let parts = vec![
            json!({"text": "Extract all English text from the image."}),
            json!({"inlineData": {"mimeType": mime, "data": encoded}}),
        ];
        let text = self.call(parts, None).await?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_strips_markdown_fences() {
        let fenced = "```json\n[{\"question\":\"Q\",\"options\":[\"a\"],\"correctAnswer\":\"a\"}]\n```";
        let questions: Vec<Question> = parse_reply(fenced).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer, "a");
    }

    #[test]
    fn parse_reply_rejects_non_json() {
        let result: Result<Vec<Question>, _> = parse_reply("I'd be happy to help!");
        assert!(matches!(result, Err(TutorError::Malformed(_))));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_configuration_error() {
        let tutor = GeminiTutor::new(ModelConfig::default());
        let result = tutor.call(vec![], None).await;
        assert!(matches!(result, Err(TutorError::MissingApiKey)));
    }
}
