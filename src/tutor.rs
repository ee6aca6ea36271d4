//! Generation-capability boundary.
//!
//! Every learning feature delegates its content generation to one opaque
//! call here: structured input in, schema-validated structured output back.
//! A reply that fails validation or comes back empty is a generation
//! failure — callers never treat it as "zero results is a valid result".

pub mod gemini;

use crate::types::{
    AssessmentRecord, ChatTurn, GrammarSlip, LearningProfile, Persona, PlanTaskKind, UserLevel,
    VocabularyWord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
    /// No model API key configured. A configuration error: route the user to
    /// settings, don't retry.
    #[error("model API key is not configured")]
    MissingApiKey,

    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// The model produced nothing usable for this request.
    #[error("generation returned an empty result")]
    Empty,

    #[error("generation output did not match the expected shape: {0}")]
    Malformed(String),
}

/// One multiple-choice question with its canonical answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

/// Level verdict with strengths/weaknesses from a full answer set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentAnalysis {
    pub level: UserLevel,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
}

/// A word for the spelling drill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpellingWord {
    pub word: String,
    pub definition: String,
    pub example: String,
}

/// A candidate vocabulary word extracted from learner-provided text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedWord {
    pub word: String,
    pub definition: String,
    pub example: String,
}

/// A grammar/spelling/style correction detected in the learner's message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub error: String,
    pub correction: String,
    pub explanation: String,
}

/// Conversational reply plus any corrections to the learner's last message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub corrections: Vec<Correction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardCategory {
    Grammar,
    Vocabulary,
}

/// Fill-in-the-blank challenge built from the learner's recent mistakes and
/// vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCard {
    pub category: CardCategory,
    pub challenge: String,
    pub answer: String,
    pub hint: String,
}

/// Refreshed persona and dashboard recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaUpdate {
    pub persona: Persona,
    pub recommendations: Vec<String>,
}

/// One learning-plan item before it is stamped with an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSeed {
    #[serde(rename = "type")]
    pub kind: PlanTaskKind,
    pub title: String,
    pub description: String,
}

/// The AI tutor's capabilities, one opaque call per use case.
#[async_trait]
pub trait TutorCapability: Send + Sync {
    /// 8-question general proficiency test, biased toward previously
    /// observed weaknesses.
    async fn assessment_questions(
        &self,
        history: &[AssessmentRecord],
    ) -> Result<Vec<Question>, TutorError>;

    /// 5-question assessment generated from learner-provided text.
    async fn assessment_from_context(
        &self,
        context: &str,
        level: UserLevel,
    ) -> Result<Vec<Question>, TutorError>;

    /// Level + strengths/weaknesses verdict over a full answer set.
    async fn analyze_assessment(
        &self,
        answers: &BTreeMap<usize, String>,
    ) -> Result<AssessmentAnalysis, TutorError>;

    /// 5-question multiple-choice quiz on a single topic.
    async fn quiz_questions(
        &self,
        topic: &str,
        level: UserLevel,
    ) -> Result<Vec<Question>, TutorError>;

    /// 3-5 level-appropriate vocabulary words found in the given text.
    async fn vocabulary_from_context(
        &self,
        context: &str,
        level: UserLevel,
    ) -> Result<Vec<SuggestedWord>, TutorError>;

    /// One challenging word for the spelling drill.
    async fn spelling_word(&self, level: UserLevel) -> Result<SpellingWord, TutorError>;

    /// Conversational reply plus corrections for the last user turn.
    async fn chat_reply(
        &self,
        history: &[ChatTurn],
        profile: &LearningProfile,
    ) -> Result<ChatReply, TutorError>;

    /// 5 fill-in-the-blank cards from recent errors and vocabulary.
    async fn memory_cards(
        &self,
        recent_errors: &[GrammarSlip],
        recent_vocab: &[VocabularyWord],
    ) -> Result<Vec<MemoryCard>, TutorError>;

    /// Re-infer the learner's persona and dashboard recommendations.
    async fn refresh_persona(
        &self,
        profile: &LearningProfile,
    ) -> Result<PersonaUpdate, TutorError>;

    /// 5 personalized plan items.
    async fn learning_plan(&self, profile: &LearningProfile) -> Result<Vec<PlanSeed>, TutorError>;

    /// OCR: extract English text from an image.
    async fn extract_text(&self, mime: &str, data: &[u8]) -> Result<String, TutorError>;
}
