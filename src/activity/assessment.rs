//! Proficiency assessment driver.
//!
//! Two ways in: the general 8-question test, whose answer sheet is shipped
//! out for analysis and updates the learner's level, and a context-seeded
//! 5-question test built from learner-provided material (typed text or an
//! OCR'd image), which is scored locally. Submitting context material also
//! harvests vocabulary suggestions from it as a side effect.

use super::{
    ActivityError, Advance, Drill, Feedback, FetchOrigin, Install, ScoringMode, SessionToken,
};
use crate::notify::Notifier;
use crate::sync::ProfileSync;
use crate::tutor::{AssessmentAnalysis, Question, TutorCapability, TutorError};
use crate::types::{now_millis, AssessmentRecord, VocabularyWord};
use std::sync::Arc;
use std::time::Duration;

/// What happened after an answer was accepted and the feedback interval
/// elapsed.
#[derive(Debug)]
pub enum AssessmentTurn {
    /// More questions remain.
    Continue,
    /// Context-seeded test finished, scored locally.
    Completed { correct: u32, total: u32 },
    /// General test finished and was analyzed; the profile was updated.
    Analyzed(AssessmentAnalysis),
}

pub struct AssessmentSession {
    sync: ProfileSync,
    tutor: Arc<dyn TutorCapability>,
    notifier: Notifier,
    feedback_delay: Duration,
    drill: Drill<Question>,
}

impl AssessmentSession {
    pub fn new(
        sync: ProfileSync,
        tutor: Arc<dyn TutorCapability>,
        notifier: Notifier,
        feedback_delay: Duration,
    ) -> Self {
        Self {
            sync,
            tutor,
            notifier,
            feedback_delay,
            drill: Drill::new(),
        }
    }

    /// Start the general test. Prior assessment weaknesses bias the question
    /// set.
    pub async fn start_general(&mut self) -> Result<(), ActivityError> {
        let token = self.drill.begin_fetch(FetchOrigin::Idle)?;
        let history = self.sync.read(|doc| doc.assessment_history.clone())?;
        let questions = match self.tutor.assessment_questions(&history).await {
            Ok(questions) => questions,
            Err(error) => {
                self.drill.fail_fetch(token);
                self.notifier
                    .error("Could not generate your assessment. Please try again.");
                return Err(error.into());
            }
        };
        self.install(token, questions)
    }

    /// Move into context entry, where the learner provides material.
    pub fn enter_context(&mut self) -> Result<(), ActivityError> {
        self.drill.enter_context()
    }

    /// Build a test from learner-provided text. Vocabulary found in the text
    /// is harvested into the suggestion queue by a detached task, so a slow
    /// harvest never delays the test itself.
    pub async fn start_from_text(&mut self, context: &str) -> Result<(), ActivityError> {
        let token = self.drill.begin_fetch(FetchOrigin::ContextEntry)?;
        let level = self.sync.read(|doc| doc.profile.level)?;
        self.spawn_vocabulary_harvest(context.to_string(), level);

        let questions = match self.tutor.assessment_from_context(context, level).await {
            Ok(questions) => questions,
            Err(error) => {
                self.drill.fail_fetch(token);
                self.notifier
                    .error("Could not build a test from that text. Please try different material.");
                return Err(error.into());
            }
        };
        self.install(token, questions)
    }

    /// OCR an image, then reuse the text path.
    pub async fn start_from_image(
        &mut self,
        mime: &str,
        bytes: &[u8],
    ) -> Result<(), ActivityError> {
        let text = match self.tutor.extract_text(mime, bytes).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) | Err(TutorError::Empty) => {
                self.notifier
                    .error("No readable text was found in that image.");
                return Err(TutorError::Empty.into());
            }
            Err(error) => {
                self.notifier
                    .error("Could not read that image. Please try again.");
                return Err(error.into());
            }
        };
        self.start_from_text(&text).await
    }

    fn install(
        &mut self,
        token: SessionToken,
        questions: Vec<Question>,
    ) -> Result<(), ActivityError> {
        let mode = ScoringMode::for_question_count(questions.len());
        match self.drill.install(token, questions, mode) {
            Install::Started | Install::StaleDropped => Ok(()),
            Install::EmptyRejected => {
                self.notifier
                    .error("Could not generate your assessment. Please try again.");
                Err(TutorError::Empty.into())
            }
        }
    }

    /// Detached harvest: failures are logged and otherwise invisible.
    fn spawn_vocabulary_harvest(&self, context: String, level: crate::types::UserLevel) {
        let sync = self.sync.clone();
        let tutor = Arc::clone(&self.tutor);
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let words = match tutor.vocabulary_from_context(&context, level).await {
                Ok(words) if !words.is_empty() => words,
                Ok(_) => return,
                Err(error) => {
                    tracing::warn!(%error, "vocabulary harvest failed");
                    return;
                }
            };
            let mut added = 0usize;
            let result = sync.mutate(|doc| {
                for word in &words {
                    let known = doc.knows_word(&word.word)
                        || doc
                            .suggested_vocabulary
                            .iter()
                            .any(|v| v.word.eq_ignore_ascii_case(&word.word));
                    if known {
                        continue;
                    }
                    doc.suggested_vocabulary.push(VocabularyWord {
                        word: word.word.clone(),
                        definition: word.definition.clone(),
                        example: word.example.clone(),
                        level: doc.profile.level,
                        added_date: now_millis(),
                    });
                    added += 1;
                }
            });
            if result.is_ok() && added > 0 {
                notifier.success(format!(
                    "Added {added} new word{} to your practice queue!",
                    if added == 1 { "" } else { "s" }
                ));
            }
        });
    }

    pub fn current_question(&self) -> Option<(usize, &Question)> {
        self.drill.current_item()
    }

    /// Accept an answer, wait out the feedback interval, and advance. A
    /// repeat submission for the same question returns `None`.
    pub async fn answer(
        &mut self,
        answer: &str,
    ) -> Result<Option<(Feedback, AssessmentTurn)>, ActivityError> {
        let Some(feedback) = self.drill.submit_answer(answer) else {
            return Ok(None);
        };
        tokio::time::sleep(self.feedback_delay).await;

        let turn = match self.drill.advance()? {
            Advance::Next => AssessmentTurn::Continue,
            Advance::Finished { correct, total } => AssessmentTurn::Completed { correct, total },
            Advance::Analyze(token) => AssessmentTurn::Analyzed(self.analyze(token).await?),
        };
        Ok(Some((feedback, turn)))
    }

    async fn analyze(&mut self, token: SessionToken) -> Result<AssessmentAnalysis, ActivityError> {
        let sheet = self
            .drill
            .answer_sheet()
            .cloned()
            .ok_or(ActivityError::InvalidState("no answer sheet to analyze"))?;

        let analysis = match self.tutor.analyze_assessment(&sheet).await {
            Ok(analysis) => analysis,
            Err(error) => {
                self.drill.fail_analysis(token);
                self.notifier
                    .error("Could not analyze your results. Please try submitting again.");
                return Err(error.into());
            }
        };

        // The transition into results gates the session's single profile
        // mutation; a stale token means the session was abandoned.
        if self.drill.finish_analysis(token) {
            let record = AssessmentRecord {
                level: analysis.level,
                strengths: analysis.strengths.clone(),
                weaknesses: analysis.weaknesses.clone(),
                recommendations: analysis.recommendations.clone(),
                timestamp: now_millis(),
            };
            self.sync.mutate(|doc| {
                doc.profile.level = record.level;
                doc.assessment_history.push(record.clone());
            })?;
            tracing::info!(level = %analysis.level, "assessment analyzed");
        }
        Ok(analysis)
    }

    pub fn results(&self) -> Option<(u32, u32)> {
        self.drill.results()
    }

    pub fn dismiss(&mut self) {
        self.drill.dismiss();
    }
}
