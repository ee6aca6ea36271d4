//! Topic quiz driver.
//!
//! Five questions on a learner-chosen topic, always scored locally.
//! Completing a quiz appends the record, recomputes the aggregate stats,
//! and folds the topic into the learner's interests, then kicks off a
//! detached persona refresh.

use super::{ActivityError, Advance, Drill, Feedback, FetchOrigin, Install, ScoringMode};
use crate::notify::Notifier;
use crate::plan::spawn_persona_refresh;
use crate::sync::ProfileSync;
use crate::tutor::{Question, TutorCapability, TutorError};
use crate::types::{now_millis, quiz_average, QuizRecord};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum QuizTurn {
    Continue,
    Completed { correct: u32, total: u32 },
}

pub struct QuizSession {
    sync: ProfileSync,
    tutor: Arc<dyn TutorCapability>,
    notifier: Notifier,
    feedback_delay: Duration,
    drill: Drill<Question>,
    topic: String,
}

impl QuizSession {
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
            topic: String::new(),
        }
    }

    pub async fn start(&mut self, topic: &str) -> Result<(), ActivityError> {
        let token = self.drill.begin_fetch(FetchOrigin::Idle)?;
        let level = self.sync.read(|doc| doc.profile.level)?;

        let questions = match self.tutor.quiz_questions(topic, level).await {
            Ok(questions) => questions,
            Err(error) => {
                self.drill.fail_fetch(token);
                self.notifier
                    .error("Could not generate a quiz on that topic. Please try another.");
                return Err(error.into());
            }
        };
        match self.drill.install(token, questions, ScoringMode::Local) {
            Install::Started | Install::StaleDropped => {
                self.topic = topic.to_string();
                Ok(())
            }
            Install::EmptyRejected => {
                self.notifier
                    .error("Could not generate a quiz on that topic. Please try another.");
                Err(TutorError::Empty.into())
            }
        }
    }

    pub fn current_question(&self) -> Option<(usize, &Question)> {
        self.drill.current_item()
    }

    /// Accept an answer, wait out the feedback interval, and advance. On the
    /// final question the completion mutation is applied and a background
    /// persona refresh starts.
    pub async fn answer(
        &mut self,
        answer: &str,
    ) -> Result<Option<(Feedback, QuizTurn)>, ActivityError> {
        let Some(feedback) = self.drill.submit_answer(answer) else {
            return Ok(None);
        };
        tokio::time::sleep(self.feedback_delay).await;

        let turn = match self.drill.advance()? {
            Advance::Next => QuizTurn::Continue,
            Advance::Finished { correct, total } => {
                self.record_completion(correct, total)?;
                QuizTurn::Completed { correct, total }
            }
            Advance::Analyze(_) => {
                return Err(ActivityError::InvalidState(
                    "quizzes are always scored locally",
                ))
            }
        };
        Ok(Some((feedback, turn)))
    }

    fn record_completion(&self, correct: u32, total: u32) -> Result<(), ActivityError> {
        let topic = self.topic.clone();
        self.sync.mutate(|doc| {
            doc.quiz_history.push(QuizRecord {
                topic: topic.clone(),
                score: correct,
                total,
                timestamp: now_millis(),
            });
            doc.stats.quizzes_completed = doc.quiz_history.len() as u32;
            doc.stats.quiz_average_score = quiz_average(&doc.quiz_history);
            let interests = &mut doc.profile.persona.interests;
            if !interests.iter().any(|i| i.eq_ignore_ascii_case(&topic)) {
                interests.push(topic.clone());
            }
        })?;
        tracing::info!(topic = %self.topic, correct, total, "quiz completed");
        spawn_persona_refresh(self.sync.clone(), Arc::clone(&self.tutor));
        Ok(())
    }

    pub fn results(&self) -> Option<(u32, u32)> {
        self.drill.results()
    }

    pub fn dismiss(&mut self) {
        self.drill.dismiss();
    }
}
