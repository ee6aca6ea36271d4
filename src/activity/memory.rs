//! Memory-card drill driver.
//!
//! Five fill-in-the-blank cards built from the learner's own recent grammar
//! mistakes and vocabulary. Grammar-card outcomes are tallied during the
//! session and folded into the learning-ability counters in one mutation
//! when the session completes, so the corrected count can never outrun the
//! total.

use super::{ActivityError, Advance, Drill, Feedback, FetchOrigin, Install, ScoringMode};
use crate::notify::Notifier;
use crate::sync::ProfileSync;
use crate::tutor::{CardCategory, MemoryCard, TutorCapability, TutorError};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum MemoryTurn {
    Continue,
    Completed { correct: u32, total: u32 },
}

#[derive(Debug, Default, Clone, Copy)]
struct GrammarTally {
    corrected: u32,
    total: u32,
}

pub struct MemorySession {
    sync: ProfileSync,
    tutor: Arc<dyn TutorCapability>,
    notifier: Notifier,
    feedback_delay: Duration,
    drill: Drill<MemoryCard>,
    tally: GrammarTally,
}

impl MemorySession {
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
            tally: GrammarTally::default(),
        }
    }

    /// Build a card set from the most recent mistakes and vocabulary. With
    /// no material to draw from, there is nothing to review.
    pub async fn start(&mut self) -> Result<(), ActivityError> {
        let (errors, vocab) = self.sync.read(|doc| {
            let errors: Vec<_> = doc.grammar_errors.iter().rev().take(5).cloned().collect();
            let vocab: Vec<_> = doc.vocabulary.iter().rev().take(5).cloned().collect();
            (errors, vocab)
        })?;
        if errors.is_empty() && vocab.is_empty() {
            self.notifier
                .info("Practice some chat or spelling first to unlock memory cards.");
            return Err(ActivityError::InvalidState("no material to review yet"));
        }

        let token = self.drill.begin_fetch(FetchOrigin::Idle)?;
        let cards = match self.tutor.memory_cards(&errors, &vocab).await {
            Ok(cards) => cards,
            Err(error) => {
                self.drill.fail_fetch(token);
                self.notifier
                    .error("Could not build your memory cards. Please try again.");
                return Err(error.into());
            }
        };
        match self.drill.install(token, cards, ScoringMode::Local) {
            Install::Started | Install::StaleDropped => {
                self.tally = GrammarTally::default();
                Ok(())
            }
            Install::EmptyRejected => {
                self.notifier
                    .error("Could not build your memory cards. Please try again.");
                Err(TutorError::Empty.into())
            }
        }
    }

    pub fn current_card(&self) -> Option<(usize, &MemoryCard)> {
        self.drill.current_item()
    }

    /// Answer the current card (case-insensitive, single-shot), wait out the
    /// feedback interval, and advance. Completion applies the session's one
    /// learning-ability mutation.
    pub async fn answer(
        &mut self,
        answer: &str,
    ) -> Result<Option<(Feedback, MemoryTurn)>, ActivityError> {
        let category = self.drill.current_item().map(|(_, card)| card.category);
        let Some(feedback) = self.drill.submit_answer(answer) else {
            return Ok(None);
        };
        if category == Some(CardCategory::Grammar) {
            self.tally.total += 1;
            if feedback.correct {
                self.tally.corrected += 1;
            }
        }
        tokio::time::sleep(self.feedback_delay).await;

        let turn = match self.drill.advance()? {
            Advance::Next => MemoryTurn::Continue,
            Advance::Finished { correct, total } => {
                self.record_completion()?;
                MemoryTurn::Completed { correct, total }
            }
            Advance::Analyze(_) => {
                return Err(ActivityError::InvalidState(
                    "memory cards are always scored locally",
                ))
            }
        };
        Ok(Some((feedback, turn)))
    }

    fn record_completion(&mut self) -> Result<(), ActivityError> {
        let tally = std::mem::take(&mut self.tally);
        if tally.total == 0 {
            return Ok(());
        }
        self.sync.mutate(|doc| {
            let ability = &mut doc.stats.learning_ability;
            ability.total_mistakes += tally.total;
            ability.corrected_mistakes += tally.corrected;
        })?;
        tracing::info!(
            corrected = tally.corrected,
            total = tally.total,
            "memory session tallied"
        );
        Ok(())
    }

    pub fn results(&self) -> Option<(u32, u32)> {
        self.drill.results()
    }

    pub fn dismiss(&mut self) {
        self.drill.dismiss();
        self.tally = GrammarTally::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::tests::ready_sync;
    use crate::tutor::mock::MockTutor;
    use crate::types::{GrammarSlip, UserLevel, VocabularyWord};

    fn session(tutor: Arc<MockTutor>, sync: ProfileSync) -> MemorySession {
        MemorySession::new(
            sync,
            tutor,
            Notifier::disconnected(),
            Duration::from_millis(1500),
        )
    }

    fn card(category: CardCategory, answer: &str) -> MemoryCard {
        MemoryCard {
            category,
            challenge: format!("Fill in: ___ ({answer})"),
            answer: answer.into(),
            hint: "hint".into(),
        }
    }

    fn seed_material(sync: &ProfileSync) {
        sync.mutate(|doc| {
            doc.grammar_errors.push(GrammarSlip {
                id: "g1".into(),
                error: "she go".into(),
                correction: "she goes".into(),
                explanation: "third person singular".into(),
                timestamp: 0,
            });
            doc.vocabulary.push(VocabularyWord {
                word: "echo".into(),
                definition: "d".into(),
                example: "e".into(),
                level: UserLevel::Beginner,
                added_date: 0,
            });
        })
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn grammar_outcomes_land_in_one_completion_mutation() {
        let sync = ready_sync().await;
        seed_material(&sync);
        let tutor = Arc::new(MockTutor::default());
        *tutor.cards.lock().unwrap() = Some(vec![
            card(CardCategory::Grammar, "goes"),
            card(CardCategory::Vocabulary, "echo"),
            card(CardCategory::Grammar, "went"),
        ]);
        let mut session = session(tutor, sync.clone());

        session.start().await.unwrap();
        session.answer("goes").await.unwrap().unwrap();
        // Counters stay untouched mid-session.
        assert_eq!(
            sync.read(|doc| doc.stats.learning_ability.total_mistakes)
                .unwrap(),
            0
        );
        session.answer("wrong").await.unwrap().unwrap();
        let (_, turn) = session.answer("wrong").await.unwrap().unwrap();
        assert!(matches!(
            turn,
            MemoryTurn::Completed {
                correct: 1,
                total: 3
            }
        ));

        let ability = sync
            .read(|doc| doc.stats.learning_ability.clone())
            .unwrap();
        // Vocabulary cards never count toward grammar ability.
        assert_eq!(ability.total_mistakes, 2);
        assert_eq!(ability.corrected_mistakes, 1);
        assert!(ability.corrected_mistakes <= ability.total_mistakes);
    }

    #[tokio::test(start_paused = true)]
    async fn answers_match_case_insensitively() {
        let sync = ready_sync().await;
        seed_material(&sync);
        let tutor = Arc::new(MockTutor::default());
        *tutor.cards.lock().unwrap() = Some(vec![card(CardCategory::Grammar, "Goes")]);
        let mut session = session(tutor, sync);

        session.start().await.unwrap();
        let (feedback, _) = session.answer("  goes ").await.unwrap().unwrap();
        assert!(feedback.correct);
    }

    #[tokio::test(start_paused = true)]
    async fn no_material_means_no_session() {
        let sync = ready_sync().await;
        let mut session = session(Arc::new(MockTutor::default()), sync);

        assert!(matches!(
            session.start().await,
            Err(ActivityError::InvalidState(_))
        ));
        assert!(session.drill.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_session_tallies_nothing() {
        let sync = ready_sync().await;
        seed_material(&sync);
        let tutor = Arc::new(MockTutor::default());
        *tutor.cards.lock().unwrap() = Some(vec![
            card(CardCategory::Grammar, "goes"),
            card(CardCategory::Grammar, "went"),
        ]);
        let mut session = session(tutor, sync.clone());

        session.start().await.unwrap();
        session.answer("goes").await.unwrap().unwrap();
        session.dismiss();

        assert_eq!(
            sync.read(|doc| doc.stats.learning_ability.total_mistakes)
                .unwrap(),
            0
        );
    }
}
