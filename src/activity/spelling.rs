//! Spelling drill driver.
//!
//! One word per round. Words come from the suggested-vocabulary queue first
//! (consumed front-to-back) and fall back to generation when the queue is
//! empty. A correct spelling moves the word into the learned vocabulary,
//! once, no matter how many times it is spelled again later.

use super::{ActivityError, Drill, Feedback, FetchOrigin, Install, ScoringMode};
use crate::notify::Notifier;
use crate::sync::ProfileSync;
use crate::tutor::{SpellingWord, TutorCapability, TutorError};
use crate::types::{now_millis, VocabularyWord};
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

pub struct SpellingSession {
    sync: ProfileSync,
    tutor: Arc<dyn TutorCapability>,
    notifier: Notifier,
    drill: Drill<SpellingWord>,
}

impl SpellingSession {
    pub fn new(sync: ProfileSync, tutor: Arc<dyn TutorCapability>, notifier: Notifier) -> Self {
        Self {
            sync,
            tutor,
            notifier,
            drill: Drill::new(),
        }
    }

    /// Start the next round: take the head of the suggestion queue, or
    /// generate a word when the queue is empty.
    pub async fn next_word(&mut self) -> Result<(), ActivityError> {
        let token = self.drill.begin_fetch(FetchOrigin::Idle)?;

        let mut suggested: Option<VocabularyWord> = None;
        self.sync.mutate(|doc| {
            if !doc.suggested_vocabulary.is_empty() {
                suggested = Some(doc.suggested_vocabulary.remove(0));
            }
        })?;

        let word = match suggested {
            Some(entry) => SpellingWord {
                word: entry.word,
                definition: entry.definition,
                example: entry.example,
            },
            None => {
                let level = self.sync.read(|doc| doc.profile.level)?;
                match self.tutor.spelling_word(level).await {
                    Ok(word) => word,
                    Err(error) => {
                        self.drill.fail_fetch(token);
                        self.notifier
                            .error("Could not fetch a word to practice. Please try again.");
                        return Err(error.into());
                    }
                }
            }
        };

        match self.drill.install(token, vec![word], ScoringMode::Local) {
            Install::Started | Install::StaleDropped => Ok(()),
            Install::EmptyRejected => Err(TutorError::Empty.into()),
        }
    }

    pub fn current_word(&self) -> Option<&SpellingWord> {
        self.drill.current_item().map(|(_, word)| word)
    }

    /// The example sentence with the target word blanked out, so it can be
    /// shown without giving the spelling away.
    pub fn masked_example(&self) -> Option<String> {
        let word = self.current_word()?;
        let pattern = format!(r"(?i)\b{}\b", regex::escape(&word.word));
        let masked = match Regex::new(&pattern) {
            Ok(re) => re.replace_all(&word.example, "_____").into_owned(),
            Err(_) => word.example.clone(),
        };
        Some(masked)
    }

    /// Check a spelling attempt (case-insensitive, single-shot). A correct
    /// first-ever spelling moves the word into the learned vocabulary and
    /// counts toward `words_learned`; respellings change nothing. The round
    /// then ends after the configured auto-advance delay.
    pub async fn answer(&mut self, attempt: &str) -> Result<Option<Feedback>, ActivityError> {
        let Some(word) = self.current_word().cloned() else {
            return Err(ActivityError::InvalidState("no spelling round in progress"));
        };
        let Some(feedback) = self.drill.submit_answer(attempt) else {
            return Ok(None);
        };

        if feedback.correct {
            self.sync.mutate(|doc| {
                if !doc.knows_word(&word.word) {
                    doc.vocabulary.push(VocabularyWord {
                        word: word.word.clone(),
                        definition: word.definition.clone(),
                        example: word.example.clone(),
                        level: doc.profile.level,
                        added_date: now_millis(),
                    });
                    doc.stats.words_learned += 1;
                }
            })?;
        }

        let delay = self
            .sync
            .read(|doc| doc.settings.spelling_auto_advance_seconds)?;
        tokio::time::sleep(Duration::from_secs(u64::from(delay))).await;
        self.drill.advance()?;
        self.drill.dismiss();
        Ok(Some(feedback))
    }

    /// Drop every queued suggestion matching `word` without practicing it.
    /// Unknown words are a no-op.
    pub fn remove_suggested(&self, word: &str) -> Result<(), ActivityError> {
        self.sync
            .mutate(|doc| doc.suggested_vocabulary.retain(|v| v.word != word))?;
        Ok(())
    }

    pub fn dismiss(&mut self) {
        self.drill.dismiss();
    }
}
