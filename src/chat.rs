//! Conversational tutoring session.
//!
//! The transcript lives in the learning-profile document and is append-only:
//! the user turn is committed before the reply is requested, so a failed
//! reply leaves the message in place for a retry. Corrections the tutor
//! finds in the user's message are folded into the grammar-error record in
//! the same mutation that appends the reply. Every fifth user turn kicks
//! off a detached persona refresh.

use crate::notify::Notifier;
use crate::plan::spawn_persona_refresh;
use crate::sync::{ProfileSync, SyncError};
use crate::tutor::{ChatReply, TutorCapability, TutorError};
use crate::types::{now_millis, ChatRole, ChatTurn, GrammarSlip};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// A persona refresh fires on every multiple of this many user turns.
const PERSONA_REFRESH_INTERVAL: usize = 5;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Tutor(#[from] TutorError),
}

pub struct ChatSession {
    sync: ProfileSync,
    tutor: Arc<dyn TutorCapability>,
    notifier: Notifier,
}

impl ChatSession {
    pub fn new(sync: ProfileSync, tutor: Arc<dyn TutorCapability>, notifier: Notifier) -> Self {
        Self {
            sync,
            tutor,
            notifier,
        }
    }

    pub fn transcript(&self) -> Result<Vec<ChatTurn>, SyncError> {
        self.sync.read(|doc| doc.chat_history.clone())
    }

    /// Send one user message and return the tutor's reply.
    ///
    /// The user turn is appended first and stays in the transcript even when
    /// the reply fails; the caller can simply send again. A successful reply
    /// lands as one mutation: model turn appended, corrections recorded,
    /// error counter bumped.
    pub async fn send_message(&self, text: &str) -> Result<ChatReply, ChatError> {
        self.sync
            .mutate(|doc| doc.chat_history.push(ChatTurn::user(text)))?;

        let (history, snapshot) = {
            let snapshot = self.sync.snapshot()?;
            (snapshot.chat_history.clone(), snapshot)
        };

        let reply = match self.tutor.chat_reply(&history, &snapshot).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(%error, "chat reply failed");
                self.notifier
                    .error("The tutor could not respond. Please try sending again.");
                return Err(error.into());
            }
        };

        let new_slips: Vec<GrammarSlip> = reply
            .corrections
            .iter()
            .map(|c| GrammarSlip {
                id: Uuid::new_v4().to_string(),
                error: c.error.clone(),
                correction: c.correction.clone(),
                explanation: c.explanation.clone(),
                timestamp: now_millis(),
            })
            .collect();
        let response = reply.response.clone();
        self.sync.mutate(move |doc| {
            doc.chat_history.push(ChatTurn::model(response));
            doc.stats.grammar_errors_tracked += new_slips.len() as u32;
            doc.grammar_errors.extend(new_slips);
        })?;

        let user_turns = self.sync.read(|doc| {
            doc.chat_history
                .iter()
                .filter(|turn| turn.role == ChatRole::User)
                .count()
        })?;
        if user_turns % PERSONA_REFRESH_INTERVAL == 0 {
            tracing::debug!(user_turns, "triggering background persona refresh");
            spawn_persona_refresh(self.sync.clone(), Arc::clone(&self.tutor));
        }

        Ok(reply)
    }
}
