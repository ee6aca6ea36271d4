//! Optional speech capability boundary.
//!
//! Speech is provided by the embedding platform, when it is provided at
//! all. Callers hold an `Option` and hide their speech controls when
//! detection comes back empty; nothing else in the crate depends on it.
//!
//! Contract for implementors: `speak` is fire-and-forget and cancels any
//! utterance still playing; `listen` runs at most one dictation session at
//! a time.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("no speech backend is available")]
    Unavailable,

    #[error("a dictation session is already running")]
    Busy,

    #[error("speech backend failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SpeechCapability: Send + Sync {
    /// Speak `text` aloud, cancelling any utterance still in progress.
    fn speak(&self, text: &str, voice: Option<&str>);

    /// Capture one dictation session and return the transcript.
    async fn listen(&self) -> Result<String, SpeechError>;

    /// Stop a running dictation session, if any.
    fn stop_listening(&self);
}

/// Platform detection hook. This crate ships no backend of its own; an
/// embedding shell that has one registers it here.
pub struct SpeechBridge;

impl SpeechBridge {
    pub fn detect() -> Option<Arc<dyn SpeechCapability>> {
        None
    }
}
