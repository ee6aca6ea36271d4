//! Orchestration core for an adaptive language-learning hub.
//!
//! Owns the single shared learning-profile document and everything that
//! mutates it: a debounced synchronizer against a remote per-user store,
//! drill-style activity state machines, a conversational tutor session, and
//! the boundary traits for the external collaborators (profile store, auth
//! provider, generation model, speech). The UI shell renders snapshots and
//! calls into these types; it holds no business logic of its own.

pub mod activity;
pub mod auth;
pub mod chat;
pub mod config;
pub mod notify;
pub mod plan;
pub mod speech;
pub mod store;
pub mod sync;
pub mod tutor;
pub mod types;

pub use config::HubConfig;
pub use notify::{Notification, Notifier, Severity};
pub use sync::ProfileSync;
pub use types::{LearningProfile, UserLevel};

/// Install a global tracing subscriber reading `RUST_LOG`, defaulting to
/// info-level output for this crate.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("linguahub=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
