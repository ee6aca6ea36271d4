//! Authentication boundary and session lifecycle.
//!
//! The auth provider is external; this crate only observes the identity it
//! exposes. The session watcher ties identity changes to the synchronizer:
//! an identity appearing loads that user's profile, an identity vanishing
//! flushes and tears the document down so nothing leaks across sign-ins.

use crate::sync::ProfileSync;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

pub trait AuthProvider: Send + Sync {
    fn current_identity(&self) -> Option<Uuid>;

    /// Watch channel carrying the signed-in identity; `None` while signed
    /// out.
    fn subscribe(&self) -> watch::Receiver<Option<Uuid>>;
}

/// Drives the synchronizer from auth state changes.
pub struct SessionWatcher;

impl SessionWatcher {
    pub fn spawn(
        provider: Arc<dyn AuthProvider>,
        sync: ProfileSync,
    ) -> tokio::task::JoinHandle<()> {
        let mut identities = provider.subscribe();
        tokio::spawn(async move {
            let mut active: Option<Uuid> = None;
            loop {
                let current = *identities.borrow_and_update();
                if current != active {
                    if active.is_some() {
                        Self::sign_out(&sync).await;
                    }
                    if let Some(identity) = current {
                        if let Err(error) = sync.initialize(identity).await {
                            tracing::error!(%identity, %error, "session initialization failed");
                        }
                    }
                    active = current;
                }
                if identities.changed().await.is_err() {
                    // Provider gone; end the session cleanly.
                    if active.is_some() {
                        Self::sign_out(&sync).await;
                    }
                    break;
                }
            }
        })
    }

    /// Push any unsaved progress out, then drop the document.
    async fn sign_out(sync: &ProfileSync) {
        if sync.is_ready() {
            if let Err(error) = sync.flush().await {
                tracing::warn!(%error, "final flush on sign-out failed");
            }
        }
        sync.teardown();
    }
}

/// Script-driven provider for tests and local shells.
pub struct StaticAuth {
    tx: watch::Sender<Option<Uuid>>,
}

impl StaticAuth {
    pub fn new(initial: Option<Uuid>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, identity: Option<Uuid>) {
        let _ = self.tx.send(identity);
    }
}

impl AuthProvider for StaticAuth {
    fn current_identity(&self) -> Option<Uuid> {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Uuid>> {
        self.tx.subscribe()
    }
}
