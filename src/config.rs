//! Hub configuration.
//!
//! Small serde structs with defaults matching the shipped web client.
//! `from_env` picks up the same environment variables the original deployment
//! used; everything else is a tuning knob for tests and embedders.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the orchestration core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct HubConfig {
    pub store: StoreConfig,
    pub model: ModelConfig,
    pub sync: SyncConfig,
    pub drill: DrillConfig,
    pub notify: NotifyConfig,
}

impl HubConfig {
    /// Build a configuration from the process environment.
    ///
    /// Missing variables leave the corresponding field empty; the adapters
    /// report a configuration error at first use rather than at startup, so
    /// the rest of the app stays usable while the user fixes their settings.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            config.store.base_url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            config.store.anon_key = key;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.model.api_key = Some(key);
        }
        config
    }
}

/// Remote profile store (Supabase PostgREST) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct StoreConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    pub base_url: String,
    /// Anonymous API key sent as the `apikey` header.
    pub anon_key: String,
    /// Table holding one row per user with the profile document.
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            anon_key: String::new(),
            table: "profiles".into(),
        }
    }
}

/// Generation model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ModelConfig {
    /// API key for the model provider. None until the user configures one.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            temperature: 0.7,
            top_p: 0.95,
            top_k: 64,
        }
    }
}

/// Synchronizer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SyncConfig {
    /// Quiet period after the last mutation before a persist write fires.
    pub debounce_ms: u64,
}

impl SyncConfig {
    /// The debounce window, ready to hand to `ProfileSync::new`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000 }
    }
}

/// Drill-style activity tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DrillConfig {
    /// How long per-question feedback stays visible before auto-advance.
    pub feedback_delay_ms: u64,
}

impl DrillConfig {
    /// The feedback interval, ready to hand to the session constructors.
    pub fn feedback_delay(&self) -> Duration {
        Duration::from_millis(self.feedback_delay_ms)
    }
}

impl Default for DrillConfig {
    fn default() -> Self {
        Self {
            feedback_delay_ms: 1500,
        }
    }
}

/// Notification service tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct NotifyConfig {
    /// Auto-expiry for the single notification slot.
    pub ttl_ms: u64,
}

impl NotifyConfig {
    /// The slot lifetime, ready to hand to `Notifier::new`.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { ttl_ms: 4000 }
    }
}
