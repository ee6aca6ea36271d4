//! Remote profile store boundary.
//!
//! One row per user, holding the whole learning-profile document as JSON.
//! Authorization is row-scoped to the authenticated user; the adapter always
//! sends the user's own access token so the store's row-level policies apply.

use crate::types::LearningProfile;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("profile store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("profile row holds a malformed document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result of a read: the row exists or it doesn't. Anything else is an error.
#[derive(Debug)]
pub enum FetchOutcome {
    Found(LearningProfile),
    NotFound,
}

/// Read-one / update-one access to the per-user profile row.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch(&self, identity: Uuid) -> Result<FetchOutcome, StoreError>;
    async fn write(&self, identity: Uuid, document: &LearningProfile) -> Result<(), StoreError>;
}

/// Supabase PostgREST adapter.
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    table: String,
    /// The signed-in user's access token; row-level security keys off it.
    access_token: String,
}

#[derive(Deserialize)]
struct ProfileRow {
    user_data: serde_json::Value,
}

impl SupabaseStore {
    pub fn new(config: &crate::config::StoreConfig, access_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            table: config.table.clone(),
            access_token: access_token.into(),
        }
    }

    fn row_url(&self, identity: Uuid) -> String {
        format!(
            "{}/rest/v1/{}?id=eq.{}",
            self.base_url, self.table, identity
        )
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ProfileStore for SupabaseStore {
    async fn fetch(&self, identity: Uuid) -> Result<FetchOutcome, StoreError> {
        let url = format!("{}&select=user_data", self.row_url(identity));
        let response = self.authed(self.client.get(&url)).send().await?;
        let rows: Vec<ProfileRow> = Self::check(response).await?.json().await?;
        match rows.into_iter().next() {
            Some(row) => {
                let document = serde_json::from_value(row.user_data)?;
                Ok(FetchOutcome::Found(document))
            }
            None => Ok(FetchOutcome::NotFound),
        }
    }

    // Upsert: the first write for a fresh user creates the row.
    async fn write(&self, identity: Uuid, document: &LearningProfile) -> Result<(), StoreError> {
        let url = format!("{}/rest/v1/{}", self.base_url, self.table);
        let body = serde_json::json!({
            "id": identity,
            "user_data": document,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });
        let response = self
            .authed(self.client.post(&url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
