//! Append-only journal used both for crawler checkpoints and for the reports
//! the crawlers publish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SPIRE_URL: &str = "https://spire.bugout.dev";

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Journal request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Journal answered with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to decode journal response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Structured context attached to an entry. Searches filter on
/// `context_type` and `context_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryContext {
    pub context_type: String,
    pub context_id: String,
    pub context_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub context: EntryContext,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchOrder {
    Asc,
    #[default]
    Desc,
}

impl SearchOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Free-text query, e.g. `context_type:cursor context_id:main`.
    pub query: String,
    pub limit: u32,
    pub offset: u32,
    pub order: SearchOrder,
    /// Whether entry contents are returned.
    pub content: bool,
}

impl SearchQuery {
    /// Most recent entry with the given context, without its content.
    pub fn latest_in_context(context_type: &str, context_id: &str) -> Self {
        Self {
            query: format!(
                "context_type:{} context_id:{}",
                context_type, context_id
            ),
            limit: 1,
            offset: 0,
            order: SearchOrder::Desc,
            content: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub entry_url: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub context_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total_results: u64,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

#[async_trait]
pub trait Journal: Send + Sync {
    async fn search_entries(
        &self,
        query: &SearchQuery,
    ) -> Result<SearchResults, JournalError>;

    /// Appends `entry`. Existing entries are never modified.
    async fn create_entry(&self, entry: &JournalEntry) -> Result<(), JournalError>;
}

#[async_trait]
impl<J: Journal + ?Sized> Journal for Arc<J> {
    async fn search_entries(
        &self,
        query: &SearchQuery,
    ) -> Result<SearchResults, JournalError> {
        (**self).search_entries(query).await
    }

    async fn create_entry(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        (**self).create_entry(entry).await
    }
}

/// [Journal] backed by the Bugout Spire HTTP API.
#[derive(Debug, Clone)]
pub struct BugoutJournal {
    client: Client,
    spire_url: String,
    journal_id: String,
    token: String,
}

impl BugoutJournal {
    pub fn new(
        spire_url: impl Into<String>,
        journal_id: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, JournalError> {
        let client = Client::builder().timeout(timeout).build()?;
        let spire_url = spire_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            spire_url,
            journal_id: journal_id.into(),
            token: token.into(),
        })
    }

    fn journal_url(&self, path: &str) -> String {
        format!("{}/journals/{}/{}", self.spire_url, self.journal_id, path)
    }

    async fn check(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, JournalError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(JournalError::Status { status, body })
    }
}

#[async_trait]
impl Journal for BugoutJournal {
    async fn search_entries(
        &self,
        query: &SearchQuery,
    ) -> Result<SearchResults, JournalError> {
        let limit = query.limit.to_string();
        let offset = query.offset.to_string();
        let content = query.content.to_string();

        tracing::trace!(query = %query.query, "Searching journal");

        let response = self
            .client
            .get(self.journal_url("search"))
            .bearer_auth(&self.token)
            .query(&[
                ("q", query.query.as_str()),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
                ("order", query.order.as_str()),
                ("content", content.as_str()),
            ])
            .send()
            .await?;

        let bytes = Self::check(response).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(JournalError::Decode)
    }

    async fn create_entry(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        tracing::trace!(title = %entry.title, "Creating journal entry");

        let response = self
            .client
            .post(self.journal_url("entries"))
            .bearer_auth(&self.token)
            .json(entry)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
