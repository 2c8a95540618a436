use async_trait::async_trait;
use thiserror::Error;

use crate::block::Slot;
use crate::journal::{EntryContext, Journal, JournalEntry, JournalError, SearchQuery};

pub const CURSOR_CONTEXT_TYPE: &str = "cursor";

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("Failed to access cursor {cursor}: {source}")]
    Journal {
        cursor: String,
        #[source]
        source: JournalError,
    },
    #[error("Cursor {cursor} holds {value:?}, which is not a slot number")]
    Parse { cursor: String, value: String },
}

/// A named, persisted "next slot to scan" marker.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Latest value written under `name`, or `None` if there is none.
    async fn read_cursor(&self, name: &str) -> Result<Option<Slot>, CursorError>;

    async fn write_cursor(&self, name: &str, value: Slot) -> Result<(), CursorError>;
}

/// [CursorStore] over a [Journal]. Each write appends an entry carrying the
/// value in its `context_url`; the newest entry wins on read. Nothing is
/// cached, every read queries the journal.
#[derive(Debug, Clone)]
pub struct JournalCursor<J> {
    journal: J,
    crawler: String,
}

impl<J: Journal> JournalCursor<J> {
    /// `crawler` only shows up in the titles of the cursor entries.
    pub fn new(journal: J, crawler: impl Into<String>) -> Self {
        Self {
            journal,
            crawler: crawler.into(),
        }
    }
}

#[async_trait]
impl<J: Journal> CursorStore for JournalCursor<J> {
    async fn read_cursor(&self, name: &str) -> Result<Option<Slot>, CursorError> {
        let query = SearchQuery::latest_in_context(CURSOR_CONTEXT_TYPE, name);
        let results = self.journal.search_entries(&query).await.map_err(
            |source| CursorError::Journal {
                cursor: name.to_string(),
                source,
            },
        )?;

        let Some(latest) = results.results.into_iter().next() else {
            return Ok(None);
        };

        let value = latest.context_url.unwrap_or_default();
        value
            .trim()
            .parse::<Slot>()
            .map(Some)
            .map_err(|_| CursorError::Parse {
                cursor: name.to_string(),
                value,
            })
    }

    async fn write_cursor(&self, name: &str, value: Slot) -> Result<(), CursorError> {
        let value = value.to_string();
        let entry = JournalEntry {
            title: format!("{} crawler cursor: {}", self.crawler, name),
            content: value.clone(),
            tags: vec![],
            context: EntryContext {
                context_type: CURSOR_CONTEXT_TYPE.to_string(),
                context_id: name.to_string(),
                context_url: value,
            },
        };

        self.journal
            .create_entry(&entry)
            .await
            .map_err(|source| CursorError::Journal {
                cursor: name.to_string(),
                source,
            })
    }
}
