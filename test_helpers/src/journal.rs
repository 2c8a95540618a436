use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use shared::journal::{
    Journal, JournalEntry, JournalError, SearchOrder, SearchQuery,
    SearchResult, SearchResults,
};

#[derive(Debug, Default)]
struct State {
    entries: Vec<JournalEntry>,
    creates_left: Option<usize>,
    searches: usize,
}

/// [Journal] keeping entries in memory, in creation order.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    state: Mutex<State>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, entry: JournalEntry) -> Self {
        self.state.lock().unwrap().entries.push(entry);
        self
    }

    /// Accept `count` more entries, then fail every create.
    pub fn fail_creates_after(&self, count: usize) {
        self.state.lock().unwrap().creates_left = Some(count);
    }

    pub fn accept_creates(&self) {
        self.state.lock().unwrap().creates_left = None;
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.state.lock().unwrap().entries.clone()
    }

    pub fn entries_of_type(&self, context_type: &str) -> Vec<JournalEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.context.context_type == context_type)
            .collect()
    }

    pub fn searches(&self) -> usize {
        self.state.lock().unwrap().searches
    }
}

/// Matches the `key:value` filters of a free-text query against an entry's
/// context.
fn matches(entry: &JournalEntry, query: &str) -> bool {
    query.split_whitespace().all(|term| match term.split_once(':') {
        Some(("context_type", value)) => entry.context.context_type == value,
        Some(("context_id", value)) => entry.context.context_id == value,
        _ => true,
    })
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn search_entries(
        &self,
        query: &SearchQuery,
    ) -> Result<SearchResults, JournalError> {
        let mut state = self.state.lock().unwrap();
        state.searches += 1;

        let mut found: Vec<&JournalEntry> = state
            .entries
            .iter()
            .filter(|entry| matches(entry, &query.query))
            .collect();
        if query.order == SearchOrder::Desc {
            found.reverse();
        }

        let total_results = found.len() as u64;
        let results = found
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|entry| SearchResult {
                title: entry.title.clone(),
                content: query.content.then(|| entry.content.clone()),
                tags: entry.tags.clone(),
                context_type: Some(entry.context.context_type.clone()),
                context_id: Some(entry.context.context_id.clone()),
                context_url: Some(entry.context.context_url.clone()),
                ..SearchResult::default()
            })
            .collect();

        Ok(SearchResults {
            total_results,
            results,
        })
    }

    async fn create_entry(
        &self,
        entry: &JournalEntry,
    ) -> Result<(), JournalError> {
        let mut state = self.state.lock().unwrap();
        match state.creates_left.as_mut() {
            Some(0) => {
                return Err(JournalError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: "injected failure".to_string(),
                })
            }
            Some(left) => *left -= 1,
            None => {}
        }

        state.entries.push(entry.clone());
        Ok(())
    }
}
