use shared::block::{Block, Slot};
use shared::cursor::{CursorError, CursorStore};
use shared::error::MainError;
use shared::journal::JournalError;
use shared::report::{transaction_report, ReportError, ReportSink};
use shared::solana::{ChainClient, ClientError, MAX_SLOT_RANGE};
use thiserror::Error;

pub const METAPLEX_PROGRAM_KEY: &str =
    "p1exdMJcjVao65QdewkaZRUnU6VPSXhus9n2GzWfh98";

/// Shows up in the titles of the cursor entries.
pub const CRAWLER_NAME: &str = "Metaplex";

/// What to do with a listed slot whose block the node has no confirmed
/// content for.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NotConfirmedPolicy {
    /// Fail the crawl. The window is scanned again on the next run.
    #[default]
    Abort,
    /// Log the slot and move on to the next one.
    Skip,
}

#[derive(Debug, Clone)]
pub struct CrawlerSettings {
    pub program_key: String,
    pub cursor_name: String,
    pub start_slot: Slot,
    pub not_confirmed: NotConfirmedPolicy,
}

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error("Can't report transaction in block {slot}: {source}")]
    Report {
        slot: Slot,
        #[source]
        source: ReportError,
    },
    #[error("Failed to publish report for {signature}: {source}")]
    Publish {
        signature: String,
        #[source]
        source: JournalError,
    },
}

impl From<CrawlError> for MainError {
    fn from(error: CrawlError) -> Self {
        tracing::error!(reason = %error, "Crawl failed");

        match error {
            CrawlError::Client(_) | CrawlError::Report { .. } => {
                MainError::RpcError
            }
            CrawlError::Cursor(CursorError::Parse { .. }) => MainError::Config,
            CrawlError::Cursor(CursorError::Journal { .. })
            | CrawlError::Publish { .. } => MainError::Journal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub windows: u64,
    pub blocks: u64,
    pub reports: u64,
    pub skipped: u64,
}

/// First slot to scan: the stored cursor moves the start forward past the
/// last recorded value, never below `start`.
pub fn resolve_start(start: Slot, stored: Option<Slot>) -> Slot {
    match stored {
        Some(value) if value >= start => value.saturating_add(1),
        _ => start,
    }
}

/// Scans the chain window by window for transactions touching the program
/// key and publishes one report per transaction found.
pub struct Crawler<C, S, R> {
    client: C,
    cursor: S,
    reports: R,
    settings: CrawlerSettings,
    next_slot: Slot,
}

impl<C, S, R> Crawler<C, S, R>
where
    C: ChainClient,
    S: CursorStore,
    R: ReportSink,
{
    pub async fn new(
        client: C,
        cursor: S,
        reports: R,
        settings: CrawlerSettings,
    ) -> Result<Self, CrawlError> {
        let stored = cursor.read_cursor(&settings.cursor_name).await?;
        let next_slot = resolve_start(settings.start_slot, stored);

        tracing::info!(
            cursor = %settings.cursor_name,
            stored = ?stored,
            start = settings.start_slot,
            next_slot,
            "Resolved crawl start"
        );

        Ok(Self {
            client,
            cursor,
            reports,
            settings,
            next_slot,
        })
    }

    pub fn next_slot(&self) -> Slot {
        self.next_slot
    }

    /// Catches up with the head slot as of the start of the call. The cursor
    /// only advances once every report of a window has been published, so an
    /// error leaves it at the start of the failed window.
    pub async fn crawl(&mut self) -> Result<CrawlSummary, CrawlError> {
        let head = self.client.get_slot().await?;
        let mut summary = CrawlSummary::default();

        tracing::info!(head, next_slot = self.next_slot, "Crawling to head");

        while self.next_slot <= head {
            let window_start = self.next_slot;
            let window_end = window_start.saturating_add(MAX_SLOT_RANGE);

            tracing::info!(window_start, window_end, "Scanning window");

            let slots =
                self.client.get_blocks(window_start, window_end).await?;
            for slot in slots {
                let block = match self.client.get_block(slot).await {
                    Ok(block) => block,
                    Err(error)
                        if error.is_not_confirmed()
                            && self.settings.not_confirmed
                                == NotConfirmedPolicy::Skip =>
                    {
                        tracing::warn!(slot, "Block not confirmed, skipping");
                        summary.skipped += 1;
                        continue;
                    }
                    Err(error) => return Err(error.into()),
                };

                summary.reports += self.process_block(slot, &block).await?;
                summary.blocks += 1;
            }

            let next_slot = window_end.saturating_add(1);
            self.cursor
                .write_cursor(&self.settings.cursor_name, next_slot)
                .await?;
            self.next_slot = next_slot;
            summary.windows += 1;

            tracing::info!(
                cursor = %self.settings.cursor_name,
                next_slot,
                "Window done, cursor advanced"
            );
        }

        Ok(summary)
    }

    async fn process_block(
        &self,
        slot: Slot,
        block: &Block,
    ) -> Result<u64, CrawlError> {
        let program_key = self.settings.program_key.as_str();
        let mut published = 0;

        tracing::debug!(
            slot,
            txs = block.transactions.len(),
            "Processing block"
        );

        for transaction in block.transactions_involving(program_key) {
            let report = transaction_report(
                block.parent_slot,
                &block.blockhash,
                transaction,
                program_key,
            )
            .map_err(|source| CrawlError::Report { slot, source })?;

            // Signature presence was checked while building the report.
            let signature = transaction.signature().unwrap_or_default();
            self.reports.publish(&report).await.map_err(|source| {
                CrawlError::Publish {
                    signature: signature.to_string(),
                    source,
                }
            })?;

            tracing::info!(slot, signature, "Published transaction report");
            published += 1;
        }

        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shared::cursor::{JournalCursor, CURSOR_CONTEXT_TYPE};
    use shared::journal::{EntryContext, JournalEntry};
    use shared::report::REPORT_CONTEXT_TYPE;
    use test_helpers::builders::{block, signed, transaction};
    use test_helpers::chain::ScriptedChain;
    use test_helpers::journal::InMemoryJournal;

    use super::*;

    const PROGRAM: &str = "Program1111";

    type TestCrawler = Crawler<
        Arc<ScriptedChain>,
        JournalCursor<Arc<InMemoryJournal>>,
        Arc<InMemoryJournal>,
    >;

    fn settings(start_slot: Slot) -> CrawlerSettings {
        CrawlerSettings {
            program_key: PROGRAM.to_string(),
            cursor_name: "main".to_string(),
            start_slot,
            not_confirmed: NotConfirmedPolicy::Abort,
        }
    }

    fn cursor_entry(value: &str) -> JournalEntry {
        JournalEntry {
            title: "Metaplex crawler cursor: main".to_string(),
            content: value.to_string(),
            tags: vec![],
            context: EntryContext {
                context_type: CURSOR_CONTEXT_TYPE.to_string(),
                context_id: "main".to_string(),
                context_url: value.to_string(),
            },
        }
    }

    async fn crawler(
        chain: &Arc<ScriptedChain>,
        journal: &Arc<InMemoryJournal>,
        settings: CrawlerSettings,
    ) -> TestCrawler {
        Crawler::new(
            chain.clone(),
            JournalCursor::new(journal.clone(), CRAWLER_NAME),
            journal.clone(),
            settings,
        )
        .await
        .unwrap()
    }

    fn cursor_values(journal: &InMemoryJournal) -> Vec<String> {
        journal
            .entries_of_type(CURSOR_CONTEXT_TYPE)
            .into_iter()
            .map(|entry| entry.context.context_url)
            .collect()
    }

    fn report_titles(journal: &InMemoryJournal) -> Vec<String> {
        journal
            .entries_of_type(REPORT_CONTEXT_TYPE)
            .into_iter()
            .map(|entry| entry.title)
            .collect()
    }

    #[test]
    fn test_resolve_start() {
        assert_eq!(resolve_start(1000, None), 1000);
        assert_eq!(resolve_start(1000, Some(999)), 1000);
        assert_eq!(resolve_start(1000, Some(1000)), 1001);
        assert_eq!(resolve_start(1000, Some(501001)), 501002);
        assert_eq!(resolve_start(0, Some(0)), 1);
        assert_eq!(resolve_start(5, Some(Slot::MAX)), Slot::MAX);

        for start in [0, 1, 10, 1000] {
            for stored in [0, 1, 9, 10, 11, 999, 1000, 1001] {
                assert_eq!(
                    resolve_start(start, Some(stored)),
                    start.max(stored + 1)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_stored_cursor_moves_start_forward() {
        let chain = Arc::new(ScriptedChain::new(0));
        let journal = Arc::new(
            InMemoryJournal::new()
                .with_entry(cursor_entry("10"))
                .with_entry(cursor_entry("2000")),
        );

        let crawler = crawler(&chain, &journal, settings(1000)).await;

        assert_eq!(crawler.next_slot(), 2001);
    }

    #[tokio::test]
    async fn test_unparseable_cursor_fails_construction() {
        let chain = Arc::new(ScriptedChain::new(0));
        let journal =
            Arc::new(InMemoryJournal::new().with_entry(cursor_entry("abc")));

        let result = Crawler::new(
            chain,
            JournalCursor::new(journal.clone(), CRAWLER_NAME),
            journal,
            settings(0),
        )
        .await;

        match result {
            Err(error @ CrawlError::Cursor(CursorError::Parse { .. })) => {
                assert_eq!(MainError::from(error), MainError::Config);
            }
            Err(other) => panic!("expected parse error, got {:?}", other),
            Ok(_) => panic!("expected parse error"),
        }
    }

    #[tokio::test]
    async fn test_single_window_up_to_head() {
        let chain = Arc::new(
            ScriptedChain::new(1000)
                .with_block(
                    1000,
                    block(999, "H1", vec![signed("sig1", &["A", PROGRAM])]),
                )
                .with_block(1200, block(1000, "H2", vec![])),
        );
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(1000)).await;

        let summary = crawler.crawl().await.unwrap();

        assert_eq!(chain.listed_ranges(), vec![(1000, 501000)]);
        assert_eq!(chain.fetched_blocks(), vec![1000, 1200]);
        assert_eq!(
            summary,
            CrawlSummary {
                windows: 1,
                blocks: 2,
                reports: 1,
                skipped: 0,
            }
        );
        assert_eq!(crawler.next_slot(), 501001);
        assert_eq!(cursor_values(&journal), vec!["501001"]);
        assert_eq!(report_titles(&journal), vec!["Transaction: sig1 -- SUCCESS"]);

        let report = &journal.entries_of_type(REPORT_CONTEXT_TYPE)[0];
        assert_eq!(report.context.context_id, PROGRAM);
        assert_eq!(report.tags[1], "client:H1");
        assert_eq!(report.tags[2], "slot:999");
    }

    #[tokio::test]
    async fn test_window_past_head_is_not_scanned() {
        let chain = Arc::new(ScriptedChain::new(1000));
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(1001)).await;

        let summary = crawler.crawl().await.unwrap();

        assert_eq!(summary, CrawlSummary::default());
        assert!(chain.listed_ranges().is_empty());
        assert!(journal.entries().is_empty());
        assert_eq!(crawler.next_slot(), 1001);
    }

    #[tokio::test]
    async fn test_head_is_snapshotted_once_per_crawl() {
        let chain = Arc::new(ScriptedChain::new(600_000));
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(0)).await;

        crawler.crawl().await.unwrap();

        assert_eq!(
            chain.listed_ranges(),
            vec![(0, 500_000), (500_001, 1_000_001)]
        );
        assert_eq!(cursor_values(&journal), vec!["500001", "1000002"]);

        chain.set_head(1_200_000);
        crawler.crawl().await.unwrap();

        assert_eq!(chain.listed_ranges().last(), Some(&(1_000_002, 1_500_002)));
        assert_eq!(crawler.next_slot(), 1_500_003);
    }

    #[tokio::test]
    async fn test_program_key_matches_anywhere_in_accounts() {
        let chain = Arc::new(ScriptedChain::new(10).with_block(
            10,
            block(
                9,
                "H",
                vec![
                    signed("payer", &[PROGRAM, "B"]),
                    signed("middle", &["A", PROGRAM, "C"]),
                    signed("unrelated", &["A", "B", "C"]),
                    transaction(&["failed"], &["A", "B", PROGRAM], false),
                ],
            ),
        ));
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(10)).await;

        let summary = crawler.crawl().await.unwrap();

        assert_eq!(summary.reports, 3);
        assert_eq!(
            report_titles(&journal),
            vec![
                "Transaction: payer -- SUCCESS",
                "Transaction: middle -- SUCCESS",
                "Transaction: failed -- FAILURE",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_mid_window_keeps_cursor_and_rescans() {
        let chain = Arc::new(
            ScriptedChain::new(100)
                .with_block(
                    10,
                    block(9, "H1", vec![signed("first", &["A", PROGRAM])]),
                )
                .with_block(
                    20,
                    block(19, "H2", vec![signed("second", &["A", PROGRAM])]),
                ),
        );
        chain.fail_once(20);
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(10)).await;

        let error = crawler.crawl().await.unwrap_err();

        assert!(matches!(error, CrawlError::Client(ClientError::Transport { .. })));
        assert_eq!(MainError::from(error), MainError::RpcError);
        assert!(cursor_values(&journal).is_empty());
        assert_eq!(crawler.next_slot(), 10);
        assert_eq!(report_titles(&journal), vec!["Transaction: first -- SUCCESS"]);

        crawler.crawl().await.unwrap();

        assert_eq!(chain.listed_ranges(), vec![(10, 500_010), (10, 500_010)]);
        assert_eq!(
            report_titles(&journal),
            vec![
                "Transaction: first -- SUCCESS",
                "Transaction: first -- SUCCESS",
                "Transaction: second -- SUCCESS",
            ]
        );
        assert_eq!(cursor_values(&journal), vec!["500011"]);
    }

    #[tokio::test]
    async fn test_restart_after_failure_resumes_from_stored_cursor() {
        let chain = Arc::new(
            ScriptedChain::new(100)
                .with_block(5, block(4, "H", vec![signed("s", &[PROGRAM])])),
        );
        let journal = Arc::new(
            InMemoryJournal::new().with_entry(cursor_entry("3")),
        );
        chain.fail_once(5);

        let mut first = crawler(&chain, &journal, settings(0)).await;
        assert!(first.crawl().await.is_err());

        let mut second = crawler(&chain, &journal, settings(0)).await;
        assert_eq!(second.next_slot(), 4);
        second.crawl().await.unwrap();

        assert_eq!(chain.listed_ranges(), vec![(4, 500_004), (4, 500_004)]);
        assert_eq!(cursor_values(&journal), vec!["3", "500005"]);
    }

    #[tokio::test]
    async fn test_missing_signature_aborts_without_publishing() {
        let chain = Arc::new(ScriptedChain::new(10).with_block(
            10,
            block(9, "H", vec![transaction(&[], &["A", PROGRAM], true)]),
        ));
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(10)).await;

        let error = crawler.crawl().await.unwrap_err();

        assert!(matches!(
            error,
            CrawlError::Report {
                slot: 10,
                source: ReportError::MissingSignature,
            }
        ));
        assert!(journal.entries().is_empty());
        assert_eq!(crawler.next_slot(), 10);
    }

    #[tokio::test]
    async fn test_publish_failure_aborts_window() {
        let chain = Arc::new(ScriptedChain::new(10).with_block(
            10,
            block(
                9,
                "H",
                vec![signed("a", &[PROGRAM]), signed("b", &[PROGRAM])],
            ),
        ));
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(10)).await;
        journal.fail_creates_after(1);

        let error = crawler.crawl().await.unwrap_err();

        match &error {
            CrawlError::Publish { signature, .. } => assert_eq!(signature, "b"),
            other => panic!("expected publish error, got {:?}", other),
        }
        assert_eq!(MainError::from(error), MainError::Journal);
        assert!(cursor_values(&journal).is_empty());

        journal.accept_creates();
        crawler.crawl().await.unwrap();

        assert_eq!(
            report_titles(&journal),
            vec![
                "Transaction: a -- SUCCESS",
                "Transaction: a -- SUCCESS",
                "Transaction: b -- SUCCESS",
            ]
        );
        assert_eq!(cursor_values(&journal), vec!["500011"]);
        assert_eq!(crawler.next_slot(), 500_011);
    }

    #[tokio::test]
    async fn test_cursor_reads_always_query_the_journal() {
        let journal = Arc::new(InMemoryJournal::new());
        let cursor = JournalCursor::new(journal.clone(), CRAWLER_NAME);

        assert_eq!(cursor.read_cursor("main").await.unwrap(), None);
        cursor.write_cursor("main", 42).await.unwrap();
        assert_eq!(cursor.read_cursor("main").await.unwrap(), Some(42));
        cursor.write_cursor("main", 43).await.unwrap();
        assert_eq!(cursor.read_cursor("main").await.unwrap(), Some(43));

        assert_eq!(journal.searches(), 3);
        assert_eq!(cursor_values(&journal), vec!["42", "43"]);
        assert_eq!(
            journal.entries()[0].title,
            "Metaplex crawler cursor: main"
        );
    }

    #[tokio::test]
    async fn test_cursor_write_failure_keeps_next_slot() {
        let chain = Arc::new(ScriptedChain::new(10));
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(10)).await;
        journal.fail_creates_after(0);

        let error = crawler.crawl().await.unwrap_err();

        assert!(matches!(
            error,
            CrawlError::Cursor(CursorError::Journal { .. })
        ));
        assert_eq!(crawler.next_slot(), 10);
    }

    #[tokio::test]
    async fn test_not_confirmed_block_aborts_by_default() {
        let chain = Arc::new(
            ScriptedChain::new(10)
                .with_unconfirmed(5)
                .with_block(7, block(6, "H", vec![signed("s", &[PROGRAM])])),
        );
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(0)).await;

        let error = crawler.crawl().await.unwrap_err();

        assert!(matches!(
            error,
            CrawlError::Client(ClientError::NotConfirmed { slot: 5 })
        ));
        assert_eq!(chain.fetched_blocks(), vec![5]);
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_not_confirmed_block_skipped_on_request() {
        let chain = Arc::new(
            ScriptedChain::new(10)
                .with_unconfirmed(5)
                .with_block(7, block(6, "H", vec![signed("s", &[PROGRAM])])),
        );
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(
            &chain,
            &journal,
            CrawlerSettings {
                not_confirmed: NotConfirmedPolicy::Skip,
                ..settings(0)
            },
        )
        .await;

        let summary = crawler.crawl().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.reports, 1);
        assert_eq!(chain.fetched_blocks(), vec![5, 7]);
        assert_eq!(cursor_values(&journal), vec!["500001"]);
    }

    #[tokio::test]
    async fn test_head_failure_changes_nothing() {
        let chain = Arc::new(ScriptedChain::new(10));
        chain.fail_head_once();
        let journal = Arc::new(InMemoryJournal::new());
        let mut crawler = crawler(&chain, &journal, settings(0)).await;

        assert!(crawler.crawl().await.is_err());
        assert!(chain.listed_ranges().is_empty());
        assert!(journal.entries().is_empty());
    }
}
