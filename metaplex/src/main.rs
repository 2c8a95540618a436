use std::sync::Arc;

use clap::Parser;
use metaplex::config::AppConfig;
use metaplex::crawler::{Crawler, CrawlerSettings, CRAWLER_NAME};
use shared::crawler::{crawl, must_exit_handle};
use shared::cursor::JournalCursor;
use shared::error::{AsConfigError, AsJournalError, AsRpcError, MainError};
use shared::journal::BugoutJournal;
use shared::rate_limit::RateLimit;
use shared::rpc::RpcTransport;
use shared::solana::SolanaClient;
use tokio::sync::Mutex;

type MetaplexCrawler = Crawler<
    SolanaClient,
    JournalCursor<Arc<BugoutJournal>>,
    Arc<BugoutJournal>,
>;

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let config = AppConfig::parse();

    config.log.init();

    let must_exit = must_exit_handle();

    let rate = config.rate();
    tracing::info!(
        rpc_url = %config.rpc_url,
        rate = rate.requests_per_second(),
        burst = rate.burst(),
        "Starting Metaplex crawler"
    );

    let transport = RpcTransport::new(
        config.rpc_url.as_str(),
        config.request_timeout,
        RateLimit::new(rate),
        must_exit.clone(),
    )
    .into_config_error()?;
    let client = SolanaClient::new(transport).await.into_rpc_error()?;

    let journal = Arc::new(
        BugoutJournal::new(
            config.spire_url.as_str(),
            config.journal_id.as_str(),
            config.token.as_str(),
            config.request_timeout,
        )
        .into_journal_error()?,
    );

    let settings = CrawlerSettings {
        program_key: config.program_key.clone(),
        cursor_name: config.cursor.clone(),
        start_slot: config.start,
        not_confirmed: config.not_confirmed,
    };
    let crawler = Crawler::new(
        client,
        JournalCursor::new(journal.clone(), CRAWLER_NAME),
        journal,
        settings,
    )
    .await
    .map_err(MainError::from)?;

    let crawler = Arc::new(Mutex::new(crawler));

    crawl(
        move || crawling_fn(crawler.clone()),
        config.interval,
        config.once,
        must_exit,
    )
    .await
}

async fn crawling_fn(
    crawler: Arc<Mutex<MetaplexCrawler>>,
) -> Result<(), MainError> {
    let mut crawler = crawler.lock().await;
    let summary = crawler.crawl().await?;

    tracing::info!(
        windows = summary.windows,
        blocks = summary.blocks,
        reports = summary.reports,
        skipped = summary.skipped,
        next_slot = crawler.next_slot(),
        "Crawl finished"
    );

    Ok(())
}
