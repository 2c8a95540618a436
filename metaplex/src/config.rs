use std::time::Duration;

use shared::journal::DEFAULT_SPIRE_URL;
use shared::log_config::LogConfig;
use shared::rate_limit::Rate;

use crate::crawler::{NotConfirmedPolicy, METAPLEX_PROGRAM_KEY};

fn parse_duration(value: &str) -> Result<Duration, String> {
    duration_str::parse(value).map_err(|e| e.to_string())
}

fn parse_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value.parse().map_err(|e| format!("{}: {}", value, e))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(format!("rate must be a positive number, got {}", value))
    }
}

/// Reports Solana transactions that involve a program to a Bugout journal.
///
/// Run at most one instance per cursor name: instances sharing a cursor
/// overwrite each other's progress and publish duplicate reports.
#[derive(clap::Parser)]
#[command(version)]
pub struct AppConfig {
    #[clap(
        long,
        env = "SOLANA_RPC_URL",
        default_value = "https://api.mainnet-beta.solana.com"
    )]
    pub rpc_url: String,

    /// Timeout of a single HTTP request, e.g. `5s` or `500ms`.
    #[clap(long, env, default_value = "5s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Requests per second sent to the RPC node.
    #[clap(long, env, default_value_t = 4.0, value_parser = parse_rate)]
    pub rate: f64,

    /// Requests that may be sent back to back. Defaults to the whole part
    /// of the rate.
    #[clap(long, env)]
    pub burst: Option<u32>,

    /// Lowest slot to scan. A stored cursor past it takes precedence.
    #[clap(long, env = "START_SLOT", default_value_t = 0)]
    pub start: u64,

    #[clap(long, env, default_value = METAPLEX_PROGRAM_KEY)]
    pub program_key: String,

    /// Name of the cursor recording crawl progress.
    #[clap(long, env = "CURSOR_NAME")]
    pub cursor: String,

    #[clap(long, env = "BUGOUT_JOURNAL_ID")]
    pub journal_id: String,

    #[clap(long, env = "BUGOUT_ACCESS_TOKEN", hide_env_values = true)]
    pub token: String,

    #[clap(long, env = "BUGOUT_SPIRE_URL", default_value = DEFAULT_SPIRE_URL)]
    pub spire_url: String,

    /// What to do when a listed block has no confirmed content.
    #[clap(
        long,
        env = "NOT_CONFIRMED_POLICY",
        value_enum,
        default_value_t = NotConfirmedPolicy::Abort
    )]
    pub not_confirmed: NotConfirmedPolicy,

    /// Pause between two crawls, also used as the retry delay.
    #[clap(
        long,
        env = "CRAWL_INTERVAL",
        default_value = "60s",
        value_parser = parse_duration
    )]
    pub interval: Duration,

    /// Crawl once and exit.
    #[clap(long)]
    pub once: bool,

    #[command(flatten)]
    pub log: LogConfig,
}

impl AppConfig {
    pub fn rate(&self) -> Rate {
        match self.burst {
            Some(burst) => Rate::new(self.rate, burst),
            None => Rate::per_second(self.rate),
        }
    }
}
