pub mod block;
pub mod crawler;
pub mod cursor;
pub mod error;
pub mod journal;
pub mod log_config;
pub mod rate_limit;
pub mod report;
pub mod rpc;
pub mod solana;
pub mod transaction;
