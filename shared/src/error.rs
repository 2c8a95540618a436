use std::fmt::Debug;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MainError {
    #[error("No action error")]
    NoAction,
    #[error("RPC error")]
    RpcError,
    #[error("Can't read from or write to the journal")]
    Journal,
    #[error("Invalid configuration")]
    Config,
}

impl MainError {
    /// Errors the scheduler keeps retrying. Anything else stops the process.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoAction | Self::RpcError | Self::Journal)
    }
}

pub trait AsRpcError<T> {
    fn into_rpc_error(self) -> Result<T, MainError>;
}

impl<T, E: Debug> AsRpcError<T> for Result<T, E> {
    #[inline]
    fn into_rpc_error(self) -> Result<T, MainError> {
        self.map_err(|reason| {
            tracing::error!(?reason, "RPC error");
            MainError::RpcError
        })
    }
}

pub trait AsJournalError<T> {
    fn into_journal_error(self) -> Result<T, MainError>;
}

impl<T, E: Debug> AsJournalError<T> for Result<T, E> {
    #[inline]
    fn into_journal_error(self) -> Result<T, MainError> {
        self.map_err(|reason| {
            tracing::error!(?reason, "Journal error");
            MainError::Journal
        })
    }
}

pub trait AsConfigError<T> {
    fn into_config_error(self) -> Result<T, MainError>;
}

impl<T, E: Debug> AsConfigError<T> for Result<T, E> {
    #[inline]
    fn into_config_error(self) -> Result<T, MainError> {
        self.map_err(|reason| {
            tracing::error!(?reason, "{}", MainError::Config);
            MainError::Config
        })
    }
}
