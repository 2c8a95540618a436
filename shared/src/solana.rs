//! Minimal Solana JSON-RPC client: only the calls the crawlers need.

use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::block::{Block, Slot};
use crate::rpc::{RpcTransport, TransportError};

/// Widest range `getBlocks` accepts, in slots between start and end.
pub const MAX_SLOT_RANGE: u64 = 500_000;

/// First solana-core release serving `getBlocks` and `getBlock`. Older nodes
/// only know the `getConfirmed*` names.
pub const CURRENT_API_SINCE: Version = Version::new(1, 7, 0);

pub mod rpc_methods {
    pub const GET_VERSION: &str = "getVersion";
    pub const GET_SLOT: &str = "getSlot";
    pub const GET_BLOCKS: &str = "getBlocks";
    pub const GET_BLOCK: &str = "getBlock";
    pub const GET_CONFIRMED_BLOCKS: &str = "getConfirmedBlocks";
    pub const GET_CONFIRMED_BLOCK: &str = "getConfirmedBlock";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeViolation {
    #[error("end slot precedes start slot")]
    Reversed,
    #[error("range spans more than {} slots", MAX_SLOT_RANGE)]
    TooWide,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{method} call failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("Invalid slot range [{start}, {end}]: {reason}")]
    InvalidRange {
        start: Slot,
        end: Slot,
        reason: RangeViolation,
    },
    #[error("Block at slot {slot} is not confirmed")]
    NotConfirmed { slot: Slot },
    #[error("Failed to decode {method} result: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unrecognized solana-core version {version:?}: {source}")]
    Version {
        version: String,
        #[source]
        source: semver::Error,
    },
}

impl ClientError {
    pub fn is_not_confirmed(&self) -> bool {
        matches!(self, Self::NotConfirmed { .. })
    }
}

/// Checks a `getBlocks` range before anything goes over the wire.
pub fn check_slot_range(start: Slot, end: Slot) -> Result<(), ClientError> {
    let reason = if end < start {
        RangeViolation::Reversed
    } else if end - start > MAX_SLOT_RANGE {
        RangeViolation::TooWide
    } else {
        return Ok(());
    };

    Err(ClientError::InvalidRange { start, end, reason })
}

/// Method names for the calls that were renamed in solana-core 1.7.0,
/// resolved once per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodNames {
    pub get_blocks: &'static str,
    pub get_block: &'static str,
}

impl MethodNames {
    pub const CURRENT: Self = Self {
        get_blocks: rpc_methods::GET_BLOCKS,
        get_block: rpc_methods::GET_BLOCK,
    };

    pub const LEGACY: Self = Self {
        get_blocks: rpc_methods::GET_CONFIRMED_BLOCKS,
        get_block: rpc_methods::GET_CONFIRMED_BLOCK,
    };

    pub fn for_version(version: &Version) -> Self {
        if *version < CURRENT_API_SINCE {
            Self::LEGACY
        } else {
            Self::CURRENT
        }
    }
}

/// Parses the `solana-core` string reported by `getVersion`. A leading `v`
/// is tolerated.
pub fn parse_core_version(version: &str) -> Result<Version, ClientError> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    Version::parse(trimmed).map_err(|source| ClientError::Version {
        version: version.to_string(),
        source,
    })
}

/// The chain operations a crawler depends on.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head slot.
    async fn get_slot(&self) -> Result<Slot, ClientError>;

    /// Confirmed slots in `[start, end]`, in the order the node returns them.
    async fn get_blocks(
        &self,
        start: Slot,
        end: Slot,
    ) -> Result<Vec<Slot>, ClientError>;

    /// Full block at `slot`. Fails with [ClientError::NotConfirmed] when the
    /// node has no confirmed content for it.
    async fn get_block(&self, slot: Slot) -> Result<Block, ClientError>;
}

#[async_trait]
impl<C: ChainClient + ?Sized> ChainClient for Arc<C> {
    async fn get_slot(&self) -> Result<Slot, ClientError> {
        (**self).get_slot().await
    }

    async fn get_blocks(
        &self,
        start: Slot,
        end: Slot,
    ) -> Result<Vec<Slot>, ClientError> {
        (**self).get_blocks(start, end).await
    }

    async fn get_block(&self, slot: Slot) -> Result<Block, ClientError> {
        (**self).get_block(slot).await
    }
}

#[derive(Debug, Deserialize)]
struct VersionResult {
    #[serde(rename = "solana-core")]
    solana_core: String,
}

#[derive(Debug)]
pub struct SolanaClient {
    transport: RpcTransport,
    core_version: String,
    methods: MethodNames,
}

impl SolanaClient {
    /// Asks the node for its version and picks the method names to use for
    /// the lifetime of the client.
    pub async fn new(transport: RpcTransport) -> Result<Self, ClientError> {
        let core_version = query_version(&transport).await?;
        let methods = MethodNames::for_version(&parse_core_version(
            &core_version,
        )?);

        tracing::info!(
            url = transport.url(),
            core_version = %core_version,
            get_blocks = methods.get_blocks,
            get_block = methods.get_block,
            "Connected to Solana node"
        );

        Ok(Self {
            transport,
            core_version,
            methods,
        })
    }

    pub fn core_version(&self) -> &str {
        &self.core_version
    }

    pub fn method_names(&self) -> MethodNames {
        self.methods
    }

    pub async fn get_version(&self) -> Result<String, ClientError> {
        query_version(&self.transport).await
    }
}

#[async_trait]
impl ChainClient for SolanaClient {
    async fn get_slot(&self) -> Result<Slot, ClientError> {
        call(&self.transport, rpc_methods::GET_SLOT, &[]).await
    }

    async fn get_blocks(
        &self,
        start: Slot,
        end: Slot,
    ) -> Result<Vec<Slot>, ClientError> {
        check_slot_range(start, end)?;

        call(
            &self.transport,
            self.methods.get_blocks,
            &[json!(start), json!(end)],
        )
        .await
    }

    async fn get_block(&self, slot: Slot) -> Result<Block, ClientError> {
        let method = self.methods.get_block;
        let result = raw_call(&self.transport, method, &[json!(slot)]).await?;

        if result.is_null() {
            return Err(ClientError::NotConfirmed { slot });
        }

        decode(method, result)
    }
}

async fn query_version(transport: &RpcTransport) -> Result<String, ClientError> {
    let result: VersionResult =
        call(transport, rpc_methods::GET_VERSION, &[]).await?;

    Ok(result.solana_core)
}

async fn raw_call(
    transport: &RpcTransport,
    method: &'static str,
    params: &[Value],
) -> Result<Value, ClientError> {
    transport
        .call(method, params)
        .await
        .map_err(|source| ClientError::Transport { method, source })
}

async fn call<T: DeserializeOwned>(
    transport: &RpcTransport,
    method: &'static str,
    params: &[Value],
) -> Result<T, ClientError> {
    let result = raw_call(transport, method, params).await?;
    decode(method, result)
}

fn decode<T: DeserializeOwned>(
    method: &'static str,
    result: Value,
) -> Result<T, ClientError> {
    serde_json::from_value(result)
        .map_err(|source| ClientError::Decode { method, source })
}
