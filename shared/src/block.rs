use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transaction::ResolvedTransaction;

pub type Slot = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub pubkey: String,
    pub lamports: i64,
    pub post_balance: u64,
    #[serde(default)]
    pub reward_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission: Option<u8>,
}

/// A confirmed block as returned by `getBlock` with the default (full, json)
/// transaction details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub blockhash: String,
    pub previous_blockhash: String,
    pub parent_slot: Slot,
    #[serde(default)]
    pub transactions: Vec<ResolvedTransaction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<String>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub block_height: Option<u64>,
}

impl Block {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.block_time
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
    }

    /// Transactions whose account list references `account_key`, in block
    /// order.
    pub fn transactions_involving<'a>(
        &'a self,
        account_key: &'a str,
    ) -> impl Iterator<Item = &'a ResolvedTransaction> + 'a {
        self.transactions
            .iter()
            .filter(move |transaction| transaction.involves(account_key))
    }
}
