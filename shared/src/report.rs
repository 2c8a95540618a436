use async_trait::async_trait;
use thiserror::Error;

use crate::block::Slot;
use crate::journal::{EntryContext, Journal, JournalEntry, JournalError};
use crate::transaction::ResolvedTransaction;

pub const REPORT_CONTEXT_TYPE: &str = "solana";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Transaction does not have a signature")]
    MissingSignature,
    #[error("Failed to encode transaction: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receives the reports a crawler produces.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, report: &JournalEntry) -> Result<(), JournalError>;
}

#[async_trait]
impl<J: Journal + ?Sized> ReportSink for J {
    async fn publish(&self, report: &JournalEntry) -> Result<(), JournalError> {
        self.create_entry(report).await
    }
}

/// Builds the journal entry describing `transaction`, found in a block with
/// the given `parent_slot` and `blockhash`.
///
/// Tags are `status:`, `client:` (blockhash), `slot:` (parent slot) and one
/// `session:` tag for every account key after the first. The first key is
/// the fee payer and is left out.
pub fn transaction_report(
    parent_slot: Slot,
    blockhash: &str,
    transaction: &ResolvedTransaction,
    program_key: &str,
) -> Result<JournalEntry, ReportError> {
    let signature = transaction
        .signature()
        .ok_or(ReportError::MissingSignature)?;
    let status = transaction.status();

    let encoded = serde_json::to_string_pretty(transaction)?;

    let mut tags = vec![
        format!("status:{}", status),
        format!("client:{}", blockhash),
        format!("slot:{}", parent_slot),
    ];
    tags.extend(
        transaction
            .account_keys()
            .iter()
            .skip(1)
            .map(|key| format!("session:{}", key)),
    );

    Ok(JournalEntry {
        title: format!("Transaction: {} -- {}", signature, status),
        content: format!("```json\n{}\n```\n", encoded),
        tags,
        context: EntryContext {
            context_type: REPORT_CONTEXT_TYPE.to_string(),
            context_id: program_key.to_string(),
            context_url: String::new(),
        },
    })
}
