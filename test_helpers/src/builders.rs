use serde_json::json;
use shared::block::{Block, Slot};
use shared::transaction::{
    CompiledInstruction, Message, MessageHeader, ResolvedTransaction,
    Transaction, TransactionMeta,
};

pub fn transaction(
    signatures: &[&str],
    account_keys: &[&str],
    success: bool,
) -> ResolvedTransaction {
    let err = if success {
        None
    } else {
        Some(json!({ "InstructionError": [0, { "Custom": 1 }] }))
    };
    let balances = vec![1_000_000; account_keys.len()];

    ResolvedTransaction {
        transaction: Transaction {
            signatures: signatures.iter().map(|s| s.to_string()).collect(),
            message: Message {
                account_keys: account_keys
                    .iter()
                    .map(|key| key.to_string())
                    .collect(),
                header: MessageHeader {
                    num_required_signatures: 1,
                    num_readonly_signed_accounts: 0,
                    num_readonly_unsigned_accounts: 1,
                },
                recent_blockhash: "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N"
                    .to_string(),
                instructions: vec![CompiledInstruction {
                    program_id_index: account_keys.len().saturating_sub(1)
                        as u8,
                    accounts: vec![0],
                    data: "3Bxs4Bc3VYuGVB19".to_string(),
                }],
            },
        },
        meta: Some(TransactionMeta {
            err,
            fee: 5000,
            pre_balances: balances.clone(),
            post_balances: balances,
            log_messages: None,
        }),
    }
}

/// A successful transaction signed by `signature`.
pub fn signed(signature: &str, account_keys: &[&str]) -> ResolvedTransaction {
    transaction(&[signature], account_keys, true)
}

pub fn block(
    parent_slot: Slot,
    blockhash: &str,
    transactions: Vec<ResolvedTransaction>,
) -> Block {
    Block {
        blockhash: blockhash.to_string(),
        previous_blockhash: format!("parent-of-{}", blockhash),
        parent_slot,
        transactions,
        signatures: vec![],
        rewards: vec![],
        block_time: Some(1_631_112_417),
        block_height: Some(parent_slot),
    }
}

