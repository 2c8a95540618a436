use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use shared::block::{Block, Slot};
use shared::rpc::TransportError;
use shared::solana::{check_slot_range, rpc_methods, ChainClient, ClientError};

#[derive(Debug, Default)]
struct State {
    head: Slot,
    failures: BTreeSet<Slot>,
    head_failure: bool,
    listed_ranges: Vec<(Slot, Slot)>,
    fetched_blocks: Vec<Slot>,
}

/// [ChainClient] serving a fixed set of blocks, with failures that can be
/// injected per slot.
#[derive(Debug, Default)]
pub struct ScriptedChain {
    blocks: BTreeMap<Slot, Option<Block>>,
    state: Mutex<State>,
}

impl ScriptedChain {
    pub fn new(head: Slot) -> Self {
        Self {
            blocks: BTreeMap::new(),
            state: Mutex::new(State {
                head,
                ..State::default()
            }),
        }
    }

    pub fn with_block(mut self, slot: Slot, block: Block) -> Self {
        self.blocks.insert(slot, Some(block));
        self
    }

    /// Listed by `get_blocks`, but `get_block` answers not confirmed.
    pub fn with_unconfirmed(mut self, slot: Slot) -> Self {
        self.blocks.insert(slot, None);
        self
    }

    pub fn set_head(&self, head: Slot) {
        self.state.lock().unwrap().head = head;
    }

    /// The next `get_block(slot)` fails with a transport error.
    pub fn fail_once(&self, slot: Slot) {
        self.state.lock().unwrap().failures.insert(slot);
    }

    /// The next `get_slot` fails with a transport error.
    pub fn fail_head_once(&self) {
        self.state.lock().unwrap().head_failure = true;
    }

    pub fn listed_ranges(&self) -> Vec<(Slot, Slot)> {
        self.state.lock().unwrap().listed_ranges.clone()
    }

    pub fn fetched_blocks(&self) -> Vec<Slot> {
        self.state.lock().unwrap().fetched_blocks.clone()
    }
}

fn unavailable(method: &'static str) -> ClientError {
    ClientError::Transport {
        method,
        source: TransportError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "injected failure".to_string(),
        },
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn get_slot(&self) -> Result<Slot, ClientError> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.head_failure) {
            return Err(unavailable(rpc_methods::GET_SLOT));
        }
        Ok(state.head)
    }

    async fn get_blocks(
        &self,
        start: Slot,
        end: Slot,
    ) -> Result<Vec<Slot>, ClientError> {
        check_slot_range(start, end)?;

        self.state.lock().unwrap().listed_ranges.push((start, end));
        Ok(self.blocks.range(start..=end).map(|(slot, _)| *slot).collect())
    }

    async fn get_block(&self, slot: Slot) -> Result<Block, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.fetched_blocks.push(slot);

        if state.failures.remove(&slot) {
            return Err(unavailable(rpc_methods::GET_BLOCK));
        }

        match self.blocks.get(&slot) {
            Some(Some(block)) => Ok(block.clone()),
            _ => Err(ClientError::NotConfirmed { slot }),
        }
    }
}
