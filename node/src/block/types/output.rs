use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::types::transaction::Transaction;
use crate::utilities::encoding::encode;
use crate::utilities::merkle::Merkle;

pub const STATUS_SUCCESS: u32 = 0;
pub const STATUS_FAILURE: u32 = 1;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StateWrite {
    pub key: String,
    pub value: Value,
}

/// Outcome of executing one transaction, as it is Merklized, signed and voted on.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TxResult {
    pub hash: String,
    pub transaction: Transaction,
    pub status: u32,
    /// Writes ordered by key
    pub state: Vec<StateWrite>,
    pub stamps_used: u64,
    pub result: String,
    /// Position within the batch
    pub tx_number: usize,
}

impl TxResult {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// A [`TxResult`] still carrying the read and write sets conflict detection needs.
/// Lives only inside the executor for the duration of one round.
#[derive(Debug, Clone, PartialEq)]
pub struct TxOutput {
    pub result: TxResult,
    pub reads: BTreeSet<String>,
    pub pending_writes: BTreeSet<String>,
}

impl TxOutput {
    pub fn hash(&self) -> &str {
        &self.result.hash
    }

    pub fn tx_number(&self) -> usize {
        self.result.tx_number
    }

    pub fn finalize(self) -> TxResult {
        self.result
    }
}

/// Full Merkle tree over the canonical encodings of `results`, in order.
pub fn merklize_results(results: &[TxResult]) -> anyhow::Result<Vec<String>> {
    let encoded = results
        .iter()
        .map(encode)
        .collect::<anyhow::Result<Vec<_>>>()?;
    Merkle::merklize(&encoded)
}
