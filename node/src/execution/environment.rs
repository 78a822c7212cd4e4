use serde::{Deserialize, Serialize};

use crate::block::types::transaction::TransactionBatch;
use crate::utilities::hash::blake2_256_hex;
use crate::utilities::time::NodeTime;

/// Deterministic execution environment of one batch. Identical on every node executing
/// the same batch on top of the same block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Environment {
    /// Hash of the block this one builds on
    pub block_hash: String,
    /// Number of the block being built
    pub block_num: u64,
    pub input_hash: String,
    /// Entropy derived from the batch commitment, usable as a random seed by contracts
    pub entropy_seed: String,
    /// Batch timestamp, RFC3339
    pub now: String,
}

impl Environment {
    pub fn for_batch(block_hash: &str, block_num: u64, batch: &TransactionBatch) -> Self {
        let mut seed = batch.input_hash.as_bytes().to_vec();
        seed.extend_from_slice(block_hash.as_bytes());

        Self {
            block_hash: block_hash.to_string(),
            block_num,
            input_hash: batch.input_hash.clone(),
            entropy_seed: blake2_256_hex(&seed),
            now: NodeTime::rfc3339_from_secs(batch.timestamp),
        }
    }
}
