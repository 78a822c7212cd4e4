use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::block::types::output::TxResult;
use crate::block::types::subblock::SubBlockContender;
use crate::utilities::crypto::PublicKey;
use crate::utilities::encoding::encode;
use crate::utilities::hash::ChainHasher;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VoteSignature {
    pub signature: String,
    pub signer: PublicKey,
}

/// A sub-block as it is included in a block: the agreed result plus every signature that
/// supported it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubBlock {
    pub input_hash: String,
    pub transactions: Vec<TxResult>,
    pub merkle_leaves: Vec<String>,
    pub subblock: usize,
    pub signatures: Vec<VoteSignature>,
}

/// The part of a [`SubBlock`] that goes into the block hash. Signatures are excluded so
/// that the hash only depends on the agreed result.
#[derive(Serialize)]
struct SubBlockDigest<'a> {
    input_hash: &'a str,
    transactions: &'a [TxResult],
    merkle_leaves: &'a [String],
    subblock: usize,
}

impl SubBlock {
    pub fn new(contender: &SubBlockContender, signatures: Vec<VoteSignature>) -> Self {
        Self {
            input_hash: contender.input_hash.clone(),
            transactions: contender.transactions.clone(),
            merkle_leaves: contender.merkle_tree.leaves.clone(),
            subblock: contender.subblock,
            signatures,
        }
    }

    fn digest(&self) -> SubBlockDigest<'_> {
        SubBlockDigest {
            input_hash: &self.input_hash,
            transactions: &self.transactions,
            merkle_leaves: &self.merkle_leaves,
            subblock: self.subblock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    pub hash: String,
    pub number: u64,
    pub previous: String,
    /// `None` marks an index that failed to reach consensus
    pub subblocks: Vec<Option<SubBlock>>,
}

impl Block {
    pub fn new(number: u64, previous: String, subblocks: Vec<Option<SubBlock>>) -> anyhow::Result<Self> {
        let hash = Self::compute_hash(&previous, &subblocks)?;
        Ok(Self {
            hash,
            number,
            previous,
            subblocks,
        })
    }

    /// `H(previous ‖ enc(sb₀) ‖ enc(sb₁) ‖ …)` over the non-null sub-blocks in order, each
    /// encoded without its signatures.
    pub fn compute_hash(previous: &str, subblocks: &[Option<SubBlock>]) -> anyhow::Result<String> {
        let mut hasher = ChainHasher::new();
        hasher.update(previous);
        for subblock in subblocks.iter().flatten() {
            hasher.update(encode(subblock.digest())?);
        }
        Ok(hasher.finalize_hex())
    }

    pub fn verify_hash(&self) -> bool {
        Self::compute_hash(&self.previous, &self.subblocks)
            .map(|hash| hash == self.hash)
            .unwrap_or(false)
    }

    /// Indexes without an agreed result.
    pub fn missing_subblocks(&self) -> Vec<usize> {
        self.subblocks
            .iter()
            .enumerate()
            .filter_map(|(i, sb)| sb.is_none().then_some(i))
            .collect()
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filled = self.subblocks.iter().filter(|sb| sb.is_some()).count();
        write!(
            f,
            "number: {}, hash: {}, previous: {}, subblocks: {filled}/{}",
            self.number,
            self.hash,
            self.previous,
            self.subblocks.len()
        )
    }
}
