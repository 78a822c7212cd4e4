use thiserror::Error;

use crate::block::types::subblock::SubBlockContender;
use crate::utilities::encoding::encode;
use crate::utilities::merkle::Merkle;

/// Why a peer's sub-block contender was not counted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Claims sub-block {actual} but was sent at position {expected}")]
    IndexMismatch { expected: usize, actual: usize },
    #[error("Built on {actual}, the current head is {expected}")]
    StalePrevious { expected: String, actual: String },
    #[error("Merkle tree has no root")]
    EmptyTree,
    #[error("Signature does not verify against the signed root")]
    InvalidSignature,
    #[error("Merkle tree does not match the transactions")]
    MerkleMismatch,
    #[error("Failed to encode transactions: {0}")]
    Encoding(String),
}

pub(crate) type Result<T> = std::result::Result<T, ValidationError>;

/// Checks a contender received at `position` of a peer's message before it may vote.
/// `previous` is the hash of the block the current round builds on.
pub fn validate_sbc(position: usize, previous: &str, sbc: &SubBlockContender) -> Result<()> {
    if sbc.subblock != position {
        return Err(ValidationError::IndexMismatch {
            expected: position,
            actual: sbc.subblock,
        });
    }
    if sbc.previous != previous {
        return Err(ValidationError::StalePrevious {
            expected: previous.to_string(),
            actual: sbc.previous.clone(),
        });
    }
    if sbc.result_hash().is_none() {
        return Err(ValidationError::EmptyTree);
    }
    if !sbc.verify_signature() {
        return Err(ValidationError::InvalidSignature);
    }

    let items = if sbc.is_empty() {
        vec![sbc.input_hash.as_bytes().to_vec()]
    } else {
        sbc.transactions
            .iter()
            .map(encode)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|err| ValidationError::Encoding(err.to_string()))?
    };
    if !Merkle::verify_leaves(&items, &sbc.merkle_tree.leaves) {
        return Err(ValidationError::MerkleMismatch);
    }
    Ok(())
}
