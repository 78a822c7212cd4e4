use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utilities::crypto::{Keypair, NodeKeypair, NodePublicKey, PublicKey};
use crate::utilities::encoding::encode;
use crate::utilities::hash::blake2_256_hex;

/// The signed part of a transaction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionPayload {
    pub sender: String,
    pub processor: String,
    pub contract: String,
    pub function: String,
    pub kwargs: BTreeMap<String, Value>,
    pub nonce: u64,
    pub stamps_supplied: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionMetadata {
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Transaction {
    pub payload: TransactionPayload,
    pub metadata: TransactionMetadata,
}

impl Transaction {
    /// Signs the canonical encoding of `payload`. The sender field is expected to carry the
    /// base58 public key of `keypair`, but that is for the upstream admission checks to enforce.
    pub fn new_signed(payload: TransactionPayload, keypair: &Keypair) -> anyhow::Result<Self> {
        let signature = keypair.sign_hex(&encode(&payload)?)?;
        Ok(Self {
            payload,
            metadata: TransactionMetadata { signature },
        })
    }

    /// Content hash over the canonical encoding of the payload.
    pub fn hash(&self) -> anyhow::Result<String> {
        Ok(blake2_256_hex(&encode(&self.payload)?))
    }

    pub fn verify_signature(&self) -> bool {
        let Ok(sender) = PublicKey::from_base58(&self.payload.sender) else {
            return false;
        };
        match encode(&self.payload) {
            Ok(bytes) => sender.verify_hex(&bytes, &self.metadata.signature),
            Err(_) => false,
        }
    }
}

impl Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let payload = &self.payload;
        write!(
            f,
            "{}.{} from {} nonce {}",
            payload.contract, payload.function, payload.sender, payload.nonce
        )
    }
}

/// Ordered transactions of one sub-block together with the commitment the batch origin
/// computed over them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionBatch {
    pub transactions: Vec<Transaction>,
    /// Unix seconds
    pub timestamp: u64,
    pub input_hash: String,
}

impl TransactionBatch {
    /// Builds a batch and derives its input hash the way a batch origin does: hash of the
    /// canonical encoding of the transactions and the timestamp.
    pub fn new(transactions: Vec<Transaction>, timestamp: u64) -> anyhow::Result<Self> {
        #[derive(Serialize)]
        struct Commitment<'a> {
            transactions: &'a [Transaction],
            timestamp: u64,
        }
        let input_hash = blake2_256_hex(&encode(Commitment {
            transactions: &transactions,
            timestamp,
        })?);
        Ok(Self {
            transactions,
            timestamp,
            input_hash,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }
}
