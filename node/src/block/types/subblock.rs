use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::block::types::output::{merklize_results, TxResult};
use crate::utilities::crypto::{Keypair, NodeKeypair, NodePublicKey, PublicKey};
use crate::utilities::merkle::Merkle;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MerkleTree {
    /// Whole tree, root first
    pub leaves: Vec<String>,
    pub signature: String,
}

/// One node's signed proposal for the result of a single sub-block.
///
/// For a batch with transactions the signer signs the Merkle root of the finalized
/// transaction results. For an empty batch the tree is the single leaf `hash(input_hash)`
/// and the signature is over `input_hash` itself.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubBlockContender {
    pub input_hash: String,
    pub transactions: Vec<TxResult>,
    pub merkle_tree: MerkleTree,
    pub signer: PublicKey,
    pub subblock: usize,
    pub previous: String,
}

impl SubBlockContender {
    pub fn new(
        input_hash: String,
        transactions: Vec<TxResult>,
        subblock: usize,
        previous: String,
        keypair: &Keypair,
    ) -> anyhow::Result<Self> {
        let (leaves, message) = if transactions.is_empty() {
            let leaves = Merkle::merklize(&[input_hash.as_bytes()])?;
            (leaves, input_hash.clone())
        } else {
            let leaves = merklize_results(&transactions)?;
            let root = leaves[0].clone();
            (leaves, root)
        };
        let signature = keypair.sign_hex(&message)?;

        Ok(Self {
            input_hash,
            transactions,
            merkle_tree: MerkleTree { leaves, signature },
            signer: keypair.public_key(),
            subblock,
            previous,
        })
    }

    /// The value votes are keyed by, the Merkle root.
    pub fn result_hash(&self) -> Option<&str> {
        Merkle::root(&self.merkle_tree.leaves).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// What the signature has to be over.
    pub fn signed_message(&self) -> Option<&str> {
        if self.is_empty() {
            Some(&self.input_hash)
        } else {
            self.result_hash()
        }
    }

    pub fn verify_signature(&self) -> bool {
        match self.signed_message() {
            Some(message) => self
                .signer
                .verify_hex(&message, &self.merkle_tree.signature),
            None => false,
        }
    }
}

impl Display for SubBlockContender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "subblock: {}, input: {}, result: {}, signer: {}, nr of transactions: {}",
            self.subblock,
            self.input_hash,
            self.result_hash().unwrap_or("-"),
            self.signer,
            self.transactions.len()
        )
    }
}

#[cfg(test)]
mod test {
    use crate::utilities::hash::blake2_256_hex;

    use super::*;

    #[test]
    fn test_empty_contender_signs_input_hash() {
        let keypair = Keypair::generate();
        let sbc =
            SubBlockContender::new("abcd".to_string(), vec![], 0, "00".to_string(), &keypair)
                .unwrap();

        assert_eq!(sbc.merkle_tree.leaves, vec![blake2_256_hex(b"abcd")]);
        assert_eq!(sbc.signed_message(), Some("abcd"));
        assert!(sbc.verify_signature());
        assert!(keypair
            .public_key()
            .verify_hex(&"abcd", &sbc.merkle_tree.signature));
    }

    #[test]
    fn test_tampered_signature_fails() {
        let keypair = Keypair::generate();
        let mut sbc =
            SubBlockContender::new("abcd".to_string(), vec![], 0, "00".to_string(), &keypair)
                .unwrap();
        sbc.input_hash = "abce".to_string();
        assert!(!sbc.verify_signature());
    }
}
