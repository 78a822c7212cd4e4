use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::peer::{PeerId, ToPeerId};
use crate::utilities::crypto::{KeyPairError, NodeKeypair, NodePublicKey};

// Careful with DEBUG, DISPLAY!!!
// Internally uses libp2p identity keys
pub struct Ed25519Keypair(libp2p_identity::Keypair);

#[derive(Clone, PartialEq, Eq)]
pub struct Ed25519PublicKey(libp2p_identity::PublicKey);

impl Ed25519PublicKey {
    pub(crate) fn inner(&self) -> &libp2p_identity::PublicKey {
        &self.0
    }
}

impl NodeKeypair for Ed25519Keypair {
    type PublicKey = Ed25519PublicKey;

    fn generate() -> Self {
        Ed25519Keypair(libp2p_identity::Keypair::generate_ed25519())
    }

    fn sign<M: AsRef<[u8]>>(&self, msg: &M) -> Result<Vec<u8>, KeyPairError> {
        self.0
            .sign(msg.as_ref())
            .map_err(|_| KeyPairError::Signature)
    }

    fn to_raw_vec(&self) -> Result<Vec<u8>, KeyPairError> {
        self.0
            .to_protobuf_encoding()
            .map_err(|e| KeyPairError::Deserialization(e.to_string()))
    }

    fn from_raw_vec(raw: Vec<u8>) -> Result<Self, KeyPairError> {
        let keypair = libp2p_identity::Keypair::from_protobuf_encoding(&raw)
            .map_err(|e| KeyPairError::Deserialization(e.to_string()))?;
        Ok(Ed25519Keypair(keypair))
    }

    fn public_key(&self) -> Self::PublicKey {
        Ed25519PublicKey(self.0.public())
    }
}

impl NodePublicKey for Ed25519PublicKey {
    fn to_raw_vec(&self) -> Vec<u8> {
        self.0.encode_protobuf()
    }

    fn from_raw_vec(raw: Vec<u8>) -> Result<Self, KeyPairError> {
        let public_key = libp2p_identity::PublicKey::try_decode_protobuf(&raw)
            .map_err(|e| KeyPairError::Deserialization(e.to_string()))?;
        Ok(Ed25519PublicKey(public_key))
    }

    fn verify<M: AsRef<[u8]>>(&self, msg: &M, signature: &[u8]) -> bool {
        self.0.verify(msg.as_ref(), signature)
    }
}

impl ToPeerId for Ed25519Keypair {
    fn peer_id(&self) -> PeerId {
        self.public_key().peer_id()
    }
}

impl ToPeerId for Ed25519PublicKey {
    fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(self)
    }
}

impl Hash for Ed25519PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_raw_vec().hash(state);
    }
}

impl PartialOrd for Ed25519PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ed25519PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_raw_vec().cmp(&other.to_raw_vec())
    }
}

impl Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", self.to_base58())
    }
}

impl FromStr for Ed25519PublicKey {
    type Err = KeyPairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl Serialize for Ed25519PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Ed25519PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base58(&encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = Ed25519Keypair::generate();
        let signature = keypair.sign_hex(&"message").unwrap();

        let public_key = keypair.public_key();
        assert!(public_key.verify_hex(&"message", &signature));
        assert!(!public_key.verify_hex(&"other message", &signature));
        assert!(!public_key.verify_hex(&"message", "not hex"));
    }

    #[test]
    fn test_keypair_base58_round_trip() {
        let keypair = Ed25519Keypair::generate();
        let encoded = keypair.to_base58().unwrap();
        let decoded = Ed25519Keypair::from_base58(&encoded).unwrap();
        assert_eq!(keypair.public_key(), decoded.public_key());
    }

    #[test]
    fn test_public_key_serde_as_string() {
        let public_key = Ed25519Keypair::generate().public_key();
        let json = serde_json::to_string(&public_key).unwrap();
        assert_eq!(json, format!("\"{}\"", public_key.to_base58()));

        let parsed: Ed25519PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, public_key);
        assert_eq!(public_key.to_string().parse::<Ed25519PublicKey>().unwrap(), public_key);
    }

    #[test]
    fn test_other_key_does_not_verify() {
        let keypair = Ed25519Keypair::generate();
        let other = Ed25519Keypair::generate().public_key();
        let signature = keypair.sign(&"message").unwrap();
        assert!(!other.verify(&"message", &signature));
    }
}
