//! Signing and verification primitives.
//!
//! Keys are ed25519 only. Public keys travel as base58 strings of their protobuf encoding,
//! signatures as hex strings.
use thiserror::Error;

pub(crate) mod ed25519;

pub use ed25519::{Ed25519Keypair, Ed25519PublicKey};

pub type Keypair = Ed25519Keypair;
pub type PublicKey = Ed25519PublicKey;

#[derive(Error, Debug)]
pub enum KeyPairError {
    #[error("Invalid encoding")]
    InvalidEncoding,
    #[error("Invalid key")]
    Signature,
    #[error("Unable to deserialize key: '{}'", .0)]
    Deserialization(String),
}

pub trait NodePublicKey: Sized {
    fn to_raw_vec(&self) -> Vec<u8>;

    fn from_raw_vec(raw: Vec<u8>) -> Result<Self, KeyPairError>;

    fn verify<M: AsRef<[u8]>>(&self, msg: &M, signature: &[u8]) -> bool;

    /// Verifies a hex encoded signature. Malformed hex is just an invalid signature.
    fn verify_hex<M: AsRef<[u8]>>(&self, msg: &M, signature: &str) -> bool {
        match array_bytes::hex2bytes(signature) {
            Ok(raw) => self.verify(msg, &raw),
            Err(_) => false,
        }
    }

    fn to_base58(&self) -> String {
        bs58::encode(self.to_raw_vec()).into_string()
    }

    fn from_base58(base58: &str) -> Result<Self, KeyPairError> {
        let raw = bs58::decode(base58)
            .into_vec()
            .map_err(|_| KeyPairError::InvalidEncoding)?;
        Self::from_raw_vec(raw)
    }
}

pub trait NodeKeypair: Sized {
    type PublicKey: NodePublicKey;

    fn generate() -> Self;

    fn sign<M: AsRef<[u8]>>(&self, msg: &M) -> Result<Vec<u8>, KeyPairError>;

    fn sign_hex<M: AsRef<[u8]>>(&self, msg: &M) -> Result<String, KeyPairError> {
        self.sign(msg).map(|raw| array_bytes::bytes2hex("", raw))
    }

    fn to_raw_vec(&self) -> Result<Vec<u8>, KeyPairError>;

    fn from_raw_vec(raw: Vec<u8>) -> Result<Self, KeyPairError>;

    fn public_key(&self) -> Self::PublicKey;

    fn to_base58(&self) -> Result<String, KeyPairError> {
        Ok(bs58::encode(self.to_raw_vec()?).into_string())
    }

    fn from_base58(base58: &str) -> Result<Self, KeyPairError> {
        let raw = bs58::decode(base58)
            .into_vec()
            .map_err(|_| KeyPairError::InvalidEncoding)?;
        Self::from_raw_vec(raw)
    }
}
