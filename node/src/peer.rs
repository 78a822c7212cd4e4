use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::utilities::crypto::PublicKey;

pub(crate) type PeerIdType = libp2p_identity::PeerId;

/// Transport level identity of a peer. Only used for logging and bookkeeping of who sent
/// what; votes are always attributed to the signer key inside a proposal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub(crate) PeerIdType);

impl PeerId {
    pub fn random() -> Self {
        Self(PeerIdType::random())
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(Self(PeerIdType::from_bytes(bytes)?))
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(PeerIdType::from_public_key(public_key.inner()))
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait ToPeerId {
    fn peer_id(&self) -> PeerId;
}

#[cfg(test)]
mod test {
    use crate::utilities::crypto::{Keypair, NodeKeypair};

    use super::*;

    #[test]
    fn test_peer_id_from_public_key_is_stable() {
        let keypair = Keypair::generate();
        assert_eq!(keypair.peer_id(), keypair.public_key().peer_id());

        let restored = PeerId::from_bytes(&keypair.peer_id().as_bytes()).unwrap();
        assert_eq!(restored, keypair.peer_id());
    }
}
