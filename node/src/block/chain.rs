use parking_lot::RwLock;

use crate::block::types::block::Block;

pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Read access to the committed chain head. Implemented by the storage layer, which is also
/// the only place that advances it.
pub trait ChainView: Send + Sync {
    /// Number and hash of the head, read together.
    fn latest_block(&self) -> (u64, String);

    fn latest_block_number(&self) -> u64 {
        self.latest_block().0
    }

    fn latest_block_hash(&self) -> String {
        self.latest_block().1
    }
}

/// In-memory chain head.
pub struct ChainHead {
    head: RwLock<(u64, String)>,
}

impl ChainHead {
    pub fn new(number: u64, hash: String) -> Self {
        Self {
            head: RwLock::new((number, hash)),
        }
    }

    pub fn genesis() -> Self {
        Self::new(0, GENESIS_HASH.to_string())
    }

    /// Moves the head to `block` if it directly extends it.
    pub fn advance(&self, block: &Block) -> anyhow::Result<()> {
        let mut head = self.head.write();
        if block.number != head.0 + 1 || block.previous != head.1 {
            anyhow::bail!(
                "Block {} does not extend head {} ({})",
                block.number,
                head.0,
                head.1
            );
        }
        *head = (block.number, block.hash.clone());
        Ok(())
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::genesis()
    }
}

impl ChainView for ChainHead {
    fn latest_block(&self) -> (u64, String) {
        self.head.read().clone()
    }
}
