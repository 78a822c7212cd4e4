//! # Blocks and sub-blocks
//!
//! A block is produced in rounds. Every round the node receives a number of transaction
//! batches, executes them and turns each batch into a sub-block proposal
//! ([`SubBlockContender`](types::subblock::SubBlockContender)). Every peer does the same with
//! the same batches, so for each sub-block index there is one proposal per peer.
//!
//! Proposals are compared by their result hash (the Merkle root over the finalized
//! transaction results). When enough peers agree on the result of every index the round
//! produces a block:
//!
//! ```text
//! previous ──► H(previous ‖ sub-block 0 ‖ sub-block 1 ‖ …) ──► next
//! ```
//!
//! A sub-block index that never reached agreement stays `null` in the block. Whether such a
//! block is broadcast, retried or escalated is decided above this crate.
//!
//! Nothing here writes to durable state. The committed chain head is only read, through
//! [`ChainView`](chain::ChainView).

pub mod chain;
pub mod types;
