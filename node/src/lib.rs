//! Transaction processing core of a block producing node.
//!
//! [`execution`] turns transaction batches into signed sub-block contenders, running every
//! transaction in parallel while producing the same result as running them in order.
//! [`aggregator`] collects the contenders of all peers and decides the next block by
//! vote. [`round::BlockRound`] wires the two together for one block.

pub mod aggregator;
pub mod block;
pub mod config;
pub mod contender;
pub mod execution;
pub mod logging;
pub mod peer;
pub mod round;
pub mod utilities;

pub use aggregator::{AggregatedBlock, Aggregator, AggregatorHandle, AggregatorMessage, BlockStatus};
pub use block::chain::{ChainHead, ChainView};
pub use config::Configuration;
pub use execution::executor::ConflictResolutionExecutor;
pub use execution::worker::{ExecutorFactory, WorkerPool};
pub use execution::ContractExecutor;
pub use round::{BlockRound, RoundOutcome};
