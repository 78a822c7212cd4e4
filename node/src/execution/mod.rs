//! # Parallel, conflict resolving execution
//!
//! Every transaction of every batch in a block is executed concurrently on a fixed pool of
//! workers. Each worker owns one [`ContractExecutor`] which keeps the writes of the jobs it
//! already ran in a pending overlay, so a worker sees its own earlier writes but never the
//! writes of another worker.
//!
//! After all batches ran, the read and write sets of every transaction in the block are
//! compared. Any pair where one side wrote what the other read or wrote is a conflict: the
//! outcome of either could depend on scheduling. The conflicting transactions are purged
//! from every worker's overlay and re-executed one by one on a single worker, in batch and
//! position order. Everything else keeps its parallel result.
//!
//! The end result is the same as running every batch, and every transaction in it, strictly
//! in order.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::execution::environment::Environment;

pub mod conflict;
pub mod environment;
pub mod executor;
pub mod native;
pub mod state;
pub mod worker;

/// Everything a contract call gets to see.
#[derive(Debug, Clone, Copy)]
pub struct ContractCall<'a> {
    pub sender: &'a str,
    pub contract: &'a str,
    pub function: &'a str,
    pub kwargs: &'a BTreeMap<String, Value>,
    pub stamps: u64,
    pub stamp_cost: u64,
    pub environment: &'a Environment,
    /// Executors used by the pool are always called with `false`
    pub auto_commit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub status_code: u32,
    pub result: String,
    pub stamps_used: u64,
    pub writes: BTreeMap<String, Value>,
    pub reads: BTreeSet<String>,
}

/// Deterministic contract runtime. Given the same call and the same pending state it must
/// produce the same result.
///
/// Implementations keep writes of successful calls in a pending overlay that later calls on
/// the same instance observe. Nothing reaches committed state unless `auto_commit` is set.
pub trait ContractExecutor: Send {
    fn execute(&mut self, call: ContractCall<'_>) -> ExecutionResult;

    /// Drops the listed keys from the pending overlay.
    fn purge(&mut self, keys: &BTreeSet<String>);

    /// Clears per call bookkeeping. Called after every job.
    fn clear_scratch(&mut self);

    /// Drops the whole pending overlay. Called before every block.
    fn reset(&mut self);
}
