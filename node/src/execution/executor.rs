use std::sync::Arc;

use thiserror::Error;

use crate::block::chain::ChainView;
use crate::block::types::output::TxOutput;
use crate::block::types::subblock::SubBlockContender;
use crate::block::types::transaction::TransactionBatch;
use crate::config::ExecutionConfiguration;
use crate::execution::conflict::{self, ConflictSet, TxLocation};
use crate::execution::environment::Environment;
use crate::execution::worker::{ExecutorFactory, JobResult, PoolError, WorkerPool};
use crate::logging::pretty_json;
use crate::utilities::crypto::Keypair;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Worker pool: {0}")]
    Pool(#[from] PoolError),
    #[error("Collected {collected} of {expected} results for input {input_hash}")]
    MissingResults {
        input_hash: String,
        expected: usize,
        collected: usize,
    },
    #[error("Job for transaction {tx_number} failed: {reason}")]
    JobFailed { tx_number: usize, reason: String },
    #[error("Rerun collected {collected} of {expected} results")]
    RerunIncomplete { expected: usize, collected: usize },
    #[error("Rerun of {location} produced {actual}, expected {expected}")]
    RerunMismatch {
        location: TxLocation,
        expected: String,
        actual: String,
    },
    #[error("General error: {0}")]
    General(#[from] anyhow::Error),
}

pub(crate) type Result<T> = std::result::Result<T, ExecutorError>;

/// Executes all batches of a block in parallel and produces this node's signed sub-block
/// contenders for them.
pub struct ConflictResolutionExecutor {
    pool: WorkerPool,
    config: ExecutionConfiguration,
    keypair: Arc<Keypair>,
    chain: Arc<dyn ChainView>,
    /// Next worker in the round-robin, continues across the batches of a block
    next_worker: usize,
}

impl std::fmt::Debug for ConflictResolutionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictResolutionExecutor")
            .field("config", &self.config)
            .field("next_worker", &self.next_worker)
            .finish_non_exhaustive()
    }
}

impl ConflictResolutionExecutor {
    pub async fn start(
        config: ExecutionConfiguration,
        factory: ExecutorFactory,
        keypair: Arc<Keypair>,
        chain: Arc<dyn ChainView>,
    ) -> Result<Self> {
        let pool = WorkerPool::start(config.clone(), factory).await?;
        Ok(Self {
            pool,
            config,
            keypair,
            chain,
            next_worker: 0,
        })
    }

    pub async fn stop(self) {
        self.pool.stop().await;
    }

    /// Runs every batch, resolves conflicts across the whole block and signs one sub-block
    /// contender per batch, in batch order. Batch `i` is sub-block `i % parallelism`.
    pub async fn execute_work(
        &mut self,
        batches: &[TransactionBatch],
    ) -> Result<Vec<SubBlockContender>> {
        let (height, previous) = self.chain.latest_block();
        let block_num = height + 1;
        log::debug!(
            "Executing {} batches for block {block_num} on top of {previous}",
            batches.len()
        );
        self.pool.reset()?;
        self.next_worker = 0;

        let environments = batches
            .iter()
            .map(|batch| Environment::for_batch(&previous, block_num, batch))
            .collect::<Vec<_>>();

        let mut outputs = Vec::with_capacity(batches.len());
        for (batch, environment) in batches.iter().zip(&environments) {
            outputs.push(self.execute_tx_batch(batch, environment).await?);
        }

        let mut conflicts = self.check_conflicts(&outputs);
        while !conflicts.is_empty() {
            self.rerun_conflicts(batches, &environments, &mut outputs, &conflicts)
                .await?;
            let extended = conflict::extend_conflicts(&outputs, &conflicts);
            if extended.len() == conflicts.len() {
                break;
            }
            log::debug!(
                "Rerun exposed {} more dependent transactions",
                extended.len() - conflicts.len()
            );
            conflicts = extended;
        }

        let parallelism = self.config.parallelism.max(1);
        let mut contenders = Vec::with_capacity(batches.len());
        for (i, (batch, batch_outputs)) in batches.iter().zip(outputs).enumerate() {
            let results = batch_outputs.into_iter().map(TxOutput::finalize).collect();
            let sbc = SubBlockContender::new(
                batch.input_hash.clone(),
                results,
                i % parallelism,
                previous.clone(),
                &self.keypair,
            )?;
            log::trace!("Built sub-block contender {}", pretty_json(&sbc));
            contenders.push(sbc);
        }
        Ok(contenders)
    }

    /// Submits the batch striped over the workers and collects one output per transaction,
    /// ordered by position. An empty batch never reaches the pool.
    pub async fn execute_tx_batch(
        &mut self,
        batch: &TransactionBatch,
        environment: &Environment,
    ) -> Result<Vec<TxOutput>> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        for (tx_number, tx) in batch.transactions.iter().enumerate() {
            let worker = self.next_worker % self.pool.size();
            self.next_worker += 1;
            self.pool
                .submit(worker, tx, self.config.stamp_cost, environment, tx_number)?;
        }

        let results = self.pool.collect(batch.len()).await;
        let collected = results.len();
        let mut slots: Vec<Option<TxOutput>> = vec![None; batch.len()];
        for result in results {
            let output = into_output(result)?;
            if let Some(slot) = slots.get_mut(output.tx_number()) {
                *slot = Some(output);
            }
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ExecutorError::MissingResults {
                input_hash: batch.input_hash.clone(),
                expected: batch.len(),
                collected,
            })
    }

    pub fn check_conflicts(&self, outputs: &[Vec<TxOutput>]) -> ConflictSet {
        let conflicts = conflict::check_conflicts(outputs);
        if !conflicts.is_empty() {
            log::debug!("Found {} conflicting transactions", conflicts.len());
        }
        conflicts
    }

    /// Purges the pending writes of the conflicting transactions from every worker, reruns
    /// them one after another on worker 0 in block order and replaces their outputs.
    ///
    /// Outputs outside `conflicts` are untouched. A rerun can change what a transaction
    /// reads and writes, [`execute_work`](Self::execute_work) checks for that and reruns a
    /// wider set if needed.
    pub async fn rerun_conflicts(
        &mut self,
        batches: &[TransactionBatch],
        environments: &[Environment],
        outputs: &mut [Vec<TxOutput>],
        conflicts: &ConflictSet,
    ) -> Result<()> {
        let keys = conflict::invalidated_keys(outputs, conflicts);
        for (worker, environment) in (0..self.pool.size()).zip(environments.iter().cycle()) {
            self.pool.submit_writeback_barrier(worker, environment, &keys)?;
        }

        for location in conflicts.locations() {
            let tx = &batches[location.batch].transactions[location.position];
            self.pool.submit(
                0,
                tx,
                self.config.stamp_cost,
                &environments[location.batch],
                location.position,
            )?;
        }

        let results = self.pool.collect(conflicts.len()).await;
        if results.len() < conflicts.len() {
            return Err(ExecutorError::RerunIncomplete {
                expected: conflicts.len(),
                collected: results.len(),
            });
        }

        // single worker, so results come back in submission order
        for ((location, expected), result) in conflicts.iter().zip(results) {
            let output = into_output(result)?;
            if output.hash() != expected.as_str() {
                return Err(ExecutorError::RerunMismatch {
                    location: *location,
                    expected: expected.clone(),
                    actual: output.hash().to_string(),
                });
            }
            outputs[location.batch][location.position] = output;
        }
        log::debug!("Reran {} conflicting transactions", conflicts.len());
        Ok(())
    }
}

fn into_output(result: JobResult) -> Result<TxOutput> {
    match result {
        JobResult::Output(output) => Ok(output),
        JobResult::Failed { tx_number, reason } => {
            Err(ExecutorError::JobFailed { tx_number, reason })
        }
    }
}
