//! Fixed size pool of execution workers.
//!
//! Every worker is a blocking task owning one [`ContractExecutor`]. The orchestrator talks to
//! a worker through exactly two channels: an unbounded inbox of jobs, so submitting never
//! waits, and a bounded outbox of replies, which a worker blocks on when the orchestrator
//! falls behind. A worker runs one job at a time, in the order submitted.
use std::collections::BTreeSet;
use std::sync::Arc;
use std::task::Poll;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::block::types::output::{TxOutput, TxResult, StateWrite};
use crate::block::types::transaction::Transaction;
use crate::config::ExecutionConfiguration;
use crate::execution::environment::Environment;
use crate::execution::{ContractCall, ContractExecutor};

pub type ExecutorFactory =
    Arc<dyn Fn(usize) -> anyhow::Result<Box<dyn ContractExecutor>> + Send + Sync>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker pool needs at least one worker")]
    EmptyPool,
    #[error("Workers failed to start after {attempts} attempts")]
    Start { attempts: usize },
    #[error("Worker {0} does not exist")]
    UnknownWorker(usize),
    #[error("Worker {0} is gone")]
    WorkerGone(usize),
}

pub(crate) type Result<T> = std::result::Result<T, PoolError>;

#[derive(Debug)]
pub(crate) enum WorkerJob {
    Execute {
        tx: Box<Transaction>,
        stamp_cost: u64,
        environment: Environment,
        tx_number: usize,
    },
    /// Purges cached pending writes before a rerun
    Invalidate {
        environment: Environment,
        keys: BTreeSet<String>,
    },
    /// Drops everything pending, before the next block
    Reset,
    Stop,
}

#[derive(Debug)]
pub(crate) enum WorkerReply {
    Ready,
    Output(Box<TxOutput>),
    Failed { tx_number: usize, reason: String },
    Invalidated,
    Reset,
}

/// What [`WorkerPool::collect`] hands back for one execute job.
#[derive(Debug)]
pub enum JobResult {
    Output(TxOutput),
    Failed { tx_number: usize, reason: String },
}

struct WorkerHandle {
    inbox: mpsc::UnboundedSender<WorkerJob>,
    outbox: mpsc::Receiver<WorkerReply>,
    join: JoinHandle<()>,
}

pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    config: ExecutionConfiguration,
}

impl WorkerPool {
    /// Starts `config.workers` workers, retrying the whole start up to
    /// `config.start_attempts` times when not every worker reports alive within
    /// `config.start_timeout_ms`.
    pub async fn start(config: ExecutionConfiguration, factory: ExecutorFactory) -> Result<Self> {
        if config.workers == 0 {
            return Err(PoolError::EmptyPool);
        }
        for attempt in 1..=config.start_attempts {
            let mut pool = Self::spawn(&config, factory.clone());
            if pool.await_ready().await {
                log::info!("Started {} workers", pool.size());
                return Ok(pool);
            }
            log::warn!(
                "Not all workers reported alive, attempt {attempt}/{}",
                config.start_attempts
            );
            pool.stop().await;
        }
        Err(PoolError::Start {
            attempts: config.start_attempts,
        })
    }

    fn spawn(config: &ExecutionConfiguration, factory: ExecutorFactory) -> Self {
        let workers = (0..config.workers)
            .map(|index| {
                let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
                let (outbox_tx, outbox_rx) = mpsc::channel(config.result_channel_capacity);
                let factory = factory.clone();
                let join = tokio::task::spawn_blocking(move || {
                    match factory(index) {
                        Ok(executor) => run_worker(index, executor, inbox_rx, outbox_tx),
                        Err(err) => log::error!("Worker {index} failed to create executor: {err:?}"),
                    }
                });
                WorkerHandle {
                    inbox: inbox_tx,
                    outbox: outbox_rx,
                    join,
                }
            })
            .collect();
        Self {
            workers,
            config: config.clone(),
        }
    }

    async fn await_ready(&mut self) -> bool {
        let deadline = Instant::now() + self.config.start_timeout();
        let mut ready = vec![false; self.workers.len()];
        while ready.iter().any(|r| !r) {
            match tokio::time::timeout_at(deadline, self.next_reply()).await {
                Ok(Some((index, WorkerReply::Ready))) => ready[index] = true,
                Ok(Some((index, reply))) => {
                    log::warn!("Unexpected reply from worker {index} during start: {reply:?}")
                }
                Ok(None) | Err(_) => return false,
            }
        }
        true
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Hands one transaction to worker `worker_index`. Never waits.
    pub fn submit(
        &self,
        worker_index: usize,
        tx: &Transaction,
        stamp_cost: u64,
        environment: &Environment,
        tx_number: usize,
    ) -> Result<()> {
        self.send(
            worker_index,
            WorkerJob::Execute {
                tx: Box::new(tx.clone()),
                stamp_cost,
                environment: environment.clone(),
                tx_number,
            },
        )
    }

    /// Makes worker `worker_index` drop `keys` from its pending overlay before it runs
    /// anything submitted after this.
    pub fn submit_writeback_barrier(
        &self,
        worker_index: usize,
        environment: &Environment,
        keys: &BTreeSet<String>,
    ) -> Result<()> {
        self.send(
            worker_index,
            WorkerJob::Invalidate {
                environment: environment.clone(),
                keys: keys.clone(),
            },
        )
    }

    /// Makes every worker drop its pending overlay before it runs anything submitted after
    /// this.
    pub fn reset(&self) -> Result<()> {
        (0..self.size()).try_for_each(|worker_index| self.send(worker_index, WorkerJob::Reset))
    }

    fn send(&self, worker_index: usize, job: WorkerJob) -> Result<()> {
        let worker = self
            .workers
            .get(worker_index)
            .ok_or(PoolError::UnknownWorker(worker_index))?;
        worker
            .inbox
            .send(job)
            .map_err(|_| PoolError::WorkerGone(worker_index))
    }

    /// Waits until `expected` execute jobs reported back, or until
    /// `collect_poll_attempts` consecutive polls of `collect_poll_interval_ms` came back
    /// empty. Returns whatever arrived, in arrival order; the caller decides what a short
    /// count means.
    pub async fn collect(&mut self, expected: usize) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(expected);
        let mut empty_polls = 0;
        let interval = self.config.collect_poll_interval();

        while results.len() < expected && empty_polls < self.config.collect_poll_attempts {
            match tokio::time::timeout(interval, self.next_reply()).await {
                Ok(Some((_, WorkerReply::Output(output)))) => {
                    empty_polls = 0;
                    results.push(JobResult::Output(*output));
                }
                Ok(Some((_, WorkerReply::Failed { tx_number, reason }))) => {
                    empty_polls = 0;
                    results.push(JobResult::Failed { tx_number, reason });
                }
                Ok(Some((index, WorkerReply::Invalidated))) => {
                    log::trace!("Worker {index} purged invalidated keys");
                }
                Ok(Some((index, WorkerReply::Ready))) => {
                    log::trace!("Late ready from worker {index}");
                }
                Ok(Some((index, WorkerReply::Reset))) => {
                    log::trace!("Worker {index} dropped its pending writes");
                }
                Ok(None) => {
                    log::error!("All workers are gone");
                    break;
                }
                Err(_) => empty_polls += 1,
            }
        }
        if results.len() < expected {
            log::error!(
                "Collected {} of {expected} results after {empty_polls} empty polls",
                results.len()
            );
        }
        results
    }

    /// Next reply from any worker, `None` once every worker's outbox is closed.
    async fn next_reply(&mut self) -> Option<(usize, WorkerReply)> {
        futures::future::poll_fn(|cx| {
            let mut closed = 0;
            for (index, worker) in self.workers.iter_mut().enumerate() {
                match worker.outbox.poll_recv(cx) {
                    Poll::Ready(Some(reply)) => return Poll::Ready(Some((index, reply))),
                    Poll::Ready(None) => closed += 1,
                    Poll::Pending => {}
                }
            }
            if closed == self.workers.len() {
                Poll::Ready(None)
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// Asks every worker to exit after its current job and waits for them, at most
    /// `stop_timeout_ms` per worker. Jobs are never interrupted.
    pub async fn stop(self) {
        for worker in &self.workers {
            let _ = worker.inbox.send(WorkerJob::Stop);
        }
        let timeout = self.config.stop_timeout();
        for (index, worker) in self.workers.into_iter().enumerate() {
            drop(worker.outbox);
            match tokio::time::timeout(timeout, worker.join).await {
                Ok(Ok(())) => log::trace!("Worker {index} stopped"),
                Ok(Err(err)) => log::error!("Worker {index} terminated abnormally: {err}"),
                Err(_) => log::warn!("Worker {index} did not stop within {timeout:?}"),
            }
        }
    }
}

fn run_worker(
    index: usize,
    mut executor: Box<dyn ContractExecutor>,
    mut inbox: mpsc::UnboundedReceiver<WorkerJob>,
    outbox: mpsc::Sender<WorkerReply>,
) {
    if outbox.blocking_send(WorkerReply::Ready).is_err() {
        return;
    }
    log::trace!("Worker {index} ready");

    while let Some(job) = inbox.blocking_recv() {
        let reply = match job {
            WorkerJob::Execute {
                tx,
                stamp_cost,
                environment,
                tx_number,
            } => match execute_tx(executor.as_mut(), *tx, stamp_cost, &environment, tx_number) {
                Ok(output) => WorkerReply::Output(Box::new(output)),
                Err(err) => WorkerReply::Failed {
                    tx_number,
                    reason: err.to_string(),
                },
            },
            WorkerJob::Invalidate { environment, keys } => {
                log::trace!(
                    "Worker {index} purging {} keys for input {}",
                    keys.len(),
                    environment.input_hash
                );
                executor.purge(&keys);
                WorkerReply::Invalidated
            }
            WorkerJob::Reset => {
                executor.reset();
                WorkerReply::Reset
            }
            WorkerJob::Stop => break,
        };
        if outbox.blocking_send(reply).is_err() {
            break;
        }
    }
    log::trace!("Worker {index} exiting");
}

/// Runs one transaction and packages the outcome. A failing contract is a normal output
/// with a non-zero status, only hashing the transaction can make this an error.
pub(crate) fn execute_tx(
    executor: &mut dyn ContractExecutor,
    tx: Transaction,
    stamp_cost: u64,
    environment: &Environment,
    tx_number: usize,
) -> anyhow::Result<TxOutput> {
    let hash = tx.hash()?;
    let payload = &tx.payload;
    let result = executor.execute(ContractCall {
        sender: &payload.sender,
        contract: &payload.contract,
        function: &payload.function,
        kwargs: &payload.kwargs,
        stamps: payload.stamps_supplied,
        stamp_cost,
        environment,
        auto_commit: false,
    });
    executor.clear_scratch();

    let pending_writes = result.writes.keys().cloned().collect();
    let state = result
        .writes
        .into_iter()
        .map(|(key, value)| StateWrite { key, value })
        .collect();

    Ok(TxOutput {
        result: TxResult {
            hash,
            transaction: tx,
            status: result.status_code,
            state,
            stamps_used: result.stamps_used,
            result: result.result,
            tx_number,
        },
        reads: result.reads,
        pending_writes,
    })
}
