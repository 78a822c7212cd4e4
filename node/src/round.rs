//! Drives one block round on this node: execute the batches on a fresh worker pool, count
//! the node's own contenders as a vote and aggregate everyone else's.
use std::sync::Arc;

use thiserror::Error;

use crate::aggregator::{AggregatedBlock, Aggregator, AggregatorError};
use crate::block::chain::ChainView;
use crate::block::types::subblock::SubBlockContender;
use crate::block::types::transaction::TransactionBatch;
use crate::config::ExecutionConfiguration;
use crate::execution::executor::{ConflictResolutionExecutor, ExecutorError};
use crate::execution::worker::ExecutorFactory;
use crate::peer::{PeerId, ToPeerId};
use crate::utilities::crypto::Keypair;

#[derive(Error, Debug)]
pub enum RoundError {
    #[error("{batches} batches do not fit into {parallelism} sub-blocks")]
    TooManyBatches { batches: usize, parallelism: usize },
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutorError),
    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregatorError),
}

pub(crate) type Result<T> = std::result::Result<T, RoundError>;

/// What a round produced: this node's own contenders, to be sent to its peers, and the
/// aggregated block.
#[derive(Debug)]
pub struct RoundOutcome {
    pub contenders: Vec<SubBlockContender>,
    pub aggregated: AggregatedBlock,
}

pub struct BlockRound {
    config: ExecutionConfiguration,
    factory: ExecutorFactory,
    keypair: Arc<Keypair>,
    chain: Arc<dyn ChainView>,
}

impl BlockRound {
    pub fn new(
        config: ExecutionConfiguration,
        factory: ExecutorFactory,
        keypair: Arc<Keypair>,
        chain: Arc<dyn ChainView>,
    ) -> Self {
        Self {
            config,
            factory,
            keypair,
            chain,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.keypair.peer_id()
    }

    /// Executes `batches` and hands the result to `aggregator` as this node's vote, then
    /// gathers the votes of `total_contacts` contacts, this node included.
    ///
    /// A pool failure aborts the round. The round is never retried here.
    pub async fn run(
        &self,
        batches: &[TransactionBatch],
        aggregator: &mut Aggregator,
        total_contacts: usize,
    ) -> Result<RoundOutcome> {
        if batches.len() > self.config.parallelism {
            return Err(RoundError::TooManyBatches {
                batches: batches.len(),
                parallelism: self.config.parallelism,
            });
        }

        let contenders = self.execute(batches).await?;
        aggregator
            .handle()
            .send_contenders(self.peer_id(), contenders.clone())
            .await?;

        let aggregated = aggregator
            .gather_subblocks(total_contacts, batches.len())
            .await?;
        Ok(RoundOutcome {
            contenders,
            aggregated,
        })
    }

    async fn execute(&self, batches: &[TransactionBatch]) -> Result<Vec<SubBlockContender>> {
        let mut executor = ConflictResolutionExecutor::start(
            self.config.clone(),
            self.factory.clone(),
            self.keypair.clone(),
            self.chain.clone(),
        )
        .await?;

        let result = executor.execute_work(batches).await;
        executor.stop().await;
        Ok(result?)
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;
    use serde_json::json;

    use crate::block::chain::ChainHead;
    use crate::block::types::transaction::{Transaction, TransactionMetadata, TransactionPayload};
    use crate::config::ConsensusConfiguration;
    use crate::execution::native::{ContractRegistry, NativeExecutor};
    use crate::execution::state::MemoryState;
    use crate::execution::ContractExecutor;
    use crate::utilities::crypto::NodeKeypair;

    use super::*;

    fn crashing_factory() -> ExecutorFactory {
        let mut registry = ContractRegistry::new();
        registry.register("broken", "call", |_, _| panic!("contract crashed"));
        let committed = Arc::new(MemoryState::new());
        Arc::new(
            move |_: usize| -> anyhow::Result<Box<dyn ContractExecutor>> {
                Ok(Box::new(NativeExecutor::new(
                    registry.clone(),
                    committed.clone(),
                )))
            },
        )
    }

    fn call(nonce: u64) -> Transaction {
        Transaction {
            payload: TransactionPayload {
                sender: "alice".to_string(),
                processor: "processor".to_string(),
                contract: "broken".to_string(),
                function: "call".to_string(),
                kwargs: BTreeMap::from([("n".to_string(), json!(nonce))]),
                nonce,
                stamps_supplied: 100,
            },
            metadata: TransactionMetadata {
                signature: String::new(),
            },
        }
    }

    fn round(parallelism: usize) -> (BlockRound, Aggregator) {
        let mut config = ExecutionConfiguration::new(1, parallelism);
        config.collect_poll_interval_ms = 10;
        config.collect_poll_attempts = 5;
        let chain: Arc<dyn ChainView> = Arc::new(ChainHead::genesis());
        let round = BlockRound::new(
            config,
            crashing_factory(),
            Arc::new(Keypair::generate()),
            chain.clone(),
        );
        let aggregator = Aggregator::new(chain, ConsensusConfiguration::new(0.66, 0.5, 1_000));
        (round, aggregator)
    }

    #[tokio::test]
    async fn test_crashed_worker_aborts_round() {
        let (round, mut aggregator) = round(2);
        let batch = TransactionBatch::new(vec![call(1)], 1).unwrap();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            round.run(&[batch], &mut aggregator, 1),
        )
        .await
        .unwrap();

        assert_matches!(
            result,
            Err(RoundError::Execution(ExecutorError::MissingResults { collected: 0, .. }))
        );
    }

    #[tokio::test]
    async fn test_more_batches_than_subblocks() {
        let (round, mut aggregator) = round(1);
        let batches = vec![
            TransactionBatch::new(vec![], 1).unwrap(),
            TransactionBatch::new(vec![], 2).unwrap(),
        ];

        let result = round.run(&batches, &mut aggregator, 1).await;
        assert_matches!(
            result,
            Err(RoundError::TooManyBatches { batches: 2, parallelism: 1 })
        );
    }
}
