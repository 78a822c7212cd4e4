//! Collects sub-block contenders from peers and decides what the next block looks like.
//!
//! One [`Aggregator::gather_subblocks`] call is one round. It waits for peer messages until
//! every index has the required consensus, every contact answered, the round is cancelled
//! or the consensus timeout expires. Whatever was tallied by then is turned into a block:
//!
//! * every index at the required threshold: [`BlockStatus::Confirmed`]
//! * every index at least at the adequate threshold: [`BlockStatus::Degraded`]
//! * otherwise [`BlockStatus::Failed`], indexes below the adequate threshold are `None`
use std::fmt::Display;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::block::chain::ChainView;
use crate::block::types::block::Block;
use crate::block::types::subblock::SubBlockContender;
use crate::config::ConsensusConfiguration;
use crate::contender::{validate_sbc, BlockContender, ConsensusLevel};
use crate::peer::PeerId;
use crate::utilities::id::{generate_round_id, RoundId};

pub const INBOX_CAPACITY: usize = 1_000;

#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("Aggregator inbox is closed")]
    InboxClosed,
    #[error("General error: {0}")]
    General(#[from] anyhow::Error),
}

pub(crate) type Result<T> = std::result::Result<T, AggregatorError>;

#[derive(Debug, Clone)]
pub enum AggregatorMessage {
    /// A peer's contenders, position `i` expected to be sub-block `i`
    SubBlockContenders {
        peer: PeerId,
        contenders: Vec<SubBlockContender>,
    },
    /// Stop waiting and build the block from what was received so far
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Confirmed,
    Degraded,
    Failed,
}

impl Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockStatus::Confirmed => write!(f, "confirmed"),
            BlockStatus::Degraded => write!(f, "degraded"),
            BlockStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatedBlock {
    pub block: Block,
    pub status: BlockStatus,
}

impl AggregatedBlock {
    pub fn is_confirmed(&self) -> bool {
        self.status == BlockStatus::Confirmed
    }
}

/// Sending side of an aggregator's inbox.
#[derive(Clone)]
pub struct AggregatorHandle {
    sender: mpsc::Sender<AggregatorMessage>,
}

impl AggregatorHandle {
    pub async fn send_contenders(
        &self,
        peer: PeerId,
        contenders: Vec<SubBlockContender>,
    ) -> Result<()> {
        self.send(AggregatorMessage::SubBlockContenders { peer, contenders })
            .await
    }

    pub async fn cancel(&self) -> Result<()> {
        self.send(AggregatorMessage::Cancel).await
    }

    pub async fn send(&self, message: AggregatorMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| AggregatorError::InboxClosed)
    }
}

pub struct Aggregator {
    inbox: mpsc::Receiver<AggregatorMessage>,
    handle: AggregatorHandle,
    chain: Arc<dyn ChainView>,
    consensus: ConsensusConfiguration,
}

impl Aggregator {
    pub fn new(chain: Arc<dyn ChainView>, consensus: ConsensusConfiguration) -> Self {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        Self {
            inbox,
            handle: AggregatorHandle { sender },
            chain,
            consensus,
        }
    }

    pub fn handle(&self) -> AggregatorHandle {
        self.handle.clone()
    }

    pub async fn gather_subblocks(
        &mut self,
        total_contacts: usize,
        expected_subblocks: usize,
    ) -> Result<AggregatedBlock> {
        let round = generate_round_id();
        let (height, previous) = self.chain.latest_block();
        let mut contender =
            BlockContender::new(expected_subblocks, total_contacts, &self.consensus);
        let deadline = Instant::now() + self.consensus.timeout();
        log::debug!(
            "[{round}] Gathering {expected_subblocks} sub-blocks from {total_contacts} contacts"
        );

        loop {
            if contender.block_has_consensus() {
                log::debug!("[{round}] Every sub-block reached consensus");
                break;
            }
            if contender.all_responded() {
                log::debug!("[{round}] Every contact responded");
                break;
            }
            match tokio::time::timeout_at(deadline, self.inbox.recv()).await {
                Ok(Some(AggregatorMessage::SubBlockContenders { peer, contenders })) => {
                    Self::process_contenders(
                        &round,
                        &previous,
                        &mut contender,
                        &peer,
                        contenders,
                    );
                }
                Ok(Some(AggregatorMessage::Cancel)) => {
                    log::info!("[{round}] Cancelled");
                    break;
                }
                Ok(None) => {
                    log::warn!("[{round}] Inbox closed");
                    break;
                }
                Err(_) => {
                    log::info!("[{round}] Timed out: {}", contender.summary());
                    break;
                }
            }
        }

        Self::build_block(&round, height + 1, previous, &contender)
    }

    fn process_contenders(
        round: &RoundId,
        previous: &str,
        contender: &mut BlockContender,
        peer: &PeerId,
        contenders: Vec<SubBlockContender>,
    ) {
        let received = contenders.len();
        let valid = contenders
            .into_iter()
            .enumerate()
            .filter_map(|(position, sbc)| match validate_sbc(position, previous, &sbc) {
                Ok(()) => Some(sbc),
                Err(err) => {
                    log::warn!(
                        "[{round}] Rejected contender {position} from {peer} signed by {}: {err}",
                        sbc.signer
                    );
                    None
                }
            })
            .collect::<Vec<_>>();
        let counted = contender.add_sbcs(valid);
        log::debug!("[{round}] Counted {counted} of {received} contenders from {peer}");
    }

    fn build_block(
        round: &RoundId,
        number: u64,
        previous: String,
        contender: &BlockContender,
    ) -> Result<AggregatedBlock> {
        let (status, level) = if contender.every_index_has(ConsensusLevel::Required) {
            (BlockStatus::Confirmed, ConsensusLevel::Required)
        } else if contender.every_index_has(ConsensusLevel::Adequate) {
            (BlockStatus::Degraded, ConsensusLevel::Adequate)
        } else {
            (BlockStatus::Failed, ConsensusLevel::Adequate)
        };

        let subblocks = contender.get_current_best_block(level);
        let block = Block::new(number, previous, subblocks)?;

        match status {
            BlockStatus::Confirmed => log::info!("[{round}] Block {block} {status}"),
            _ => log::warn!(
                "[{round}] Block {block} {status}, missing sub-blocks {:?}",
                block.missing_subblocks()
            ),
        }
        Ok(AggregatedBlock { block, status })
    }
}
