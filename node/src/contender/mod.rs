//! # Sub-block voting
//!
//! Every peer executes the same batches and sends one signed [`SubBlockContender`] per
//! sub-block index. A [`BlockContender`] keeps one [`SubBlockTally`] per index and counts
//! each distinct result as a vote. A signer is counted at most once per index.

use std::collections::HashSet;

use crate::block::types::block::SubBlock;
use crate::block::types::subblock::SubBlockContender;
use crate::config::ConsensusConfiguration;
use crate::utilities::crypto::PublicKey;

pub mod tally;
pub mod validation;

pub use tally::{PotentialSolution, SubBlockTally, TallyState};
pub use validation::{validate_sbc, ValidationError};

/// Which threshold a solution must reach to be put into a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusLevel {
    Required,
    Adequate,
}

/// Vote tallies of all sub-block indexes of one block.
pub struct BlockContender {
    tallies: Vec<SubBlockTally>,
    voted: HashSet<(usize, PublicKey)>,
    total_contacts: usize,
}

impl BlockContender {
    pub fn new(
        total_subblocks: usize,
        total_contacts: usize,
        consensus: &ConsensusConfiguration,
    ) -> Self {
        let tallies = (0..total_subblocks)
            .map(|_| {
                SubBlockTally::new(
                    total_contacts,
                    consensus.required_consensus,
                    consensus.adequate_consensus,
                )
            })
            .collect();
        Self {
            tallies,
            voted: HashSet::new(),
            total_contacts,
        }
    }

    /// Routes every contender to the tally of its index. Contenders for an index outside the
    /// block, or from a signer already counted for that index, are dropped. Returns how many
    /// were counted.
    pub fn add_sbcs(&mut self, sbcs: Vec<SubBlockContender>) -> usize {
        let mut counted = 0;
        for sbc in sbcs {
            let index = sbc.subblock;
            let Some(tally) = self.tallies.get_mut(index) else {
                log::debug!("Dropping contender for sub-block {index} out of range");
                continue;
            };
            let voter = (index, sbc.signer.clone());
            if self.voted.contains(&voter) {
                log::debug!("Dropping repeated vote of {} for sub-block {index}", sbc.signer);
                continue;
            }
            if tally.add_potential_solution(sbc) {
                self.voted.insert(voter);
                counted += 1;
            }
        }
        counted
    }

    pub fn block_has_consensus(&self) -> bool {
        self.every_index_has(ConsensusLevel::Required)
    }

    pub fn every_index_has(&self, level: ConsensusLevel) -> bool {
        !self.tallies.is_empty()
            && self.tallies.iter().all(|tally| match level {
                ConsensusLevel::Required => tally.has_required_consensus(),
                ConsensusLevel::Adequate => tally.has_adequate_consensus(),
            })
    }

    /// Nothing that can still arrive changes the outcome of any index.
    pub fn all_responded(&self) -> bool {
        self.tallies.iter().all(SubBlockTally::all_responded)
    }

    /// Best solution of every index that reaches `level`, `None` for the rest.
    pub fn get_current_best_block(&self, level: ConsensusLevel) -> Vec<Option<SubBlock>> {
        self.tallies
            .iter()
            .map(|tally| {
                let usable = match level {
                    ConsensusLevel::Required => tally.has_required_consensus(),
                    ConsensusLevel::Adequate => tally.has_adequate_consensus(),
                };
                if usable {
                    tally.best().map(PotentialSolution::to_subblock)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn tally(&self, index: usize) -> Option<&SubBlockTally> {
        self.tallies.get(index)
    }

    pub fn total_subblocks(&self) -> usize {
        self.tallies.len()
    }

    pub fn total_contacts(&self) -> usize {
        self.total_contacts
    }

    /// One line per index, for logging.
    pub fn summary(&self) -> String {
        self.tallies
            .iter()
            .enumerate()
            .map(|(i, tally)| {
                format!(
                    "{i}: {} ({}/{} responses, {} solutions)",
                    tally.state(),
                    tally.total_responses(),
                    self.total_contacts,
                    tally.solution_count()
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod test {
    use crate::utilities::crypto::{Keypair, NodeKeypair};

    use super::*;

    fn consensus() -> ConsensusConfiguration {
        ConsensusConfiguration::new(0.66, 0.5, 1_000)
    }

    fn sbc(keypair: &Keypair, index: usize, input_hash: &str) -> SubBlockContender {
        SubBlockContender::new(
            input_hash.to_string(),
            vec![],
            index,
            "00".to_string(),
            keypair,
        )
        .unwrap()
    }

    #[test]
    fn test_repeated_vote_is_ignored() {
        let mut contender = BlockContender::new(1, 3, &consensus());
        let keypair = Keypair::generate();

        assert_eq!(contender.add_sbcs(vec![sbc(&keypair, 0, "a")]), 1);
        assert_eq!(contender.add_sbcs(vec![sbc(&keypair, 0, "a")]), 0);
        assert_eq!(contender.add_sbcs(vec![sbc(&keypair, 0, "b")]), 0);
        assert_eq!(contender.tally(0).unwrap().total_responses(), 1);
    }

    #[test]
    fn test_uncounted_contender_keeps_signer_slot() {
        let mut contender = BlockContender::new(1, 3, &consensus());
        let keypair = Keypair::generate();

        let mut rootless = sbc(&keypair, 0, "a");
        rootless.merkle_tree.leaves.clear();
        assert_eq!(contender.add_sbcs(vec![rootless]), 0);
        assert_eq!(contender.add_sbcs(vec![sbc(&keypair, 0, "a")]), 1);
        assert_eq!(contender.tally(0).unwrap().total_responses(), 1);
    }

    #[test]
    fn test_out_of_range_index_is_dropped() {
        let mut contender = BlockContender::new(2, 3, &consensus());
        let counted = contender.add_sbcs(vec![sbc(&Keypair::generate(), 5, "a")]);
        assert_eq!(counted, 0);
        assert!(contender.tallies.iter().all(|t| t.total_responses() == 0));
    }

    #[test]
    fn test_block_consensus_needs_every_index() {
        let mut contender = BlockContender::new(2, 3, &consensus());
        let peers = (0..3).map(|_| Keypair::generate()).collect::<Vec<_>>();
        for peer in &peers[..2] {
            contender.add_sbcs(vec![sbc(peer, 0, "a")]);
        }
        assert!(!contender.block_has_consensus());

        for peer in &peers[..2] {
            contender.add_sbcs(vec![sbc(peer, 1, "b")]);
        }
        // 2 of 3 is 0.666.. >= 0.66
        assert!(contender.block_has_consensus());
        assert!(!contender.all_responded());

        let block = contender.get_current_best_block(ConsensusLevel::Required);
        assert!(block.iter().all(Option::is_some));
    }

    #[test]
    fn test_adequate_salvage() {
        let mut contender = BlockContender::new(2, 4, &consensus());
        let peers = (0..4).map(|_| Keypair::generate()).collect::<Vec<_>>();
        for (i, peer) in peers.iter().enumerate() {
            let second = if i < 2 { "x" } else { "y" };
            contender.add_sbcs(vec![sbc(peer, 0, "a"), sbc(peer, 1, second)]);
        }
        assert!(contender.all_responded());
        assert!(contender.tally(1).unwrap().failed());

        let required = contender.get_current_best_block(ConsensusLevel::Required);
        assert!(required[0].is_some());
        assert!(required[1].is_none());

        assert!(contender.every_index_has(ConsensusLevel::Adequate));
        let adequate = contender.get_current_best_block(ConsensusLevel::Adequate);
        assert!(adequate.iter().all(Option::is_some));
    }
}
