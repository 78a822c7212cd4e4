use std::collections::HashMap;
use std::fmt::Display;

use crate::block::types::block::{SubBlock, VoteSignature};
use crate::block::types::subblock::SubBlockContender;

/// One candidate result for a sub-block index and everyone who signed it.
#[derive(Debug, Clone)]
pub struct PotentialSolution {
    /// First contender seen with this result, the one that goes into the block
    pub contender: SubBlockContender,
    pub signatures: Vec<VoteSignature>,
}

impl PotentialSolution {
    fn new(contender: SubBlockContender) -> Self {
        Self {
            contender,
            signatures: vec![],
        }
    }

    pub fn votes(&self) -> usize {
        self.signatures.len()
    }

    pub fn to_subblock(&self) -> SubBlock {
        SubBlock::new(&self.contender, self.signatures.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyState {
    Open,
    ResultEmerging,
    Consensus,
    Failed,
}

impl Display for TallyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyState::Open => write!(f, "open"),
            TallyState::ResultEmerging => write!(f, "result emerging"),
            TallyState::Consensus => write!(f, "consensus"),
            TallyState::Failed => write!(f, "failed"),
        }
    }
}

/// Votes for the result of one sub-block index.
///
/// The best solution is the one with most votes. It only changes when another solution
/// gets strictly more, so a tie keeps the one that reached the count first.
#[derive(Debug, Clone)]
pub struct SubBlockTally {
    potential_solutions: HashMap<String, PotentialSolution>,
    best_solution: Option<String>,
    total_responses: usize,
    total_contacts: usize,
    required_consensus: f64,
    adequate_consensus: f64,
}

impl SubBlockTally {
    pub fn new(total_contacts: usize, required_consensus: f64, adequate_consensus: f64) -> Self {
        Self {
            potential_solutions: HashMap::new(),
            best_solution: None,
            total_responses: 0,
            total_contacts,
            required_consensus,
            adequate_consensus,
        }
    }

    /// Counts `sbc` as a vote for its result. Returns false for a contender without a
    /// Merkle root, which is not counted.
    pub fn add_potential_solution(&mut self, sbc: SubBlockContender) -> bool {
        let Some(result_hash) = sbc.result_hash().map(str::to_string) else {
            return false;
        };
        let vote = VoteSignature {
            signature: sbc.merkle_tree.signature.clone(),
            signer: sbc.signer.clone(),
        };

        let solution = self
            .potential_solutions
            .entry(result_hash.clone())
            .or_insert_with(|| PotentialSolution::new(sbc));
        solution.signatures.push(vote);
        let votes = solution.votes();
        self.total_responses += 1;

        let best_votes = self.best().map(PotentialSolution::votes).unwrap_or(0);
        if votes > best_votes {
            self.best_solution = Some(result_hash);
        }
        true
    }

    pub fn best(&self) -> Option<&PotentialSolution> {
        self.best_solution
            .as_ref()
            .and_then(|hash| self.potential_solutions.get(hash))
    }

    pub fn has_required_consensus(&self) -> bool {
        self.reaches(self.required_consensus)
    }

    pub fn has_adequate_consensus(&self) -> bool {
        self.reaches(self.adequate_consensus)
    }

    fn reaches(&self, threshold: f64) -> bool {
        if self.total_contacts == 0 {
            return false;
        }
        let votes = self.best().map(PotentialSolution::votes).unwrap_or(0);
        votes as f64 / self.total_contacts as f64 >= threshold
    }

    /// Everyone answered and the required threshold still isn't met.
    pub fn failed(&self) -> bool {
        self.total_responses >= self.total_contacts && !self.has_required_consensus()
    }

    pub fn all_responded(&self) -> bool {
        self.total_responses >= self.total_contacts
    }

    pub fn state(&self) -> TallyState {
        if self.has_required_consensus() {
            TallyState::Consensus
        } else if self.failed() {
            TallyState::Failed
        } else if self.total_responses > 0 {
            TallyState::ResultEmerging
        } else {
            TallyState::Open
        }
    }

    pub fn total_responses(&self) -> usize {
        self.total_responses
    }

    pub fn solution_count(&self) -> usize {
        self.potential_solutions.len()
    }
}
