//! Read/write set conflict detection across every transaction of a block.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use crate::block::types::output::TxOutput;

/// Where an output sits in a block: batch index and position inside the batch.
///
/// Transactions are identified by location, not by hash, so two identical transactions in
/// different batches are still two transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxLocation {
    pub batch: usize,
    pub position: usize,
}

impl Display for TxLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.batch, self.position)
    }
}

/// Conflicting transactions ordered by location, which is also the order they are rerun in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConflictSet {
    conflicts: BTreeMap<TxLocation, String>,
}

impl ConflictSet {
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn contains(&self, location: &TxLocation) -> bool {
        self.conflicts.contains_key(location)
    }

    /// `(location, tx hash)` in rerun order.
    pub fn iter(&self) -> impl Iterator<Item = (&TxLocation, &String)> {
        self.conflicts.iter()
    }

    pub fn locations(&self) -> impl Iterator<Item = TxLocation> + '_ {
        self.conflicts.keys().copied()
    }

    fn insert(&mut self, location: TxLocation, hash: &str) {
        self.conflicts.insert(location, hash.to_string());
    }
}

/// True if the outcome of either transaction could depend on whether the other ran first.
pub fn outputs_conflict(a: &TxOutput, b: &TxOutput) -> bool {
    !a.pending_writes.is_disjoint(&b.reads)
        || !b.pending_writes.is_disjoint(&a.reads)
        || !a.pending_writes.is_disjoint(&b.pending_writes)
}

/// Compares every pair of transactions in the block, across batches.
pub fn check_conflicts(batches: &[Vec<TxOutput>]) -> ConflictSet {
    let outputs = batches
        .iter()
        .enumerate()
        .flat_map(|(batch, outputs)| {
            outputs
                .iter()
                .enumerate()
                .map(move |(position, output)| (TxLocation { batch, position }, output))
        })
        .collect::<Vec<_>>();

    let mut conflicts = ConflictSet::default();
    for (i, (a_location, a)) in outputs.iter().enumerate() {
        for (b_location, b) in &outputs[i + 1..] {
            if outputs_conflict(a, b) {
                log::trace!("Conflict between {a_location} and {b_location}");
                conflicts.insert(*a_location, a.hash());
                conflicts.insert(*b_location, b.hash());
            }
        }
    }
    conflicts
}

/// Grows `conflicts` with every transaction outside it that conflicts with a member,
/// until no more do. After a rerun the members' read and write sets may have changed, so a
/// transaction that was independent before can depend on a rerun result now.
pub fn extend_conflicts(batches: &[Vec<TxOutput>], conflicts: &ConflictSet) -> ConflictSet {
    let mut extended = conflicts.clone();
    loop {
        let mut added = false;
        for (batch, outputs) in batches.iter().enumerate() {
            for (position, output) in outputs.iter().enumerate() {
                let location = TxLocation { batch, position };
                if extended.contains(&location) {
                    continue;
                }
                let depends = extended
                    .locations()
                    .filter_map(|member| batches.get(member.batch)?.get(member.position))
                    .any(|member| outputs_conflict(member, output));
                if depends {
                    log::trace!("{location} depends on a rerun transaction");
                    extended.insert(location, output.hash());
                    added = true;
                }
            }
        }
        if !added {
            return extended;
        }
    }
}

/// Union of the pending write keys of every conflicting transaction.
pub fn invalidated_keys(batches: &[Vec<TxOutput>], conflicts: &ConflictSet) -> BTreeSet<String> {
    conflicts
        .locations()
        .filter_map(|location| {
            batches
                .get(location.batch)
                .and_then(|outputs| outputs.get(location.position))
        })
        .flat_map(|output| output.pending_writes.iter().cloned())
        .collect()
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use crate::block::types::output::TxResult;
    use crate::block::types::transaction::{Transaction, TransactionMetadata, TransactionPayload};

    use super::*;

    fn output(hash: &str, reads: &[&str], writes: &[&str]) -> TxOutput {
        let set = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect::<BTreeSet<_>>();
        TxOutput {
            result: TxResult {
                hash: hash.to_string(),
                transaction: Transaction {
                    payload: TransactionPayload {
                        sender: "a".to_string(),
                        processor: "p".to_string(),
                        contract: "c".to_string(),
                        function: "f".to_string(),
                        kwargs: BTreeMap::new(),
                        nonce: 0,
                        stamps_supplied: 0,
                    },
                    metadata: TransactionMetadata {
                        signature: String::new(),
                    },
                },
                status: 0,
                state: vec![],
                stamps_used: 0,
                result: String::new(),
                tx_number: 0,
            },
            reads: set(reads),
            pending_writes: set(writes),
        }
    }

    fn location(batch: usize, position: usize) -> TxLocation {
        TxLocation { batch, position }
    }

    #[test]
    fn test_write_read_conflict_across_batches() {
        let batches = vec![
            vec![output("a", &["x"], &["x"]), output("b", &["y"], &[])],
            vec![output("c", &["x"], &["z"])],
        ];
        let conflicts = check_conflicts(&batches);
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts.contains(&location(0, 0)));
        assert!(conflicts.contains(&location(1, 0)));
        assert!(!conflicts.contains(&location(0, 1)));
    }

    #[test]
    fn test_write_write_conflict() {
        let batches = vec![vec![output("a", &[], &["x"])], vec![output("b", &[], &["x"])]];
        assert_eq!(check_conflicts(&batches).len(), 2);
    }

    #[test]
    fn test_shared_reads_do_not_conflict() {
        let batches = vec![vec![output("a", &["x"], &["y"]), output("b", &["x"], &["z"])]];
        assert!(check_conflicts(&batches).is_empty());
    }

    #[test]
    fn test_identical_hashes_are_distinct_transactions() {
        let batches = vec![vec![output("same", &["x"], &["x"])], vec![output("same", &["x"], &["x"])]];
        let conflicts = check_conflicts(&batches);
        assert_eq!(conflicts.len(), 2);
    }

    #[test]
    fn test_extend_picks_up_new_dependencies() {
        let mut batches = vec![
            vec![output("a", &["x"], &["x"]), output("b", &["x"], &[])],
            vec![output("c", &["y"], &[])],
        ];
        let conflicts = check_conflicts(&batches);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(extend_conflicts(&batches, &conflicts), conflicts);

        // rerun of "b" now succeeded and wrote what "c" read
        batches[0][1].pending_writes.insert("y".to_string());
        let extended = extend_conflicts(&batches, &conflicts);
        assert_eq!(extended.len(), 3);
        assert!(extended.contains(&location(1, 0)));
    }

    #[test]
    fn test_rerun_order_and_invalidated_keys() {
        let batches = vec![
            vec![output("a", &[], &["k"]), output("b", &["q"], &["j"])],
            vec![output("c", &["k"], &["m"])],
            vec![output("d", &["j"], &[])],
        ];
        let conflicts = check_conflicts(&batches);
        let order = conflicts.locations().collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![location(0, 0), location(0, 1), location(1, 0), location(2, 0)]
        );
        assert_eq!(
            invalidated_keys(&batches, &conflicts),
            BTreeSet::from(["j".to_string(), "k".to_string(), "m".to_string()])
        );
    }
}
