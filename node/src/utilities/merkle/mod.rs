//! Array backed Merkle tree over hex encoded Blake2b-256 hashes.
//!
//! The tree for `n` leaves is stored as `2n - 1` nodes, root first, the leaves occupying the
//! last `n` positions. Node `i` is the hash of the concatenated raw bytes of nodes `2i + 1`
//! and `2i + 2`. A single leaf tree is just that leaf, so the root of the empty sub-block
//! tree is `hash(input_hash)`.
use crate::utilities::encoding::from_hex;
use crate::utilities::hash::{blake2_256, blake2_256_hex};

pub struct Merkle;

impl Merkle {
    /// Hashes every item and builds the full tree from the resulting leaves.
    pub fn merklize<T: AsRef<[u8]>>(items: &[T]) -> anyhow::Result<Vec<String>> {
        let leaves = items
            .iter()
            .map(|item| blake2_256_hex(item.as_ref()))
            .collect::<Vec<_>>();
        Self::from_leaves(leaves)
    }

    /// Builds the tree from already hashed, hex encoded leaves.
    pub fn from_leaves(leaves: Vec<String>) -> anyhow::Result<Vec<String>> {
        if leaves.is_empty() {
            anyhow::bail!("Cannot build a Merkle tree without leaves");
        }
        let inner = leaves.len() - 1;
        let mut nodes = vec![String::new(); inner];
        nodes.extend(leaves);

        for i in (0..inner).rev() {
            let mut pair = from_hex(&nodes[2 * i + 1])?;
            pair.extend(from_hex(&nodes[2 * i + 2])?);
            nodes[i] = blake2_256_hex(&pair);
        }
        Ok(nodes)
    }

    pub fn root(tree: &[String]) -> Option<&String> {
        tree.first()
    }

    /// True iff `tree` is exactly the tree built from `items`, length and every node.
    pub fn verify_leaves<T: AsRef<[u8]>>(items: &[T], tree: &[String]) -> bool {
        match Self::merklize(items) {
            Ok(expected) => expected == tree,
            Err(_) => false,
        }
    }

    pub fn hash_leaf(item: &[u8]) -> [u8; 32] {
        blake2_256(item)
    }
}

#[cfg(test)]
mod test {
    use crate::utilities::encoding::to_hex;

    use super::*;

    #[test]
    fn test_single_leaf_is_root() {
        let tree = Merkle::merklize(&[b"input".to_vec()]).unwrap();
        assert_eq!(tree, vec![blake2_256_hex(b"input")]);
    }

    #[test]
    fn test_tree_layout() {
        let items = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        let tree = Merkle::merklize(&items).unwrap();
        assert_eq!(tree.len(), 5);

        let leaf = |x: &[u8]| Merkle::hash_leaf(x).to_vec();
        // leaves occupy the tail: [_, _, a, b, c]
        assert_eq!(tree[2], to_hex(leaf(b"a")));
        assert_eq!(tree[4], to_hex(leaf(b"c")));

        let node1 = blake2_256(&[leaf(b"b"), leaf(b"c")].concat());
        assert_eq!(tree[1], to_hex(node1));
        // with an odd leaf count the first leaf pairs with the inner node
        let root = blake2_256(&[node1.to_vec(), leaf(b"a")].concat());
        assert_eq!(Merkle::root(&tree), Some(&to_hex(root)));
    }

    #[test]
    fn test_verify_leaves() {
        let items = vec![b"a".to_vec(), b"b".to_vec()];
        let tree = Merkle::merklize(&items).unwrap();
        assert!(Merkle::verify_leaves(&items, &tree));

        let mut tampered = tree.clone();
        tampered[2] = blake2_256_hex(b"x");
        assert!(!Merkle::verify_leaves(&items, &tampered));
        assert!(!Merkle::verify_leaves(&items, &tree[..2]));
        assert!(!Merkle::verify_leaves(&[b"a".to_vec()], &tree));
    }

    #[test]
    fn test_empty_is_error() {
        let items: Vec<Vec<u8>> = vec![];
        assert!(Merkle::merklize(&items).is_err());
    }
}
