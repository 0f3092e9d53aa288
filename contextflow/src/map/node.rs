//! Hash array mapped trie nodes with path copying.
//!
//! Each level consumes 5 bits of a 64-bit key hash. Branch nodes store only
//! their occupied slots, addressed through a 32-bit bitmap. Keys whose full
//! hashes are equal share a collision bucket. Updates never touch an existing
//! node: every node on the path from the root to the changed slot is copied
//! and everything else is shared with the previous version.

use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Number of hash bits consumed per trie level.
pub(crate) const BITS: u32 = 5;

const MASK: u64 = (1 << BITS) - 1;

/// Hashes a key with the fixed hasher shared by every map version.
///
/// A fixed hasher keeps iteration order reproducible across runs.
pub(crate) fn hash_key<Q: Hash + ?Sized>(key: &Q) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[inline]
fn index(hash: u64, shift: u32) -> u32 {
    // Truncation is intended: the mask keeps five bits.
    #[allow(clippy::cast_possible_truncation)]
    let idx = ((hash >> shift) & MASK) as u32;
    idx
}

#[inline]
pub(crate) fn bit(hash: u64, shift: u32) -> u32 {
    1 << index(hash, shift)
}

#[inline]
fn position(bitmap: u32, bit: u32) -> usize {
    (bitmap & (bit - 1)).count_ones() as usize
}

/// A stored association together with its cached hash.
#[derive(Debug)]
pub(crate) struct Leaf<K, V> {
    pub(crate) hash: u64,
    pub(crate) key: K,
    pub(crate) value: V,
}

/// An occupied slot of a branch node.
pub(crate) enum Entry<K, V> {
    Leaf(Arc<Leaf<K, V>>),
    Node(Arc<Node<K, V>>),
}

impl<K, V> Clone for Entry<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Leaf(leaf) => Self::Leaf(Arc::clone(leaf)),
            Self::Node(node) => Self::Node(Arc::clone(node)),
        }
    }
}

/// An interior trie node.
pub(crate) enum Node<K, V> {
    Branch {
        bitmap: u32,
        entries: Vec<Entry<K, V>>,
    },
    Collision {
        hash: u64,
        leaves: Vec<Arc<Leaf<K, V>>>,
    },
}

/// Outcome of removing a key below some node.
pub(crate) enum Removal<K, V> {
    /// The key was not present; the node is unchanged.
    NotFound,
    /// The node lost its last entry.
    Empty,
    /// The node shrank to a single leaf that the parent should inline.
    Leaf(Arc<Leaf<K, V>>),
    /// The node was replaced by a smaller copy.
    Node(Arc<Node<K, V>>),
}

impl<K, V> Node<K, V> {
    /// Creates a branch holding a single leaf.
    pub(crate) fn singleton(shift: u32, leaf: Arc<Leaf<K, V>>) -> Self {
        Self::Branch {
            bitmap: bit(leaf.hash, shift),
            entries: vec![Entry::Leaf(leaf)],
        }
    }

    /// Builds the smallest subtree at `shift` that holds two distinct leaves.
    fn pair(shift: u32, a: Arc<Leaf<K, V>>, b: Arc<Leaf<K, V>>) -> Self {
        if a.hash == b.hash {
            return Self::Collision {
                hash: a.hash,
                leaves: vec![a, b],
            };
        }

        let ia = index(a.hash, shift);
        let ib = index(b.hash, shift);

        if ia == ib {
            Self::Branch {
                bitmap: 1 << ia,
                entries: vec![Entry::Node(Arc::new(Self::pair(shift + BITS, a, b)))],
            }
        } else {
            let (first, second) = if ia < ib { (a, b) } else { (b, a) };
            Self::Branch {
                bitmap: (1 << ia) | (1 << ib),
                entries: vec![Entry::Leaf(first), Entry::Leaf(second)],
            }
        }
    }

    /// Looks up a key by its precomputed hash.
    pub(crate) fn get<Q>(&self, hash: u64, key: &Q) -> Option<&Leaf<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut node = self;
        let mut shift = 0;

        loop {
            match node {
                Self::Branch { bitmap, entries } => {
                    let bit = bit(hash, shift);
                    if bitmap & bit == 0 {
                        return None;
                    }
                    match &entries[position(*bitmap, bit)] {
                        Entry::Leaf(leaf) => {
                            return (leaf.hash == hash && leaf.key.borrow() == key)
                                .then(|| leaf.as_ref());
                        }
                        Entry::Node(child) => {
                            node = child;
                            shift += BITS;
                        }
                    }
                }
                Self::Collision {
                    hash: bucket_hash,
                    leaves,
                } => {
                    if *bucket_hash != hash {
                        return None;
                    }
                    return leaves
                        .iter()
                        .find(|leaf| leaf.key.borrow() == key)
                        .map(AsRef::as_ref);
                }
            }
        }
    }

    /// Counts the nodes of this subtree, used by tests to check sharing.
    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        match self {
            Self::Branch { entries, .. } => {
                1 + entries
                    .iter()
                    .map(|entry| match entry {
                        Entry::Leaf(_) => 0,
                        Entry::Node(child) => child.depth(),
                    })
                    .max()
                    .unwrap_or(0)
            }
            Self::Collision { .. } => 1,
        }
    }
}

/// Inserts `leaf` below `node`, returning the new node and whether the key
/// was newly added (as opposed to replaced).
pub(crate) fn insert<K: Eq, V>(
    node: &Arc<Node<K, V>>,
    shift: u32,
    leaf: Arc<Leaf<K, V>>,
) -> (Arc<Node<K, V>>, bool) {
    match node.as_ref() {
        Node::Branch { bitmap, entries } => {
            let bit = bit(leaf.hash, shift);
            let pos = position(*bitmap, bit);

            if bitmap & bit == 0 {
                let mut entries = entries.clone();
                entries.insert(pos, Entry::Leaf(leaf));
                let branch = Node::Branch {
                    bitmap: bitmap | bit,
                    entries,
                };
                return (Arc::new(branch), true);
            }

            let (replacement, added) = match &entries[pos] {
                Entry::Leaf(existing) if existing.hash == leaf.hash && existing.key == leaf.key => {
                    (Entry::Leaf(leaf), false)
                }
                Entry::Leaf(existing) => {
                    let pair = Node::pair(shift + BITS, Arc::clone(existing), leaf);
                    (Entry::Node(Arc::new(pair)), true)
                }
                Entry::Node(child) => {
                    let (child, added) = insert(child, shift + BITS, leaf);
                    (Entry::Node(child), added)
                }
            };

            let mut entries = entries.clone();
            entries[pos] = replacement;
            (
                Arc::new(Node::Branch {
                    bitmap: *bitmap,
                    entries,
                }),
                added,
            )
        }
        Node::Collision { hash, leaves } if *hash == leaf.hash => {
            let mut leaves = leaves.clone();
            let added = match leaves.iter().position(|existing| existing.key == leaf.key) {
                Some(i) => {
                    leaves[i] = leaf;
                    false
                }
                None => {
                    leaves.push(leaf);
                    true
                }
            };
            (Arc::new(Node::Collision { hash: *hash, leaves }), added)
        }
        Node::Collision { hash, .. } => {
            // A different hash reached this bucket: push the bucket one level
            // down behind a branch and retry there.
            let branch = Arc::new(Node::Branch {
                bitmap: bit(*hash, shift),
                entries: vec![Entry::Node(Arc::clone(node))],
            });
            insert(&branch, shift, leaf)
        }
    }
}

/// Removes `key` below `node`.
///
/// Branches that shrink to a single leaf below the root are collapsed into
/// their parent so that the trie stays canonical.
pub(crate) fn remove<K, V, Q>(node: &Arc<Node<K, V>>, shift: u32, hash: u64, key: &Q) -> Removal<K, V>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    match node.as_ref() {
        Node::Branch { bitmap, entries } => {
            let bit = bit(hash, shift);
            if bitmap & bit == 0 {
                return Removal::NotFound;
            }
            let pos = position(*bitmap, bit);

            match &entries[pos] {
                Entry::Leaf(leaf) if leaf.hash == hash && leaf.key.borrow() == key => {
                    without(*bitmap, entries, pos, bit, shift)
                }
                Entry::Leaf(_) => Removal::NotFound,
                Entry::Node(child) => match remove(child, shift + BITS, hash, key) {
                    Removal::NotFound => Removal::NotFound,
                    Removal::Empty => without(*bitmap, entries, pos, bit, shift),
                    Removal::Leaf(leaf) if shift > 0 && entries.len() == 1 => Removal::Leaf(leaf),
                    Removal::Leaf(leaf) => replaced(*bitmap, entries, pos, Entry::Leaf(leaf)),
                    Removal::Node(child) => replaced(*bitmap, entries, pos, Entry::Node(child)),
                },
            }
        }
        Node::Collision {
            hash: bucket_hash,
            leaves,
        } => {
            if *bucket_hash != hash {
                return Removal::NotFound;
            }
            let Some(i) = leaves.iter().position(|leaf| leaf.key.borrow() == key) else {
                return Removal::NotFound;
            };
            match leaves.len() {
                1 => Removal::Empty,
                2 => Removal::Leaf(Arc::clone(&leaves[1 - i])),
                _ => {
                    let mut leaves = leaves.clone();
                    leaves.remove(i);
                    Removal::Node(Arc::new(Node::Collision {
                        hash: *bucket_hash,
                        leaves,
                    }))
                }
            }
        }
    }
}

fn without<K, V>(bitmap: u32, entries: &[Entry<K, V>], pos: usize, bit: u32, shift: u32) -> Removal<K, V> {
    if entries.len() == 1 {
        return Removal::Empty;
    }
    if shift > 0 && entries.len() == 2 {
        if let Entry::Leaf(other) = &entries[1 - pos] {
            return Removal::Leaf(Arc::clone(other));
        }
    }

    let mut entries = entries.to_vec();
    entries.remove(pos);
    Removal::Node(Arc::new(Node::Branch {
        bitmap: bitmap & !bit,
        entries,
    }))
}

fn replaced<K, V>(bitmap: u32, entries: &[Entry<K, V>], pos: usize, entry: Entry<K, V>) -> Removal<K, V> {
    let mut entries = entries.to_vec();
    entries[pos] = entry;
    Removal::Node(Arc::new(Node::Branch { bitmap, entries }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(hash: u64, key: &'static str) -> Arc<Leaf<&'static str, u32>> {
        Arc::new(Leaf {
            hash,
            key,
            value: 0,
        })
    }

    #[test]
    fn test_position_counts_lower_bits() {
        assert_eq!(position(0b1011, 0b1000), 2);
        assert_eq!(position(0b1011, 0b0001), 0);
        assert_eq!(position(0, 1 << 31), 0);
    }

    #[test]
    fn test_pair_splits_on_first_differing_chunk() {
        // Same low five bits, different next chunk.
        let node = Node::pair(0, leaf(0b00001_00011, "a"), leaf(0b00010_00011, "b"));
        match node {
            Node::Branch { bitmap, entries } => {
                assert_eq!(bitmap, 1 << 0b00011);
                assert!(matches!(entries[0], Entry::Node(_)));
            }
            Node::Collision { .. } => panic!("expected a branch"),
        }
    }

    #[test]
    fn test_pair_with_equal_hashes_collides() {
        let node = Node::pair(0, leaf(42, "a"), leaf(42, "b"));
        assert!(matches!(node, Node::Collision { hash: 42, .. }));
    }

    #[test]
    fn test_insert_into_collision_with_new_hash_grows_branch() {
        let root = Arc::new(Node::pair(0, leaf(7, "a"), leaf(7, "b")));
        let (root, added) = insert(&root, 0, leaf(7 | (1 << 20), "c"));

        assert!(added);
        assert!(root.get(7, "a").is_some());
        assert!(root.get(7, "b").is_some());
        assert!(root.get(7 | (1 << 20), "c").is_some());
    }

    #[test]
    fn test_remove_collapses_single_leaf() {
        let root = Arc::new(Node::singleton(0, leaf(1, "a")));
        let (root, _) = insert(&root, 0, leaf(1 | (1 << 5), "b"));
        assert_eq!(root.depth(), 2);

        match remove(&root, 0, 1 | (1 << 5), "b") {
            Removal::Node(root) => {
                assert_eq!(root.depth(), 1);
                assert!(root.get(1, "a").is_some());
            }
            _ => panic!("expected a smaller root"),
        }
    }
}
