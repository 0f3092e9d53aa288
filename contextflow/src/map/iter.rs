//! Snapshot iterators over a persistent map.

use super::node::{Entry, Leaf, Node};
use std::iter::FusedIterator;
use std::slice;
use std::sync::Arc;

/// Iterator over the `(key, value)` pairs of one map version.
///
/// Order is determined by the key hashes and is the same every time the
/// same version is iterated.
pub struct Iter<'a, K, V> {
    stack: Vec<slice::Iter<'a, Entry<K, V>>>,
    bucket: Option<slice::Iter<'a, Arc<Leaf<K, V>>>>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(root: Option<&'a Arc<Node<K, V>>>, len: usize) -> Self {
        let mut iter = Self {
            stack: Vec::new(),
            bucket: None,
            remaining: len,
        };
        if let Some(root) = root {
            iter.descend(root);
        }
        iter
    }

    fn descend(&mut self, node: &'a Node<K, V>) {
        match node {
            Node::Branch { entries, .. } => self.stack.push(entries.iter()),
            Node::Collision { leaves, .. } => self.bucket = Some(leaves.iter()),
        }
    }

    fn yield_leaf(&mut self, leaf: &'a Leaf<K, V>) -> Option<(&'a K, &'a V)> {
        self.remaining -= 1;
        Some((&leaf.key, &leaf.value))
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(bucket) = &mut self.bucket {
                if let Some(leaf) = bucket.next() {
                    return self.yield_leaf(leaf);
                }
                self.bucket = None;
            }

            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                }
                Some(Entry::Leaf(leaf)) => return self.yield_leaf(leaf),
                Some(Entry::Node(node)) => self.descend(node),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Iterator over the keys of one map version.
pub struct Keys<'a, K, V> {
    pub(crate) inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// Iterator over the values of one map version.
pub struct Values<'a, K, V> {
    pub(crate) inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

impl<K, V> FusedIterator for Values<'_, K, V> {}
