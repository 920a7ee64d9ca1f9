//! # btree-index
//!
//! An ordered map backed by a classic B-tree: every leaf sits at the same depth,
//! each node holds fewer than `M` entries, and the tree only grows taller when
//! the root itself splits.
//!
//! Internal entries carry a routing key (a copy of the smallest key in the
//! child subtree) and own that child; leaf entries carry the stored values.
//!
//! ## Example
//!
//! ```rust
//! use btree_index::BTree;
//!
//! let mut index: BTree<String, String> = BTree::new();
//! index.put("apple".to_string(), "10000000".to_string());
//! index.put("broccoli".to_string(), "10000000".to_string());
//!
//! assert_eq!(index.get("apple").map(String::as_str), Some("10000000"));
//! assert_eq!(index.get("pear"), None);
//! assert_eq!(index.size(), 2);
//! assert_eq!(index.height(), 0);
//! ```

#![forbid(unsafe_code)]

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::iter::FusedIterator;
use std::mem;

// =============================================================================
// Configuration
// =============================================================================

/// Fan-out used by [`BTree::new`].
pub const DEFAULT_FANOUT: usize = 4;

/// Smallest fan-out for which a split still leaves two non-trivial halves.
pub const MIN_FANOUT: usize = 4;

const DUMP_INDENT: &str = "     ";

// =============================================================================
// Errors
// =============================================================================

/// Construction-time contract violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Fan-out below [`MIN_FANOUT`].
    #[error("fan-out {fanout} is below the minimum of {min}")]
    FanoutTooSmall { fanout: usize, min: usize },

    /// Fan-out that cannot be cut into two equal halves.
    #[error("fan-out {fanout} must be even")]
    FanoutNotEven { fanout: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Comparison helpers
// =============================================================================

#[inline]
fn less<Q: Ord + ?Sized>(a: &Q, b: &Q) -> bool {
    a.cmp(b) == Ordering::Less
}

/// Linear scan of a leaf. `Ok(i)` if `key` is at `i`, otherwise `Err(i)` with
/// `i` the first slot holding a greater key.
#[inline]
fn search_linear<K, V, Q>(entries: &[(K, V)], key: &Q) -> std::result::Result<usize, usize>
where
    K: Borrow<Q>,
    Q: Ord + ?Sized,
{
    for (i, (k, _)) in entries.iter().enumerate() {
        match key.cmp(k.borrow()) {
            Ordering::Greater => {}
            Ordering::Equal => return Ok(i),
            Ordering::Less => return Err(i),
        }
    }
    Err(entries.len())
}

/// Picks the entry to descend through: the last one, or the first whose
/// successor's routing key is greater than `key`.
#[inline]
fn route<K, C, Q>(entries: &[(K, C)], key: &Q) -> usize
where
    K: Borrow<Q>,
    Q: Ord + ?Sized,
{
    let mut j = 0;
    while j + 1 < entries.len() && !less(key, entries[j + 1].0.borrow()) {
        j += 1;
    }
    j
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Clone)]
enum Node<K, V> {
    Leaf(Vec<(K, V)>),
    Internal(Vec<(K, Box<Node<K, V>>)>),
}

enum Insert<K, V> {
    /// Key already present; holds the displaced value.
    Replaced(V),
    Fit,
    /// Node overflowed; holds the new right sibling.
    Split(Box<Node<K, V>>),
}

impl<K, V> Node<K, V> {
    fn empty_leaf(fanout: usize) -> Self {
        Node::Leaf(Vec::with_capacity(fanout))
    }

    #[inline]
    fn len(&self) -> usize {
        match self {
            Node::Leaf(entries) => entries.len(),
            Node::Internal(entries) => entries.len(),
        }
    }

    /// Smallest key in the subtree. The node must not be empty.
    #[inline]
    fn min_key(&self) -> &K {
        match self {
            Node::Leaf(entries) => &entries[0].0,
            Node::Internal(entries) => &entries[0].0,
        }
    }

    /// Moves the upper `fanout / 2` entries into a fresh sibling.
    fn split(&mut self, fanout: usize) -> Node<K, V> {
        let half = fanout / 2;
        match self {
            Node::Leaf(entries) => {
                let mut upper = Vec::with_capacity(fanout);
                upper.extend(entries.drain(half..));
                Node::Leaf(upper)
            }
            Node::Internal(entries) => {
                let mut upper = Vec::with_capacity(fanout);
                upper.extend(entries.drain(half..));
                Node::Internal(upper)
            }
        }
    }
}

impl<K: Ord + Clone, V> Node<K, V> {
    /// Inserts into the subtree rooted here, `height` levels above the leaves.
    fn insert(&mut self, key: K, value: V, height: usize, fanout: usize) -> Insert<K, V> {
        match self {
            Node::Leaf(entries) => {
                debug_assert_eq!(height, 0, "leaf found above the leaf level");
                match search_linear(entries, &key) {
                    Ok(i) => return Insert::Replaced(mem::replace(&mut entries[i].1, value)),
                    Err(i) => entries.insert(i, (key, value)),
                }
            }
            Node::Internal(entries) => {
                debug_assert!(height > 0, "internal node at the leaf level");
                let j = route(entries, &key);
                // Only the leftmost routing key can be undercut; keep it the
                // subtree minimum.
                if less(&key, &entries[j].0) {
                    entries[j].0 = key.clone();
                }
                match entries[j].1.insert(key, value, height - 1, fanout) {
                    Insert::Split(sibling) => {
                        let routing = sibling.min_key().clone();
                        entries.insert(j + 1, (routing, sibling));
                    }
                    other => return other,
                }
            }
        }

        if self.len() < fanout {
            return Insert::Fit;
        }
        tracing::trace!(height, moved = fanout / 2, "split node");
        Insert::Split(Box::new(self.split(fanout)))
    }
}

// =============================================================================
// BTree
// =============================================================================

/// An ordered map stored in a B-tree of fixed fan-out.
///
/// Re-inserting an existing key overwrites its value in place. [`size`] counts
/// every [`put`] call, [`len`] counts distinct keys.
///
/// [`size`]: BTree::size
/// [`put`]: BTree::put
/// [`len`]: BTree::len
#[derive(Clone)]
pub struct BTree<K, V> {
    root: Node<K, V>,
    /// Internal levels above the leaves.
    height: usize,
    /// Number of `put` calls.
    size: usize,
    /// Number of leaf entries.
    len: usize,
    fanout: usize,
}

impl<K, V> BTree<K, V> {
    pub fn new() -> Self {
        Self::with_valid_fanout(DEFAULT_FANOUT)
    }

    /// Creates an empty map whose nodes split once they reach `fanout` entries.
    ///
    /// `fanout` must be even and at least [`MIN_FANOUT`].
    pub fn with_fanout(fanout: usize) -> Result<Self> {
        if fanout < MIN_FANOUT {
            return Err(Error::FanoutTooSmall {
                fanout,
                min: MIN_FANOUT,
            });
        }
        if fanout % 2 != 0 {
            return Err(Error::FanoutNotEven { fanout });
        }
        Ok(Self::with_valid_fanout(fanout))
    }

    fn with_valid_fanout(fanout: usize) -> Self {
        Self {
            root: Node::empty_leaf(fanout),
            height: 0,
            size: 0,
            len: 0,
            fanout,
        }
    }

    #[inline]
    pub fn fanout(&self) -> usize {
        self.fanout
    }

    /// Number of `put` calls made on this map, overwrites included.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of internal levels above the leaves; `0` while the root is a leaf.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of distinct keys stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Indented rendering of the tree for diagnostics.
    ///
    /// Leaf entries print as `key => value`; each internal routing key after
    /// the first in its node prints as `(key)` ahead of the subtree it leads to.
    pub fn dump(&self) -> Dump<'_, K, V> {
        Dump { tree: self }
    }
}

impl<K: Ord, V> BTree<K, V> {
    /// Returns the value stored for `key`.
    ///
    /// The key may be any borrowed form of the map's key type, but the ordering
    /// on the borrowed form must match the ordering on the key type.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = &self.root;
        loop {
            match node {
                Node::Internal(entries) => node = &*entries[route(entries, key)].1,
                Node::Leaf(entries) => {
                    return search_linear(entries, key).ok().map(|i| &entries[i].1);
                }
            }
        }
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut node = &mut self.root;
        loop {
            match node {
                Node::Internal(entries) => {
                    let j = route(entries, key);
                    node = &mut *entries[j].1;
                }
                Node::Leaf(entries) => {
                    return match search_linear(entries, key) {
                        Ok(i) => Some(&mut entries[i].1),
                        Err(_) => None,
                    };
                }
            }
        }
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }
}

impl<K: Ord + Clone, V> BTree<K, V> {
    /// Stores `value` under `key`, returning the value it replaced.
    ///
    /// [`size`](BTree::size) grows by one on every call, including overwrites.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.size += 1;
        match self.root.insert(key, value, self.height, self.fanout) {
            Insert::Replaced(old) => Some(old),
            Insert::Fit => {
                self.len += 1;
                None
            }
            Insert::Split(sibling) => {
                self.len += 1;
                self.grow(sibling);
                None
            }
        }
    }

    /// Replaces the root with a two-entry internal node over the old root and
    /// its freshly split sibling.
    fn grow(&mut self, sibling: Box<Node<K, V>>) {
        let old_root = mem::replace(&mut self.root, Node::Internal(Vec::new()));
        let mut entries = Vec::with_capacity(self.fanout);
        entries.push((old_root.min_key().clone(), Box::new(old_root)));
        entries.push((sibling.min_key().clone(), sibling));
        self.root = Node::Internal(entries);
        self.height += 1;
        tracing::debug!(height = self.height, "grew new root");
    }
}

impl<K, V> Default for BTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + Clone, V> Extend<(K, V)> for BTree<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.put(k, v);
        }
    }
}

impl<K: Ord + Clone, V> FromIterator<(K, V)> for BTree<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}

impl<'a, K, V> IntoIterator for &'a BTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// In-order iterator over a [`BTree`]'s leaf entries.
pub struct Iter<'a, K, V> {
    /// Unvisited siblings of each internal node on the current path.
    stack: Vec<std::slice::Iter<'a, (K, Box<Node<K, V>>)>>,
    leaf: std::slice::Iter<'a, (K, V)>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn new(tree: &'a BTree<K, V>) -> Self {
        let mut iter = Self {
            stack: Vec::with_capacity(tree.height),
            leaf: <&[(K, V)]>::default().iter(),
            remaining: tree.len,
        };
        iter.descend(&tree.root);
        iter
    }

    fn descend(&mut self, mut node: &'a Node<K, V>) {
        loop {
            match node {
                Node::Leaf(entries) => {
                    self.leaf = entries.iter();
                    return;
                }
                Node::Internal(entries) => {
                    let mut children = entries.iter();
                    match children.next() {
                        Some((_, child)) => {
                            self.stack.push(children);
                            node = &**child;
                        }
                        None => return,
                    }
                }
            }
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((k, v)) = self.leaf.next() {
                self.remaining -= 1;
                return Some((k, v));
            }
            let child = loop {
                let siblings = self.stack.last_mut()?;
                match siblings.next() {
                    Some((_, child)) => break &**child,
                    None => {
                        self.stack.pop();
                    }
                }
            };
            self.descend(child);
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

// =============================================================================
// Diagnostics
// =============================================================================

/// Display adapter returned by [`BTree::dump`].
pub struct Dump<'a, K, V> {
    tree: &'a BTree<K, V>,
}

impl<K: fmt::Display, V: fmt::Display> fmt::Display for Dump<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, &self.tree.root, "")
    }
}

fn write_node<K: fmt::Display, V: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    node: &Node<K, V>,
    indent: &str,
) -> fmt::Result {
    match node {
        Node::Leaf(entries) => {
            for (k, v) in entries {
                writeln!(f, "{indent}{k} => {v}")?;
            }
        }
        Node::Internal(entries) => {
            let deeper = format!("{indent}{DUMP_INDENT}");
            for (j, (k, child)) in entries.iter().enumerate() {
                if j > 0 {
                    writeln!(f, "{indent}({k})")?;
                }
                write_node(f, child, &deeper)?;
            }
        }
    }
    Ok(())
}


#[cfg(test)]
mod proptests;
