use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

/// Walks the whole tree and checks every structural invariant: equal leaf
/// depth, occupancy bounds, strictly ascending keys, routing keys equal to
/// subtree minimums, and the cached entry count.
pub(crate) fn validate_tree<K: Ord + fmt::Debug, V>(t: &BTree<K, V>) {
    fn walk<'a, K: Ord + fmt::Debug, V>(
        t: &BTree<K, V>,
        node: &'a Node<K, V>,
        depth: usize,
        keys: &mut Vec<&'a K>,
    ) {
        let n = node.len();
        let is_root = depth == 0;
        assert!(n < t.fanout, "node at depth {depth} holds {n} entries");
        if !is_root {
            assert!(
                n >= t.fanout / 2,
                "non-root node at depth {depth} holds only {n} entries"
            );
        }

        match node {
            Node::Leaf(entries) => {
                assert_eq!(depth, t.height, "leaf at depth {depth}");
                keys.extend(entries.iter().map(|(k, _)| k));
            }
            Node::Internal(entries) => {
                assert!(depth < t.height, "internal node at leaf depth");
                assert!(n >= 2 || !is_root, "internal root with {n} entries");
                for pair in entries.windows(2) {
                    assert!(pair[0].0 < pair[1].0, "routing keys out of order");
                }
                for (routing, child) in entries {
                    assert_eq!(
                        routing,
                        child.min_key(),
                        "routing key is not the subtree minimum"
                    );
                    walk(t, child, depth + 1, keys);
                }
            }
        }
    }

    let mut keys = Vec::new();
    walk(t, &t.root, 0, &mut keys);
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1], "leaf keys out of order: {:?}", pair);
    }
    assert_eq!(keys.len(), t.len, "leaf entry count must match BTree::len");
    assert_eq!(t.iter().count(), t.len);
}

#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 3)]
    Put(#[proptest(strategy = "0u16..512")] u16, u32),
    Get(#[proptest(strategy = "0u16..512")] u16),
}

fn fanout_strategy() -> impl Strategy<Value = usize> {
    prop::sample::select(vec![4usize, 6, 8, 16])
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence(
        fanout in fanout_strategy(),
        ops in prop::collection::vec(any::<Op>(), 0..=1000),
    ) {
        let mut t: BTree<u16, u32> = BTree::with_fanout(fanout).unwrap();
        let mut m: BTreeMap<u16, u32> = BTreeMap::new();
        let mut puts = 0usize;
        let mut last_height = 0usize;

        for op in ops {
            match op {
                Op::Put(key, value) => {
                    puts += 1;
                    prop_assert_eq!(t.put(key, value), m.insert(key, value));
                    prop_assert!(t.height() >= last_height);
                    last_height = t.height();
                }
                Op::Get(key) => {
                    let height = t.height();
                    prop_assert_eq!(t.get(&key), m.get(&key));
                    prop_assert_eq!(t.height(), height);
                }
            }

            prop_assert_eq!(t.len(), m.len());
            prop_assert_eq!(t.size(), puts);
        }

        validate_tree(&t);
        let got: Vec<(u16, u32)> = t.iter().map(|(k, v)| (*k, *v)).collect();
        let expected: Vec<(u16, u32)> = m.into_iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_unique_keys_all_retrievable(
        keys in prop::collection::btree_set(any::<i64>(), 0..=600)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
            .prop_shuffle(),
    ) {
        let mut t: BTree<i64, usize> = BTree::new();
        for (i, &k) in keys.iter().enumerate() {
            prop_assert_eq!(t.put(k, i), None);
        }
        for (i, k) in keys.iter().enumerate() {
            prop_assert_eq!(t.get(k), Some(&i));
        }
        prop_assert_eq!(t.size(), keys.len());
        validate_tree(&t);
    }

    #[test]
    fn prop_absent_keys(
        present in prop::collection::vec(0u32..1000, 0..200),
        probe in 1000u32..2000,
    ) {
        let t: BTree<u32, ()> = present.into_iter().map(|k| (k, ())).collect();
        prop_assert_eq!(t.get(&probe), None);
        prop_assert!(!t.contains_key(&probe));
    }
}

/// Calls `f` once per ordering of `items` (Heap's algorithm, iterative form).
fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    let mut order = items.to_vec();
    let mut counters = vec![0usize; order.len()];
    f(order.clone());

    let mut i = 1;
    while i < order.len() {
        if counters[i] < i {
            let swap_with = if i % 2 == 0 { 0 } else { counters[i] };
            order.swap(swap_with, i);
            f(order.clone());
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
}

#[test]
fn permutations_are_complete_and_distinct() {
    let mut seen = std::collections::BTreeSet::new();
    for_each_permutation(&[1u8, 2, 3, 4], |perm| {
        assert!(seen.insert(perm), "permutation visited twice");
    });
    assert_eq!(seen.len(), 24);

    let mut calls = 0;
    for_each_permutation::<u8>(&[], |perm| {
        assert!(perm.is_empty());
        calls += 1;
    });
    assert_eq!(calls, 1);
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = ["apple", "artichoke", "broccoli", "carrot", "cucumber", "orange", "pear"];

    for_each_permutation(&keys, |perm| {
        let mut t: BTree<&str, usize> = BTree::new();
        let mut m: BTreeMap<&str, usize> = BTreeMap::new();

        for (i, k) in perm.into_iter().enumerate() {
            assert_eq!(t.put(k, i), m.insert(k, i));
        }

        validate_tree(&t);
        assert_eq!(t.height(), 1);
        let got: Vec<(&str, usize)> = t.iter().map(|(k, v)| (*k, *v)).collect();
        let expected: Vec<(&str, usize)> = m.into_iter().collect();
        assert_eq!(got, expected);
    });
}

#[test]
fn exhaustive_reinsert_order_small_set() {
    let keys = [1u8, 2, 3, 4, 5, 6];

    let mut base: BTree<u8, u32> = BTree::new();
    for &k in &keys {
        base.put(k, 0);
    }

    for_each_permutation(&keys, |perm| {
        let mut t = base.clone();
        for (i, k) in perm.into_iter().enumerate() {
            assert_eq!(t.put(k, i as u32 + 1), Some(0));
            assert_eq!(t.get(&k), Some(&(i as u32 + 1)));
        }
        assert_eq!(t.len(), keys.len());
        assert_eq!(t.size(), keys.len() * 2);
        assert_eq!(t.height(), base.height());
        validate_tree(&t);
        // Overwrites never restructure.
        let mut expected = base.clone();
        for (k, v) in t.iter() {
            if let Some(slot) = expected.get_mut(k) {
                *slot = *v;
            }
        }
        assert_eq!(t.dump().to_string(), expected.dump().to_string());
    });
}
