#![cfg(test)]

// Property tests for the hashed containers kept inside the crate so they can
// use the crate-private test allocator.

use crate::alloc::testing::CountingAllocator;
use crate::alloc::AllocatorRef;
use crate::bag::Bag;
use crate::callbacks::CallbackSet;
use crate::dictionary::Dictionary;
use crate::hash_table::BatchCursor;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

// Pool-indexed operations: indices shrink to earlier keys and op lists
// shrink in length.
#[derive(Clone, Debug)]
enum OpI {
    Add(usize, i32),
    Set(usize, i32),
    Replace(usize, i32),
    Remove(usize),
    Get(usize),
    Clear,
    Batch(usize),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,4}", 1..=12).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Add(i, v)),
            3 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Set(i, v)),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Replace(i, v)),
            3 => idx.clone().prop_map(OpI::Remove),
            2 => idx.clone().prop_map(OpI::Get),
            1 => (1usize..5).prop_map(OpI::Batch),
            1 => Just(OpI::Clear),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Few hash values force long probe runs and tombstone reuse.
fn short_hash(s: &String) -> u32 {
    s.len() as u32
}

fn keys() -> CallbackSet<String> {
    CallbackSet {
        hash: Some(short_hash),
        ..CallbackSet::empty()
    }
}

fn check_geometry(capacity: usize, len: usize) -> Result<(), TestCaseError> {
    if capacity > 0 {
        prop_assert!(capacity.is_power_of_two());
        prop_assert!(len <= capacity * 3 / 4, "len {} over threshold of {}", len, capacity);
    }
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// - add keeps the first value, set overwrites, replace touches only present keys.
// - remove/get/contains parity with the model after every op.
// - capacity stays a power of two with len under three quarters of it.
// - a full batch walk yields each live key exactly once.
// - every storage block goes back to the allocator on drop.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_dictionary_state_machine((pool, ops) in arb_scenario()) {
        let alloc = CountingAllocator::new();
        {
            let mut sut: Dictionary<String, i32, CallbackSet<String>, CallbackSet<i32>> =
                Dictionary::with_allocator(Some(alloc.clone() as AllocatorRef), 0, keys(), CallbackSet::empty());
            let mut model: HashMap<String, i32> = HashMap::new();

            for op in ops {
                match op {
                    OpI::Add(i, v) => {
                        sut.add_value(&pool[i], &v).unwrap();
                        model.entry(pool[i].clone()).or_insert(v);
                    }
                    OpI::Set(i, v) => {
                        sut.set_value(&pool[i], &v).unwrap();
                        model.insert(pool[i].clone(), v);
                    }
                    OpI::Replace(i, v) => {
                        sut.replace_value(&pool[i], &v).unwrap();
                        if let Some(slot) = model.get_mut(&pool[i]) {
                            *slot = v;
                        }
                    }
                    OpI::Remove(i) => {
                        sut.remove_value(&pool[i]).unwrap();
                        model.remove(&pool[i]);
                    }
                    OpI::Get(i) => {
                        prop_assert_eq!(sut.get_value(&pool[i]), model.get(&pool[i]));
                        prop_assert_eq!(sut.contains_key(&pool[i]), model.contains_key(&pool[i]));
                    }
                    OpI::Clear => {
                        sut.clear().unwrap();
                        model.clear();
                        prop_assert_eq!(sut.capacity(), 0);
                    }
                    OpI::Batch(n) => {
                        let mut cur = BatchCursor::new();
                        let mut seen = BTreeSet::new();
                        loop {
                            let batch = sut.next_batch(&mut cur, n);
                            if batch.is_empty() {
                                break;
                            }
                            prop_assert!(batch.len() <= n);
                            for (k, _) in batch {
                                prop_assert!(seen.insert(k.clone()), "key yielded twice");
                            }
                        }
                        let expected: BTreeSet<String> = model.keys().cloned().collect();
                        prop_assert_eq!(seen, expected);
                    }
                }
                prop_assert_eq!(sut.len(), model.len());
                check_geometry(sut.capacity(), sut.len())?;
            }

            for (k, v) in &model {
                prop_assert_eq!(sut.get_value(k), Some(v));
            }
        }
        prop_assert_eq!(alloc.live(), 0);
    }
}

#[derive(Clone, Debug)]
enum BagOp {
    Add(usize),
    Remove(usize),
    Count(usize),
}

fn arb_bag_ops() -> impl Strategy<Value = Vec<BagOp>> {
    let op = prop_oneof![
        3 => (0usize..10).prop_map(BagOp::Add),
        2 => (0usize..10).prop_map(BagOp::Remove),
        1 => (0usize..10).prop_map(BagOp::Count),
    ];
    proptest::collection::vec(op, 1..120)
}

// Property: Bag equivalence against a HashMap of occurrence counts.
// - count_of_value equals the model count; contains_value iff count > 0.
// - len is the total number of occurrences, distinct_len the number of keys.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_bag_counts(ops in arb_bag_ops()) {
        let mut sut: Bag<usize> = Bag::new();
        let mut model: HashMap<usize, usize> = HashMap::new();
        for op in ops {
            match op {
                BagOp::Add(v) => {
                    sut.add_value(&v).unwrap();
                    *model.entry(v).or_default() += 1;
                }
                BagOp::Remove(v) => {
                    sut.remove_value(&v).unwrap();
                    if let Some(n) = model.get_mut(&v) {
                        *n -= 1;
                        if *n == 0 {
                            model.remove(&v);
                        }
                    }
                }
                BagOp::Count(v) => {
                    let n = model.get(&v).copied().unwrap_or(0);
                    prop_assert_eq!(sut.count_of_value(&v), n);
                    prop_assert_eq!(sut.contains_value(&v), n > 0);
                }
            }
            prop_assert_eq!(sut.len(), model.values().sum::<usize>());
            prop_assert_eq!(sut.distinct_len(), model.len());
            check_geometry(sut.capacity(), sut.distinct_len())?;
        }
    }
}
