// Array property tests against a Vec model.
use proptest::prelude::*;
use rc_collections::{Array, CallbackSet, CollectionError};

#[derive(Clone, Debug)]
enum Op {
    Append(i16),
    PushFront(i16),
    PopFront,
    PopBack,
    Insert(usize, i16),
    Remove(usize),
    Set(usize, i16),
    Replace(usize, usize, Vec<i16>),
    Exchange(usize, usize),
    Sort(usize, usize),
    Clear,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<i16>().prop_map(Op::Append),
        4 => any::<i16>().prop_map(Op::PushFront),
        2 => Just(Op::PopFront),
        2 => Just(Op::PopBack),
        2 => (any::<usize>(), any::<i16>()).prop_map(|(i, v)| Op::Insert(i, v)),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => (any::<usize>(), any::<i16>()).prop_map(|(i, v)| Op::Set(i, v)),
        2 => (any::<usize>(), any::<usize>(), proptest::collection::vec(any::<i16>(), 0..24))
            .prop_map(|(a, b, vs)| Op::Replace(a, b, vs)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Exchange(a, b)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Sort(a, b)),
        1 => Just(Op::Clear),
    ]
}

// Map two arbitrary numbers onto an ordered range within 0..=len.
fn range_in(a: usize, b: usize, len: usize) -> core::ops::Range<usize> {
    let (x, y) = (a % (len + 1), b % (len + 1));
    x.min(y)..x.max(y)
}

// Property: state-machine equivalence against Vec.
// - contents match the model after every op, in order.
// - the run stays inside the block: head + len <= capacity.
// - pops return the model's ends and empty pops return None.
// - out-of-bounds indices fail and change nothing.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_array_matches_vec(ops in proptest::collection::vec(arb_op(), 1..150)) {
        let mut sut: Array<i16> = Array::new();
        let mut model: Vec<i16> = Vec::new();
        for op in ops {
            let len = model.len();
            match op {
                Op::Append(v) => {
                    sut.append(&v).unwrap();
                    model.push(v);
                }
                Op::PushFront(v) => {
                    sut.push_front(&v).unwrap();
                    model.insert(0, v);
                }
                Op::PopFront => {
                    let expected = if model.is_empty() { None } else { Some(model.remove(0)) };
                    prop_assert_eq!(sut.pop_front().unwrap(), expected);
                }
                Op::PopBack => {
                    prop_assert_eq!(sut.pop_back().unwrap(), model.pop());
                }
                Op::Insert(i, v) => {
                    let i = i % (len + 1);
                    sut.insert_at_index(i, &v).unwrap();
                    model.insert(i, v);
                }
                Op::Remove(i) => {
                    if len == 0 {
                        prop_assert_eq!(
                            sut.remove_at_index(0),
                            Err(CollectionError::IndexOutOfBounds { index: 0, len: 0 })
                        );
                    } else {
                        let i = i % len;
                        sut.remove_at_index(i).unwrap();
                        model.remove(i);
                    }
                }
                Op::Set(i, v) => {
                    let i = i % (len + 1);
                    sut.set_value_at_index(i, &v).unwrap();
                    if i == len {
                        model.push(v);
                    } else {
                        model[i] = v;
                    }
                }
                Op::Replace(a, b, vs) => {
                    let r = range_in(a, b, len);
                    sut.replace_values_in_range(r.clone(), &vs).unwrap();
                    model.splice(r, vs);
                }
                Op::Exchange(a, b) => {
                    if len > 0 {
                        let (a, b) = (a % len, b % len);
                        sut.exchange_values(a, b).unwrap();
                        model.swap(a, b);
                    }
                }
                Op::Sort(a, b) => {
                    let r = range_in(a, b, len);
                    sut.sort_values(r.clone(), |x, y| x.cmp(y)).unwrap();
                    model[r].sort_unstable();
                }
                Op::Clear => {
                    sut.clear().unwrap();
                    model.clear();
                    prop_assert_eq!(sut.capacity(), 0);
                }
            }
            prop_assert_eq!(sut.as_slice(), model.as_slice());
            prop_assert!(sut.head() + sut.len() <= sut.capacity());
            let bad = sut.len() + 1;
            prop_assert!(sut.get_value_at_index(bad).is_none());
        }
    }
}

thread_local! {
    static BALANCE: core::cell::Cell<isize> = const { core::cell::Cell::new(0) };
}

fn up(v: &u32) -> u32 {
    BALANCE.with(|b| b.set(b.get() + 1));
    *v
}

fn down(_: u32) {
    BALANCE.with(|b| b.set(b.get() - 1));
}

// Property: every retain is matched by exactly one release once the array
// and all popped values are gone.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_retains_balance_releases(ops in proptest::collection::vec(arb_op(), 1..100)) {
        let start = BALANCE.with(|b| b.get());
        let cb = CallbackSet { retain: Some(up), release: Some(down), ..CallbackSet::empty() };
        {
            let mut sut: Array<u32, CallbackSet<u32>> = Array::with_allocator(None, 0, cb);
            for op in ops {
                let len = sut.len();
                match op {
                    Op::Append(v) => sut.append(&(v as u32)).unwrap(),
                    Op::PushFront(v) => sut.push_front(&(v as u32)).unwrap(),
                    Op::PopFront => {
                        if let Some(v) = sut.pop_front().unwrap() {
                            down(v);
                        }
                    }
                    Op::PopBack => {
                        if let Some(v) = sut.pop_back().unwrap() {
                            down(v);
                        }
                    }
                    Op::Insert(i, v) => sut.insert_at_index(i % (len + 1), &(v as u32)).unwrap(),
                    Op::Remove(i) => {
                        if len > 0 {
                            sut.remove_at_index(i % len).unwrap();
                        }
                    }
                    Op::Set(i, v) => sut.set_value_at_index(i % (len + 1), &(v as u32)).unwrap(),
                    Op::Replace(a, b, vs) => {
                        let vs: Vec<u32> = vs.into_iter().map(|v| v as u32).collect();
                        sut.replace_values_in_range(range_in(a, b, len), &vs).unwrap();
                    }
                    Op::Exchange(..) | Op::Sort(..) => {}
                    Op::Clear => sut.clear().unwrap(),
                }
            }
        }
        prop_assert_eq!(BALANCE.with(|b| b.get()), start);
    }
}
