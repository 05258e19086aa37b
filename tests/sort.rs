// Sort and binary-search properties against std.
use proptest::prelude::*;
use rc_collections::sort::{bsearch_bytes, bsearch_slice_by, sort_bytes, sort_indexed, sort_slice_by, SortAccess};
use std::cmp::Ordering;

// Counts comparisons so the equal-key path can be checked for linear cost.
struct Counted<'a> {
    data: &'a mut [u32],
    compares: usize,
}

impl SortAccess for Counted<'_> {
    fn compare(&mut self, a: usize, b: usize) -> Ordering {
        self.compares += 1;
        self.data[a].cmp(&self.data[b])
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
    }
}

// Test: all-equal input.
// Verifies: three-way partitioning keeps comparisons linear.
#[test]
fn equal_keys_sort_in_linear_comparisons() {
    let mut data = vec![9u32; 10_000];
    let mut access = Counted { data: &mut data, compares: 0 };
    sort_indexed(&mut access, 0, 10_000);
    assert!(access.compares < 4 * 10_000, "{} compares", access.compares);
    assert!(data.iter().all(|&v| v == 9));
}

// Test: reversed input through a sub-range.
// Verifies: only the addressed window is reordered.
#[test]
fn indexed_sort_touches_only_window() {
    let mut data: Vec<u32> = (0..200).rev().collect();
    let mut access = Counted { data: &mut data, compares: 0 };
    sort_indexed(&mut access, 50, 100);
    assert_eq!(data[..50], (150..200).rev().collect::<Vec<u32>>()[..]);
    assert_eq!(data[50..150], (50..150).collect::<Vec<u32>>()[..]);
    assert_eq!(data[150..], (0..50).rev().collect::<Vec<u32>>()[..]);
}

// Test: search miss positions.
// Verifies: Err carries the insertion point at the start, middle and end.
#[test]
fn bsearch_reports_insertion_points() {
    let v = [10, 20, 20, 20, 30];
    let cmp = |a: &i32, b: &i32| a.cmp(b);
    assert_eq!(bsearch_slice_by(&v, &20, cmp), Ok(1));
    assert_eq!(bsearch_slice_by(&v, &5, cmp), Err(0));
    assert_eq!(bsearch_slice_by(&v, &25, cmp), Err(4));
    assert_eq!(bsearch_slice_by(&v, &31, cmp), Err(5));
    assert_eq!(bsearch_slice_by(&[], &1, cmp), Err(0));
}

fn be_cmp(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

// Property: slice sort agrees with std's sort for every comparator order.
// - ascending and descending comparators both produce the std result.
// - binary search on the sorted output finds the first occurrence.
proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]
    #[test]
    fn prop_slice_sort_matches_std(mut v in proptest::collection::vec(-50i32..50, 0..300), probe in -60i32..60) {
        let mut expected = v.clone();
        expected.sort();
        sort_slice_by(&mut v, |a, b| a.cmp(b));
        prop_assert_eq!(&v, &expected);

        let found = bsearch_slice_by(&v, &probe, |a, b| a.cmp(b));
        let first = expected.partition_point(|x| *x < probe);
        if expected.get(first) == Some(&probe) {
            prop_assert_eq!(found, Ok(first));
        } else {
            prop_assert_eq!(found, Err(first));
        }

        let mut desc = expected.clone();
        sort_slice_by(&mut desc, |a, b| b.cmp(a));
        expected.reverse();
        prop_assert_eq!(desc, expected);
    }
}

// Property: fixed-width byte sort agrees with sorting the chunks.
// - widths 1..=7 all sort whole elements as units.
// - bsearch_bytes finds each element of the sorted buffer.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_byte_sort_matches_chunks(width in 1usize..=7, raw in proptest::collection::vec(0u8..4, 0..280)) {
        let whole = raw.len() / width * width;
        let mut data = raw[..whole].to_vec();
        let mut chunks: Vec<Vec<u8>> = data.chunks(width).map(|c| c.to_vec()).collect();
        chunks.sort();
        sort_bytes(&mut data, width, be_cmp);
        prop_assert_eq!(data.clone(), chunks.concat());
        for (i, c) in chunks.iter().enumerate() {
            let at = bsearch_bytes(&data, width, c, be_cmp);
            prop_assert!(at.is_ok());
            let j = at.unwrap_or(usize::MAX);
            prop_assert!(j <= i);
            prop_assert_eq!(&data[j * width..(j + 1) * width], c.as_slice());
        }
    }
}
