//! Quicksort and binary search over three kinds of storage.
//!
//! The engine only ever compares and swaps by index, so one implementation
//! serves fixed-width raw byte elements ([`sort_bytes`]), ordinary slices
//! ([`sort_slice_by`]) and anything that can expose index-addressed access
//! ([`sort_indexed`], used by `Array::sort_values`).
//!
//! Partitioning is Bentley–McIlroy three-way: keys equal to the pivot are
//! parked at both ends and swapped into the middle afterwards, so runs of
//! equal keys cost linear time. Inputs under 7 elements use insertion sort;
//! the pivot is a median of 3, or a pseudomedian of 9 above 40 elements. The
//! smaller partition recurses and the larger one loops, bounding the stack at
//! O(log n). The sort is not stable.

use core::cmp::Ordering;

const INSERTION_CUTOFF: usize = 7;
const NINTHER_CUTOFF: usize = 40;

/// Index-addressed compare/swap over a sequence.
pub trait SortAccess {
    fn compare(&mut self, a: usize, b: usize) -> Ordering;

    fn swap(&mut self, a: usize, b: usize);

    /// Swap the non-overlapping runs `[a, a+n)` and `[b, b+n)`.
    fn swap_run(&mut self, a: usize, b: usize, n: usize) {
        for k in 0..n {
            self.swap(a + k, b + k);
        }
    }
}

/// Sort the `len` elements starting at `start`.
pub fn sort_indexed<A: SortAccess + ?Sized>(access: &mut A, start: usize, len: usize) {
    quicksort(access, start, len)
}

fn med3<A: SortAccess + ?Sized>(s: &mut A, a: usize, b: usize, c: usize) -> usize {
    if s.compare(a, b) == Ordering::Less {
        if s.compare(b, c) == Ordering::Less {
            b
        } else if s.compare(a, c) == Ordering::Less {
            c
        } else {
            a
        }
    } else if s.compare(b, c) == Ordering::Greater {
        b
    } else if s.compare(a, c) == Ordering::Less {
        a
    } else {
        c
    }
}

fn insertion_sort<A: SortAccess + ?Sized>(s: &mut A, lo: usize, n: usize) {
    for m in lo + 1..lo + n {
        let mut l = m;
        while l > lo && s.compare(l - 1, l) == Ordering::Greater {
            s.swap(l, l - 1);
            l -= 1;
        }
    }
}

fn quicksort<A: SortAccess + ?Sized>(s: &mut A, mut lo: usize, mut n: usize) {
    loop {
        if n < INSERTION_CUTOFF {
            insertion_sort(s, lo, n);
            return;
        }

        let mut pm = lo + n / 2;
        if n > INSERTION_CUTOFF {
            let mut pl = lo;
            let mut pn = lo + n - 1;
            if n > NINTHER_CUTOFF {
                let d = n / 8;
                pl = med3(s, pl, pl + d, pl + 2 * d);
                pm = med3(s, pm - d, pm, pm + d);
                pn = med3(s, pn - 2 * d, pn - d, pn);
            }
            pm = med3(s, pl, pm, pn);
        }
        s.swap(lo, pm);

        // [lo, pa): equal to pivot; [pa, pb): less; (pc, pd]: greater;
        // (pd, end): equal.
        let mut pa = lo + 1;
        let mut pb = pa;
        let mut pc = lo + n - 1;
        let mut pd = pc;
        loop {
            while pb <= pc {
                match s.compare(pb, lo) {
                    Ordering::Greater => break,
                    Ordering::Equal => {
                        s.swap(pa, pb);
                        pa += 1;
                    }
                    Ordering::Less => {}
                }
                pb += 1;
            }
            while pb <= pc {
                match s.compare(pc, lo) {
                    Ordering::Less => break,
                    Ordering::Equal => {
                        s.swap(pc, pd);
                        pd -= 1;
                    }
                    Ordering::Greater => {}
                }
                pc -= 1;
            }
            if pb > pc {
                break;
            }
            s.swap(pb, pc);
            pb += 1;
            pc -= 1;
        }

        let end = lo + n;
        let r = (pa - lo).min(pb - pa);
        s.swap_run(lo, pb - r, r);
        let r = (pd - pc).min(end - pd - 1);
        s.swap_run(pb, end - r, r);

        let left = pb - pa;
        let right = pd - pc;
        // Recurse into the smaller side, loop on the larger one.
        if left <= right {
            if left > 1 {
                quicksort(s, lo, left);
            }
            if right <= 1 {
                return;
            }
            lo = end - right;
            n = right;
        } else {
            if right > 1 {
                quicksort(s, end - right, right);
            }
            n = left;
        }
    }
}

struct SliceAccess<'a, T, F> {
    data: &'a mut [T],
    cmp: F,
}

impl<T, F: FnMut(&T, &T) -> Ordering> SortAccess for SliceAccess<'_, T, F> {
    fn compare(&mut self, a: usize, b: usize) -> Ordering {
        (self.cmp)(&self.data[a], &self.data[b])
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b)
    }
}

/// Sort a slice of elements (or pointers) with `cmp`.
pub fn sort_slice_by<T, F>(data: &mut [T], cmp: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    let len = data.len();
    let mut access = SliceAccess { data, cmp };
    quicksort(&mut access, 0, len);
}

struct ByteAccess<'a, F> {
    data: &'a mut [u8],
    width: usize,
    cmp: F,
}

impl<F> ByteAccess<'_, F> {
    /// Swap the byte blocks of `n` elements at `a` and `b`, `a < b`, not
    /// overlapping.
    fn swap_blocks(&mut self, a: usize, b: usize, n: usize) {
        let w = self.width;
        let (head, tail) = self.data.split_at_mut(b * w);
        head[a * w..(a + n) * w].swap_with_slice(&mut tail[..n * w]);
    }
}

impl<F: FnMut(&[u8], &[u8]) -> Ordering> SortAccess for ByteAccess<'_, F> {
    fn compare(&mut self, a: usize, b: usize) -> Ordering {
        let w = self.width;
        let (x, y) = (&self.data[a * w..(a + 1) * w], &self.data[b * w..(b + 1) * w]);
        (self.cmp)(x, y)
    }

    fn swap(&mut self, a: usize, b: usize) {
        match a.cmp(&b) {
            Ordering::Less => self.swap_blocks(a, b, 1),
            Ordering::Greater => self.swap_blocks(b, a, 1),
            Ordering::Equal => {}
        }
    }

    fn swap_run(&mut self, a: usize, b: usize, n: usize) {
        if n == 0 || a == b {
            return;
        }
        if a < b {
            self.swap_blocks(a, b, n)
        } else {
            self.swap_blocks(b, a, n)
        }
    }
}

/// Sort `data` as consecutive `width`-byte elements.
///
/// A trailing partial element is reported and left where it is; a zero
/// width sorts nothing.
pub fn sort_bytes<F>(data: &mut [u8], width: usize, cmp: F)
where
    F: FnMut(&[u8], &[u8]) -> Ordering,
{
    if width == 0 {
        return;
    }
    crate::rc_assert!(
        data.len() % width == 0,
        "sort_bytes: {} bytes is not a multiple of width {}",
        data.len(),
        width
    );
    let len = data.len() / width;
    let mut access = ByteAccess { data, width, cmp };
    quicksort(&mut access, 0, len);
}

/// Binary search over `len` sorted positions. `probe(i)` orders element `i`
/// against the target.
///
/// `Ok` carries the first matching index; `Err` the index at which the
/// target would be inserted to keep the order.
pub fn bsearch_indexed<F>(len: usize, mut probe: F) -> Result<usize, usize>
where
    F: FnMut(usize) -> Ordering,
{
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if probe(mid) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo < len && probe(lo) == Ordering::Equal {
        Ok(lo)
    } else {
        Err(lo)
    }
}

/// Binary search a sorted slice; `cmp(element, key)`.
pub fn bsearch_slice_by<T, F>(data: &[T], key: &T, mut cmp: F) -> Result<usize, usize>
where
    F: FnMut(&T, &T) -> Ordering,
{
    bsearch_indexed(data.len(), |i| cmp(&data[i], key))
}

/// Binary search sorted `width`-byte elements; `cmp(element, key)`.
pub fn bsearch_bytes<F>(data: &[u8], width: usize, key: &[u8], mut cmp: F) -> Result<usize, usize>
where
    F: FnMut(&[u8], &[u8]) -> Ordering,
{
    if width == 0 {
        return Err(0);
    }
    let len = data.len() / width;
    bsearch_indexed(len, |i| cmp(&data[i * width..(i + 1) * width], key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg(seed: &mut u64) -> u64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *seed >> 33
    }

    fn assert_sorts(mut v: Vec<i64>) {
        let mut expected = v.clone();
        expected.sort();
        sort_slice_by(&mut v, |a, b| a.cmp(b));
        assert_eq!(v, expected);
    }

    /// Invariant: output is the sorted permutation of the input for every
    /// size class (insertion, median-of-3, ninther).
    #[test]
    fn sorts_every_size_class() {
        let mut seed = 7;
        for n in [0, 1, 2, 6, 7, 8, 40, 41, 100, 1000] {
            let v: Vec<i64> = (0..n).map(|_| (lcg(&mut seed) % 50) as i64).collect();
            assert_sorts(v);
        }
    }

    #[test]
    fn sorts_adversarial_shapes() {
        assert_sorts(vec![3; 500]);
        assert_sorts((0..500).rev().collect());
        assert_sorts((0..500).collect());
        assert_sorts((0..500).map(|i| i % 2).collect());
        // organ pipe
        assert_sorts((0..250).chain((0..250).rev()).collect());
    }

    #[test]
    fn sorts_fixed_width_bytes() {
        let mut data: Vec<u8> = [300u32, 7, 65_536, 1, 7]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        sort_bytes(&mut data, 4, |a, b| a.cmp(b));
        let out: Vec<u32> = data
            .chunks(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(out, vec![1, 7, 7, 300, 65_536]);
    }

    #[test]
    fn bytes_sort_ignores_partial_tail() {
        let mut data = vec![9u8, 8, 1, 2, 0xff];
        sort_bytes(&mut data, 2, |a, b| a.cmp(b));
        assert_eq!(data, vec![1, 2, 9, 8, 0xff]);
    }

    /// Invariant: found returns the first match, not found returns the
    /// insertion point.
    #[test]
    fn bsearch_first_match_or_insertion_point() {
        let v = [1, 3, 3, 3, 7, 9];
        assert_eq!(bsearch_slice_by(&v, &3, |a, b| a.cmp(b)), Ok(1));
        assert_eq!(bsearch_slice_by(&v, &1, |a, b| a.cmp(b)), Ok(0));
        assert_eq!(bsearch_slice_by(&v, &0, |a, b| a.cmp(b)), Err(0));
        assert_eq!(bsearch_slice_by(&v, &4, |a, b| a.cmp(b)), Err(4));
        assert_eq!(bsearch_slice_by(&v, &10, |a, b| a.cmp(b)), Err(6));
        assert_eq!(bsearch_slice_by::<i32, _>(&[], &1, |a, b| a.cmp(b)), Err(0));

        let bytes = [1u8, 4, 4, 8];
        assert_eq!(bsearch_bytes(&bytes, 1, &[4], |a, b| a.cmp(b)), Ok(1));
        assert_eq!(bsearch_bytes(&bytes, 1, &[5], |a, b| a.cmp(b)), Err(3));
    }
}
