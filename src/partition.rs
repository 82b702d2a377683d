//! Assignment of the index range `[0, n)` to `w` workers.
//!
//! Two shapes are provided:
//!
//! - **Contiguous block** ([`compute_block`], [`blocks`]): worker `k` owns one
//!   range `[first, last)`. Ranges are ordered by worker id and tile `[0, n)`
//!   exactly. The first `n % w` workers receive one extra item, so block sizes
//!   differ by at most one.
//! - **Strided** ([`Strided`]): worker `k` owns `{k, k + w, k + 2w, ...}`.
//!
//! In both shapes the subsets of all workers are pairwise disjoint and their
//! union is `[0, n)`. When `w > n` some workers receive nothing.
//!
//! Callers pass `worker < w` and `w >= 1`; neither is checked here.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// The contiguous index range owned by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub first: usize,
    pub last: usize,
}

impl Block {
    pub fn len(&self) -> usize {
        self.last - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }

    pub fn range(&self) -> Range<usize> {
        self.first..self.last
    }
}

/// Contiguous block of `worker` when `n` items are split across `workers`.
///
/// ```text
/// div  = n / w
/// rem  = n % w
/// size = div + 1   if worker < rem
///        div       otherwise
/// first = worker * div + min(worker, rem)
/// last  = first + size
/// ```
#[inline]
pub fn compute_block(worker: usize, n: usize, workers: usize) -> Block {
    let div = n / workers;
    let rem = n % workers;

    let size = if worker < rem { div + 1 } else { div };
    let first = worker * div + worker.min(rem);

    Block {
        first,
        last: first + size,
    }
}

/// All `workers` blocks for `n` items, in worker order.
pub fn blocks(n: usize, workers: usize) -> impl ExactSizeIterator<Item = Block> {
    (0..workers).map(move |worker| compute_block(worker, n, workers))
}

/// Indices owned by one worker under the strided shape.
#[derive(Clone, Debug)]
pub struct Strided {
    next: usize,
    n: usize,
    stride: usize,
}

impl Strided {
    pub fn new(worker: usize, n: usize, workers: usize) -> Self {
        Self {
            next: worker,
            n,
            stride: workers,
        }
    }
}

impl Iterator for Strided {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.next >= self.n {
            return None;
        }
        let i = self.next;
        // saturate so the final step cannot wrap past usize::MAX
        self.next = self.next.saturating_add(self.stride);
        Some(i)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next >= self.n {
            0
        } else {
            (self.n - self.next).div_ceil(self.stride)
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Strided {}
