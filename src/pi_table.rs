// Segmented prime-count lookup table. Answers pi(n) in O(1) for any n in
// the current window [low, high) using one bit per odd number plus a
// cumulative count per 128-number block, and advances window by window so
// memory stays bounded no matter how large the sweep limit is.

use crate::primes::{self, PrimeIter};
use crate::status::Status;
use std::thread;

/// Smallest window, 2^21 numbers; a smaller window would be rebuilt so
/// often that the fixed setup cost dominates
pub const MIN_SEGMENT_SIZE: u64 = 256 * 1024 * 8;

/// Floor on each construction worker's share of the window
const MIN_WORKER_SHARE: u64 = 1 << 20;

/// One block covers 128 consecutive integers: 64 bits for the odd ones and
/// the cumulative prime count at the block's start.
#[derive(Debug, Clone, Copy, Default)]
struct PiBlock {
    bits: u64,
    count: u64,
}

pub struct SegmentedPiTable {
    blocks: Vec<PiBlock>,
    low: u64,
    high: u64,
    max_high: u64,
    pi_low: u64,
    segment_size: u64,
    workers: usize,
}

impl SegmentedPiTable {
    /// Build the first window of a table able to answer pi(n) for any
    /// n <= limit. `low` must be 128-aligned so worker sub-ranges split
    /// evenly during construction.
    pub fn new(low: u64, limit: u64, segment_size: u64, workers: usize) -> Self {
        assert!(low % 128 == 0, "table low {} is not 128-aligned", low);

        let max_high = limit + 1;
        let mut segment_size = segment_size
            .max(MIN_SEGMENT_SIZE)
            .min(max_high.saturating_sub(low).max(MIN_SEGMENT_SIZE));
        // Aligned window and worker boundaries simplify the parallel build
        segment_size = segment_size.next_multiple_of(128);

        let workers = workers
            .clamp(1, (segment_size / MIN_WORKER_SHARE).max(1) as usize);

        let high = (low + segment_size).min(max_high);
        let pi_low = primes::pi_small(low.max(1) - 1);

        let mut table = Self {
            blocks: vec![PiBlock::default(); (segment_size / 128) as usize],
            low,
            high,
            max_high,
            pi_low,
            segment_size,
            workers,
        };
        if !table.finished() {
            table.init();
        }
        table
    }

    /// Number of primes <= n. Valid only inside the current window; an
    /// out-of-window query is a programming error.
    pub fn pi(&self, n: u64) -> u64 {
        assert!(
            n >= self.low && n < self.high,
            "pi({}) queried outside window [{}, {})",
            n,
            self.low,
            self.high
        );

        // 2 is represented by the sentinel bit in the slot of 1, so the
        // smallest queries are answered directly
        if n < 3 {
            return (n == 2) as u64;
        }

        let off = n - self.low;
        let block = &self.blocks[(off / 128) as usize];
        let nbits = ((off % 128 + 1) / 2) as u32;
        let mask = if nbits == 0 { 0 } else { !0_u64 >> (64 - nbits) };
        block.count + (block.bits & mask).count_ones() as u64
    }

    /// Advance to the next window, reusing the last count as the new
    /// window's starting offset. Past the limit this is a terminal no-op.
    pub fn next(&mut self) {
        if self.finished() {
            return;
        }

        // The old window's final count seeds the new window
        self.pi_low = self.pi(self.high - 1);

        self.low = self.high;
        self.high = (self.low + self.segment_size).min(self.max_high);

        if !self.finished() {
            self.init();
        }
    }

    pub fn finished(&self) -> bool {
        self.low >= self.max_high
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn segment_size(&self) -> u64 {
        self.segment_size
    }

    /// Two data-parallel passes over disjoint per-worker sub-ranges: set
    /// the prime bits and local counts, then write the per-block cumulative
    /// counts once every earlier sub-range's total is known.
    fn init(&mut self) {
        let mut worker_size = (self.segment_size / self.workers as u64).max(MIN_WORKER_SHARE);
        worker_size = worker_size.next_multiple_of(128);
        let blocks_per_worker = (worker_size / 128) as usize;

        let low = self.low;
        let high = self.high;

        // Bit pass: each worker sieves [start, stop) into its own slice of
        // blocks and reports how many primes it saw
        let mut counts: Vec<u64> = Vec::new();
        thread::scope(|scope| {
            let mut handles = Vec::new();
            for (t, slice) in self.blocks.chunks_mut(blocks_per_worker).enumerate() {
                let start = low + t as u64 * worker_size;
                let stop = (start + worker_size).min(high);
                if start >= stop {
                    break;
                }
                handles.push(scope.spawn(move || init_bits(slice, start, stop)));
            }
            for handle in handles {
                counts.push(handle.join().unwrap());
            }
        });

        // Prefix pass: worker t starts from pi(low - 1) plus every earlier
        // worker's local count
        let pi_low = self.pi_low;
        thread::scope(|scope| {
            for (t, slice) in self.blocks.chunks_mut(blocks_per_worker).enumerate() {
                let start = low + t as u64 * worker_size;
                let stop = (start + worker_size).min(high);
                if start >= stop {
                    break;
                }
                let start_count = pi_low + counts[..t].iter().sum::<u64>();
                scope.spawn(move || init_counts(slice, start, stop, start_count));
            }
        });
    }
}

/// Exact prime count pi(limit) by sweeping table windows to the end.
pub fn count_primes(limit: u64, threads: usize, status: &mut Status) -> u64 {
    if limit < 2 {
        return 0;
    }

    let mut table = SegmentedPiTable::new(0, limit, 0, threads);
    loop {
        let count = table.pi(table.high() - 1);
        table.next();
        if table.finished() {
            return count;
        }
        status.print(table.low(), limit + 1);
    }
}

/// Sieve [start, stop) into `slice`, one bit per odd prime, and return the
/// local prime count.
fn init_bits(slice: &mut [PiBlock], start: u64, stop: u64) -> u64 {
    for block in slice.iter_mut() {
        *block = PiBlock::default();
    }

    // 2 is the only even prime and has no odd bit slot: mark the slot of 1
    // as a stand-in (queries special-case n < 3)
    if start <= 1 {
        slice[0].bits |= 1;
    }

    let mut it = PrimeIter::new(start.max(2), stop);
    let mut count = (start <= 2) as u64;
    loop {
        let prime = it.next_prime();
        if prime >= stop {
            break;
        }
        let off = prime - start;
        slice[(off / 128) as usize].bits |= 1_u64 << ((off % 128) / 2);
        count += 1;
    }
    count
}

/// Walk [start, stop)'s blocks writing running cumulative counts.
fn init_counts(slice: &mut [PiBlock], start: u64, stop: u64, mut count: u64) {
    let nblocks = (stop - start).div_ceil(128) as usize;
    for block in slice.iter_mut().take(nblocks) {
        block.count = count;
        count += block.bits.count_ones() as u64;
    }
}
