// Gourdon's B formula, a partial computation of P2:
//
//   B(x, y) = sum_{y < p <= sqrt(x)} pi(x / p)
//
// The sweep starts at sqrt(x) instead of 2, so its carry is seeded with
// the true prime count below sqrt(x) before the first chunk folds.

use rug::Integer;

use crate::checkpoint::CheckpointStore;
use crate::error::PixError;
use crate::formula::{self, RunOptions, SweepSpec, count_primes, div_capped};
use crate::primes::{self, PrimeIter, ReversePrimeIter};
use crate::reduce::ChunkResult;

pub const FORMULA: &str = "B";

pub fn b(
    x: &Integer,
    y: u64,
    store: &mut CheckpointStore,
    opts: &RunOptions,
) -> Result<Integer, PixError> {
    if y < 1 {
        return Err(PixError::InvalidInput("y must be positive".into()));
    }
    if *x < 4 {
        return Ok(Integer::new());
    }

    let sqrtx = formula::sqrt_u64(x)?;
    let z = formula::sieve_limit(x, y)?;
    let low = sqrtx;

    // True prime count below the sweep's start index
    let carry = primes::pi_small(low - 1);

    formula::run(
        SweepSpec {
            name: FORMULA,
            x,
            y,
            limit: z,
            low,
            carry,
            init_sum: Integer::new(),
            every_round_backup: false,
            worker: |chunk_low, chunk_high| b_chunk(x, y, sqrtx, chunk_low, chunk_high),
        },
        store,
        opts,
    )
}

/// Sieve one chunk [low, high): for every prime p with x/p inside the
/// chunk, add pi(x/p) counted from the chunk's own lower bound.
fn b_chunk(x: &Integer, y: u64, sqrtx: u64, low: u64, high: u64) -> ChunkResult {
    let start = div_capped(x, high, sqrtx).max(y);
    let stop = div_capped(x, low, sqrtx);

    let mut it = PrimeIter::new(low - 1, high);
    let mut rit = ReversePrimeIter::new(stop + 1, start);
    let mut next = it.next_prime();
    let mut prime = rit.prev_prime();

    let mut sum = Integer::new();
    let mut prime_count = 0;
    let mut leaf_iterations = 0;

    while prime > start {
        let xp = div_capped(x, prime, u64::MAX);
        prime_count += count_primes(&mut it, &mut next, xp);
        prime = rit.prev_prime();
        sum += prime_count;
        leaf_iterations += 1;
    }

    prime_count += count_primes(&mut it, &mut next, high - 1);

    ChunkResult {
        sum,
        prime_count,
        leaf_iterations,
    }
}
