// 2nd partial sieve function. P2(x, y) counts the numbers <= x that have
// exactly 2 prime factors, each larger than y:
//
//   P2(x, y) = sum_{y < p <= sqrt(x)} (pi(x/p) - pi(p) + 1)
//
// The pi(x/p) terms are evaluated by sweeping [2, x/y) with the chunked
// engine; the -(pi(p) - 1) terms collapse to a closed form that seeds the
// accumulator before the first chunk.

use rug::Integer;

use crate::checkpoint::CheckpointStore;
use crate::error::PixError;
use crate::formula::{self, RunOptions, SweepSpec, count_primes, div_capped};
use crate::primes::{self, PrimeIter, ReversePrimeIter};
use crate::reduce::ChunkResult;

pub const FORMULA: &str = "P2";

pub fn p2(
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

    let a = primes::pi_small(y.min(sqrtx));
    let b = primes::pi_small(sqrtx);
    if a >= b {
        return Ok(Integer::new());
    }

    // sum_{i=a+1}^{b} -(i - 1), folded in before any chunk
    let init_sum = (Integer::from(a) - 2) * (Integer::from(a) + 1) / 2
        - (Integer::from(b) - 2) * (Integer::from(b) + 1) / 2;

    formula::run(
        SweepSpec {
            name: FORMULA,
            x,
            y,
            limit: z,
            low: 2,
            carry: 0,
            init_sum,
            every_round_backup: true,
            worker: |low, high| p2_chunk(x, y, sqrtx, low, high),
        },
        store,
        opts,
    )
}

/// Sieve one chunk [low, high): walk the primes p with x/p inside the chunk
/// from the top down, counting pi(x/p) from the chunk's own lower bound.
fn p2_chunk(x: &Integer, y: u64, sqrtx: u64, low: u64, high: u64) -> ChunkResult {
    let start = div_capped(x, high, sqrtx).max(y);
    let stop = div_capped(x, low, sqrtx);

    let mut rit = ReversePrimeIter::new(stop + 1, start);
    let mut it = PrimeIter::new(low - 1, high);
    let mut next = it.next_prime();
    let mut prime = rit.prev_prime();

    let mut sum = Integer::new();
    let mut prime_count = 0;
    let mut leaf_iterations = 0;

    while prime > start {
        let xp = div_capped(x, prime, u64::MAX);
        if xp >= high {
            break;
        }
        prime_count += count_primes(&mut it, &mut next, xp);
        sum += prime_count;
        leaf_iterations += 1;
        prime = rit.prev_prime();
    }

    // Count the chunk's remaining primes so the carry covers all of
    // [low, high)
    prime_count += count_primes(&mut it, &mut next, high - 1);

    ChunkResult {
        sum,
        prime_count,
        leaf_iterations,
    }
}
