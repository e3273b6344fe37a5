// Local round loop for a chunked sweep. Each round fans one chunk out per
// worker over scoped threads, joins them (the round barrier), folds the
// results strictly in chunk order and adapts the chunk width from the
// round's wall-clock time. The unit of interruption is the round boundary:
// between rounds the sweep state is exactly {low, distance, accumulator}.

use std::thread;
use std::time::Instant;

use crate::balance::{ThreadDistance, trimmed_workers};
use crate::reduce::{Accumulator, ChunkResult};

pub struct Sweep<W> {
    low: u64,
    limit: u64,
    threads: usize,
    distance: ThreadDistance,
    acc: Accumulator,
    worker: W,
}

impl<W> Sweep<W>
where
    W: Fn(u64, u64) -> ChunkResult + Sync,
{
    /// Fresh sweep over [low, limit) whose first chunk sits above
    /// `carry_prime_count` primes.
    pub fn new(low: u64, limit: u64, threads: usize, acc: Accumulator, worker: W) -> Self {
        Self::resume(low, limit, threads, ThreadDistance::new(), acc, worker)
    }

    /// Continue a sweep from checkpointed state.
    pub fn resume(
        low: u64,
        limit: u64,
        threads: usize,
        distance: ThreadDistance,
        acc: Accumulator,
        worker: W,
    ) -> Self {
        Self {
            low,
            limit,
            threads,
            distance,
            acc,
            worker,
        }
    }

    pub fn finished(&self) -> bool {
        self.low >= self.limit
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn thread_distance(&self) -> u64 {
        self.distance.get()
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.acc
    }

    pub fn into_accumulator(self) -> Accumulator {
        self.acc
    }

    /// Run one round: fan out, join, fold in order, adapt. Returns the
    /// round's wall-clock seconds.
    pub fn round(&mut self) -> f64 {
        if self.finished() {
            return 0.0;
        }

        let distance = self.distance.get();
        let remaining = self.limit - self.low;
        // Never hand a worker an empty chunk
        let workers = trimmed_workers(self.threads, remaining, distance);

        let low = self.low;
        let limit = self.limit;
        let worker = &self.worker;
        let timer = Instant::now();

        // Fan-out: one disjoint chunk per worker; joining the handles in
        // spawn order is both the round barrier and the fold order
        let mut results: Vec<ChunkResult> = Vec::with_capacity(workers);
        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|i| {
                    let chunk_low = low + i as u64 * distance;
                    let chunk_high = (chunk_low + distance).min(limit);
                    scope.spawn(move || worker(chunk_low, chunk_high))
                })
                .collect();
            for handle in handles {
                results.push(handle.join().unwrap());
            }
        });
        let secs = timer.elapsed().as_secs_f64();

        // Sequential reduction in ascending chunk order
        for result in &results {
            self.acc.fold(result);
        }

        self.low = (self.low + distance * workers as u64).min(self.limit);
        self.distance.update(self.low, self.limit, workers, secs);

        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::MIN_DISTANCE;
    use crate::primes::small_primes;
    use rug::Integer;

    // Prime-count worker: every prime in the chunk is one leaf whose local
    // value restarts from the chunk's lower bound.
    fn prime_count_chunk(low: u64, high: u64) -> ChunkResult {
        let mut sum = Integer::new();
        let mut prime_count = 0;
        let mut leaf_iterations = 0;
        for p in small_primes(high.saturating_sub(1)) {
            if p >= low {
                prime_count += 1;
                sum += prime_count;
                leaf_iterations += 1;
            }
        }
        ChunkResult {
            sum,
            prime_count,
            leaf_iterations,
        }
    }

    // O(1) worker treating every integer in the chunk as a leaf; the folded
    // sum is the partition-invariant total 1 + 2 + ... + (limit - low).
    fn arithmetic_chunk(low: u64, high: u64) -> ChunkResult {
        let n = high - low;
        ChunkResult {
            sum: (Integer::from(n) * (n + 1)) / 2,
            prime_count: n,
            leaf_iterations: n,
        }
    }

    #[test]
    fn test_sweep_to_one_thousand_folds_to_168() {
        // All worker counts agree with brute-force enumeration below 1000
        for threads in [1, 3, 4, 7] {
            let mut sweep = Sweep::new(2, 1_000, threads, Accumulator::new(0), prime_count_chunk);
            while !sweep.finished() {
                sweep.round();
            }
            let acc = sweep.into_accumulator();
            assert_eq!(acc.carry_prime_count, 168, "threads {}", threads);
        }
    }

    #[test]
    fn test_multi_round_sweep_is_partition_invariant() {
        let low = 0;
        let limit = MIN_DISTANCE * 13 + 12_345;
        let n = limit - low;
        let expected = (Integer::from(n) * (n + 1)) / 2;

        for threads in [1, 3, 4] {
            let mut sweep = Sweep::new(low, limit, threads, Accumulator::new(0), arithmetic_chunk);
            let mut rounds = 0;
            while !sweep.finished() {
                sweep.round();
                rounds += 1;
                assert!(sweep.thread_distance() >= MIN_DISTANCE);
            }
            assert!(rounds > 1, "want a multi-round sweep, got {} rounds", rounds);
            let acc = sweep.into_accumulator();
            assert_eq!(acc.sum, expected, "threads {}", threads);
            assert_eq!(acc.carry_prime_count, n);
        }
    }

    #[test]
    fn test_interrupt_and_resume_at_round_boundary() {
        let limit = MIN_DISTANCE * 29 + 999;

        let mut one_shot = Sweep::new(0, limit, 4, Accumulator::new(0), arithmetic_chunk);
        while !one_shot.finished() {
            one_shot.round();
        }
        let expected = one_shot.into_accumulator();

        // Interrupt after each possible number of rounds and resume
        for stop_after in 1..6 {
            let mut sweep = Sweep::new(0, limit, 4, Accumulator::new(0), arithmetic_chunk);
            for _ in 0..stop_after {
                if sweep.finished() {
                    break;
                }
                sweep.round();
            }

            // Everything a checkpoint captures between rounds
            let low = sweep.low();
            let distance = sweep.thread_distance();
            let acc = sweep.accumulator().clone();
            drop(sweep);

            let mut resumed = Sweep::resume(
                low,
                limit,
                4,
                ThreadDistance::resume(distance),
                acc,
                arithmetic_chunk,
            );
            while !resumed.finished() {
                resumed.round();
            }
            let acc = resumed.into_accumulator();
            assert_eq!(acc, expected, "resumed after {} rounds", stop_after);
        }
    }

    #[test]
    fn test_low_advances_every_round() {
        let limit = MIN_DISTANCE * 5;
        let mut sweep = Sweep::new(0, limit, 2, Accumulator::new(0), arithmetic_chunk);
        let mut last_low = 0;
        while !sweep.finished() {
            sweep.round();
            assert!(sweep.low() > last_low, "low must strictly increase");
            assert!(sweep.low() <= limit);
            last_low = sweep.low();
        }
        assert_eq!(sweep.low(), limit);
    }

    #[test]
    fn test_carry_seed_flows_through() {
        // A sweep starting mid-range gets the primes below it as its carry
        let mut sweep = Sweep::new(1_000, 2_000, 2, Accumulator::new(168), prime_count_chunk);
        while !sweep.finished() {
            sweep.round();
        }
        let acc = sweep.into_accumulator();
        assert_eq!(acc.carry_prime_count, 303); // pi(2000 - 1)
    }
}
