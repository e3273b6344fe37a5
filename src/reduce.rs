// Reduction protocol for chunked sweeps. Each chunk's partial sum is
// computed as if the prime count restarted from zero at the chunk's lower
// bound; folding restores the missing contributions, and the fold order is
// a correctness requirement, not a preference.

use rug::Integer;
use std::collections::BTreeMap;

/// Partial result of one chunk, immutable once produced by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkResult {
    /// Sum of the chunk's leaf contributions, counted from the chunk's own
    /// lower bound rather than from the true global prime count
    pub sum: Integer,
    /// Number of primes the chunk's sieve passed over
    pub prime_count: u64,
    /// Number of leaf terms that entered `sum`
    pub leaf_iterations: u64,
}

/// Running total of a sweep: the accumulated sum plus the true count of
/// primes below the current sweep position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    pub sum: Integer,
    pub carry_prime_count: u64,
}

impl Accumulator {
    /// Start a sweep whose first chunk begins above `carry_prime_count`
    /// primes (the true count below the sweep's start index).
    pub fn new(carry_prime_count: u64) -> Self {
        Self {
            sum: Integer::new(),
            carry_prime_count,
        }
    }

    /// Rebuild the accumulator from checkpointed state.
    pub fn resume(sum: Integer, carry_prime_count: u64) -> Self {
        Self {
            sum,
            carry_prime_count,
        }
    }

    /// Fold one chunk into the running total.
    ///
    /// Each of the chunk's `leaf_iterations` terms is missing the
    /// `carry_prime_count` primes below the chunk's lower bound, so the true
    /// contribution is `sum + carry_prime_count * leaf_iterations`. The
    /// carry then advances by the primes the chunk swept over, which is why
    /// chunks must fold in ascending order. An empty chunk is all zeros and
    /// folds as a no-op without advancing the carry.
    pub fn fold(&mut self, chunk: &ChunkResult) {
        self.sum += &chunk.sum;
        self.sum += Integer::from(self.carry_prime_count) * chunk.leaf_iterations;
        self.carry_prime_count += chunk.prime_count;
    }
}

/// Folds chunk results that may arrive out of order.
///
/// Results are buffered by chunk id and folded only once every
/// lower-numbered chunk has folded, so the accumulator always sees chunks
/// in ascending order. Pushing a chunk id twice, or one below the fold
/// frontier, is a programming error.
pub struct OrderedReducer {
    acc: Accumulator,
    pending: BTreeMap<u64, ChunkResult>,
    next_chunk: u64,
}

impl OrderedReducer {
    pub fn new(acc: Accumulator, first_chunk: u64) -> Self {
        Self {
            acc,
            pending: BTreeMap::new(),
            next_chunk: first_chunk,
        }
    }

    /// Buffer one chunk result and fold every consecutive result available.
    pub fn push(&mut self, chunk_id: u64, result: ChunkResult) {
        assert!(
            chunk_id >= self.next_chunk,
            "chunk {} folded twice (fold frontier is {})",
            chunk_id,
            self.next_chunk
        );
        let replaced = self.pending.insert(chunk_id, result);
        assert!(replaced.is_none(), "chunk {} already buffered", chunk_id);

        while let Some(result) = self.pending.remove(&self.next_chunk) {
            self.acc.fold(&result);
            self.next_chunk += 1;
        }
    }

    /// Id of the next chunk the accumulator is waiting for.
    pub fn next_chunk(&self) -> u64 {
        self.next_chunk
    }

    /// True once no buffered result is waiting on an earlier chunk.
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.acc
    }

    pub fn into_accumulator(self) -> Accumulator {
        assert!(
            self.pending.is_empty(),
            "reducer dropped with {} unfolded chunks",
            self.pending.len()
        );
        self.acc
    }
}
