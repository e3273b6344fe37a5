// Adaptive load balancing for sweep rounds. The chunk width per worker
// grows while rounds finish quickly and shrinks once they drag, so rounds
// neither drown in fork/join overhead nor strand idle workers near the end
// of the range.

/// Smallest chunk width handed to a worker; below this the fixed per-round
/// overhead dominates the sieve work
pub const MIN_DISTANCE: u64 = 1 << 23;

/// Rounds faster than this many seconds double the width, slower rounds
/// halve it
pub const BALANCE_THRESHOLD_SECS: f64 = 60.0;

/// Adaptive per-worker chunk width for a monotone range sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadDistance {
    distance: u64,
}

impl ThreadDistance {
    pub fn new() -> Self {
        Self {
            distance: MIN_DISTANCE,
        }
    }

    /// Restore a width from a checkpoint, never below the floor.
    pub fn resume(distance: u64) -> Self {
        Self {
            distance: distance.max(MIN_DISTANCE),
        }
    }

    /// Width of each worker's chunk for the next round.
    pub fn get(&self) -> u64 {
        self.distance
    }

    /// Adapt the width from the previous round's wall-clock seconds.
    ///
    /// The upper clamp is recomputed every round: as `low` advances the
    /// remaining range shrinks, and a width above `remaining / workers`
    /// would leave workers without a chunk.
    pub fn update(&mut self, low: u64, limit: u64, workers: usize, round_secs: f64) {
        let remaining = limit.saturating_sub(low);
        let max_distance = remaining.div_ceil(workers.max(1) as u64);

        if round_secs < BALANCE_THRESHOLD_SECS {
            self.distance = self.distance.saturating_mul(2);
        } else if round_secs > BALANCE_THRESHOLD_SECS {
            self.distance /= 2;
        }

        self.distance = self.distance.clamp(MIN_DISTANCE, max_distance.max(MIN_DISTANCE));
    }
}

impl Default for ThreadDistance {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim the worker count so no worker receives an empty chunk.
pub fn trimmed_workers(workers: usize, remaining: u64, distance: u64) -> usize {
    let max_workers = remaining.div_ceil(distance.max(1));
    workers.clamp(1, max_workers.max(1) as usize)
}
