// Shared driver for the partial-sum formulas: parameter validation,
// checkpoint resume, the round loop (or worker pool) and the completed-run
// bookkeeping. Each formula contributes its sweep bounds, carry seed and
// chunk worker.

use rug::Integer;
use std::time::Instant;

use crate::balance::ThreadDistance;
use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::coordinator;
use crate::error::PixError;
use crate::primes::PrimeIter;
use crate::reduce::{Accumulator, ChunkResult};
use crate::status::Status;
use crate::storage;
use crate::sweep::Sweep;

/// How a computation runs; shared by every formula.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub threads: usize,
    /// Suppress status lines and resume notices
    pub quiet: bool,
    /// Ignore any stored checkpoint and start over
    pub fresh: bool,
    /// Pull-based worker pool instead of per-round barriers
    pub pool: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            quiet: true,
            fresh: false,
            pool: false,
        }
    }
}

/// One formula's sweep: its checkpoint key, bounds, seeds and chunk worker.
pub struct SweepSpec<'a, W> {
    /// Checkpoint key; records under another name never match
    pub name: &'static str,
    pub x: &'a Integer,
    pub y: u64,
    /// Sweep limit (the sieve limit z)
    pub limit: u64,
    /// Sweep start
    pub low: u64,
    /// True prime count below `low`
    pub carry: u64,
    /// Closed-form seed folded in before the first chunk
    pub init_sum: Integer,
    /// Write a checkpoint after every round instead of throttling
    pub every_round_backup: bool,
    pub worker: W,
}

/// Run one formula's sweep to completion, resuming from a matching
/// checkpoint when one exists and recording the result when done.
pub fn run<W>(
    spec: SweepSpec<'_, W>,
    store: &mut CheckpointStore,
    opts: &RunOptions,
) -> Result<Integer, PixError>
where
    W: Fn(u64, u64) -> ChunkResult + Sync,
{
    if opts.threads == 0 {
        return Err(PixError::InvalidInput("worker count must be positive".into()));
    }

    let mut low = spec.low;
    let mut distance = ThreadDistance::new();
    let mut acc = Accumulator::resume(spec.init_sum, spec.carry);
    let mut seconds_offset = 0.0;

    if opts.fresh {
        store.remove(spec.name)?;
    } else if let Some(record) = store.try_resume(spec.name, spec.x, spec.y, spec.limit)? {
        if record.is_complete() {
            // The exact computation already finished once; return its sum
            if !opts.quiet {
                println!("Resuming {}: already complete", spec.name);
            }
            return record.sum_value();
        }
        low = record.low.unwrap_or(low);
        distance = ThreadDistance::resume(record.thread_distance.unwrap_or(0));
        acc = Accumulator::resume(record.sum_value()?, record.prime_count.unwrap_or(0));
        // Keep elapsed time continuous across the restart
        seconds_offset = record.seconds.max(0.0);
        if !opts.quiet {
            println!("Resuming {} at {:.1}%", spec.name, record.percent);
        }
    }

    let timer = Instant::now();
    let status = Status::new(spec.x, !opts.quiet);
    store.reset_throttle();

    let acc = if opts.pool {
        let worker = &spec.worker;
        coordinator::run_pool(
            low,
            spec.limit,
            opts.threads,
            distance,
            acc,
            status,
            worker,
            |state| {
                let record = CheckpointRecord::in_flight(
                    spec.x,
                    spec.y,
                    spec.limit,
                    state.folded_low,
                    state.thread_distance,
                    state.accumulator.carry_prime_count,
                    &state.accumulator.sum,
                    Status::percent(state.folded_low, spec.limit),
                    seconds_offset + timer.elapsed().as_secs_f64(),
                );
                if spec.every_round_backup {
                    store.save(spec.name, &record)?;
                } else {
                    store.save_throttled(spec.name, &record)?;
                }
                Ok(())
            },
        )?
    } else {
        let mut status = status;
        let mut sweep = Sweep::resume(low, spec.limit, opts.threads, distance, acc, &spec.worker);
        while !sweep.finished() {
            sweep.round();

            let acc = sweep.accumulator();
            let record = CheckpointRecord::in_flight(
                spec.x,
                spec.y,
                spec.limit,
                sweep.low(),
                sweep.thread_distance(),
                acc.carry_prime_count,
                &acc.sum,
                Status::percent(sweep.low(), spec.limit),
                seconds_offset + timer.elapsed().as_secs_f64(),
            );
            if spec.every_round_backup {
                store.save(spec.name, &record)?;
            } else {
                store.save_throttled(spec.name, &record)?;
            }

            status.print(sweep.low(), spec.limit);
        }
        status.finish();
        sweep.into_accumulator()
    };

    let seconds = seconds_offset + timer.elapsed().as_secs_f64();
    let record = CheckpointRecord::completed(spec.x, spec.y, spec.limit, &acc.sum, seconds);
    store.save(spec.name, &record)?;

    if let Err(e) = storage::log_execution(
        spec.name,
        &format!("x={} y={}", spec.x, spec.y),
        &acc.sum.to_string(),
        seconds,
    ) {
        eprintln!("Warning: Failed to log execution: {}", e);
    }

    Ok(acc.sum)
}

/// Integer square root of the wide argument, which must fit the sweep's
/// 64-bit position domain.
pub(crate) fn sqrt_u64(x: &Integer) -> Result<u64, PixError> {
    Integer::from(x.sqrt_ref())
        .to_u64()
        .ok_or_else(|| PixError::InvalidInput("x is too large: sqrt(x) must fit 64 bits".into()))
}

/// Sieve limit z = x / max(y, 1); the whole sweep domain must fit 64 bits.
pub(crate) fn sieve_limit(x: &Integer, y: u64) -> Result<u64, PixError> {
    Integer::from(x / y.max(1))
        .to_u64()
        .ok_or_else(|| {
            PixError::InvalidInput("sieve limit x / y exceeds 64 bits; increase y".into())
        })
}

/// min(x / d, cap) computed in wide arithmetic.
pub(crate) fn div_capped(x: &Integer, d: u64, cap: u64) -> u64 {
    let q = Integer::from(x / d);
    if q > cap { cap } else { q.to_u64().unwrap_or(cap) }
}

/// Count primes in (last returned, stop], advancing the cursor past `stop`.
pub(crate) fn count_primes(it: &mut PrimeIter, next: &mut u64, stop: u64) -> u64 {
    let mut count = 0;
    let mut p = *next;
    while p <= stop {
        count += 1;
        p = it.next_prime();
    }
    *next = p;
    count
}
