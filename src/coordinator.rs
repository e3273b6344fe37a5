// Pull-based work coordination for autonomous workers. A single-threaded
// coordinator actor owns every piece of mutable sweep state and speaks a
// request/response protocol over channels: workers ask for a chunk, report
// the previous one, and block until the reply arrives. Chunk assignment is
// at-most-once (`low` advances when the chunk is handed out, nothing is
// re-issued),
// and replies that arrive out of chunk order are buffered and folded only
// once every lower-numbered chunk has folded. Folding unordered would be a
// correctness bug, not an optimization.

use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;
use std::time::Instant;

use crate::balance::{ThreadDistance, trimmed_workers};
use crate::error::PixError;
use crate::reduce::{Accumulator, ChunkResult, OrderedReducer};
use crate::status::Status;

/// One unit of work, owned by exactly one worker for exactly one round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub chunk_id: u64,
    pub low: u64,
    pub high: u64,
}

/// A finished chunk travelling back to the coordinator.
#[derive(Debug)]
pub struct CompletedChunk {
    pub chunk_id: u64,
    pub result: ChunkResult,
    pub seconds: f64,
}

/// The protocol message: report the previous chunk (if any) and request the
/// next one. A `None` reply means the range is exhausted.
pub struct WorkRequest {
    pub finished: Option<CompletedChunk>,
    pub reply: Sender<Option<Assignment>>,
}

/// Everything a checkpoint needs from the coordinator, valid at the folded
/// frontier (chunks past it may be in flight and are not captured).
pub struct CoordinatorState<'a> {
    pub folded_low: u64,
    pub thread_distance: u64,
    pub accumulator: &'a Accumulator,
}

pub struct Coordinator {
    low: u64,
    limit: u64,
    workers: usize,
    next_chunk: u64,
    distance: ThreadDistance,
    reducer: OrderedReducer,
    /// High bound of each assigned, not yet folded chunk
    assigned: BTreeMap<u64, u64>,
    folded_low: u64,
    status: Status,
}

impl Coordinator {
    pub fn new(
        low: u64,
        limit: u64,
        workers: usize,
        distance: ThreadDistance,
        acc: Accumulator,
        status: Status,
    ) -> Self {
        Self {
            low,
            limit,
            workers,
            next_chunk: 0,
            distance,
            reducer: OrderedReducer::new(acc, 0),
            assigned: BTreeMap::new(),
            folded_low: low,
            status,
        }
    }

    /// Serve work requests until every worker has disconnected, then return
    /// the fully folded accumulator. `on_fold` runs after each fold with
    /// the checkpointable state at the folded frontier.
    pub fn run<C>(
        mut self,
        requests: Receiver<WorkRequest>,
        mut on_fold: C,
    ) -> Result<Accumulator, PixError>
    where
        C: FnMut(&CoordinatorState) -> Result<(), PixError>,
    {
        while let Ok(request) = requests.recv() {
            if let Some(done) = request.finished {
                // The request/reply latency plays the role of the round
                // time: balance on every reply
                self.distance
                    .update(self.low, self.limit, self.workers, done.seconds);

                self.reducer.push(done.chunk_id, done.result);

                // Advance the folded frontier past every chunk the reducer
                // has consumed
                while let Some((&chunk_id, &high)) = self.assigned.first_key_value() {
                    if chunk_id >= self.reducer.next_chunk() {
                        break;
                    }
                    self.folded_low = high;
                    self.assigned.remove(&chunk_id);
                }

                on_fold(&CoordinatorState {
                    folded_low: self.folded_low,
                    thread_distance: self.distance.get(),
                    accumulator: self.reducer.accumulator(),
                })?;

                self.status.print(self.folded_low, self.limit);
            }

            let assignment = self.assign();
            let _ = request.reply.send(assignment);
        }

        self.status.finish();
        Ok(self.reducer.into_accumulator())
    }

    /// Hand out the next chunk, or None once the range is exhausted.
    /// Assignment is optimistic: `low` advances now and the chunk is not
    /// re-issued.
    fn assign(&mut self) -> Option<Assignment> {
        if self.low >= self.limit {
            return None;
        }

        let distance = self.distance.get();
        let workers = trimmed_workers(self.workers, self.limit - self.low, distance);
        let distance = distance.min((self.limit - self.low).div_ceil(workers as u64));

        let assignment = Assignment {
            chunk_id: self.next_chunk,
            low: self.low,
            high: (self.low + distance.max(1)).min(self.limit),
        };

        self.assigned.insert(assignment.chunk_id, assignment.high);
        self.low = assignment.high;
        self.next_chunk += 1;
        Some(assignment)
    }
}

/// Worker side of the protocol: request, compute, report, repeat. The final
/// chunk's result rides along with the request that receives the `None`
/// reply, so nothing is lost when the range runs out.
pub fn worker_loop<W>(requests: &Sender<WorkRequest>, worker: W)
where
    W: Fn(u64, u64) -> ChunkResult,
{
    let mut finished = None;
    loop {
        let (reply_tx, reply_rx) = channel();
        let request = WorkRequest {
            finished: finished.take(),
            reply: reply_tx,
        };
        if requests.send(request).is_err() {
            return;
        }
        match reply_rx.recv() {
            Ok(Some(assignment)) => {
                let timer = Instant::now();
                let result = worker(assignment.low, assignment.high);
                finished = Some(CompletedChunk {
                    chunk_id: assignment.chunk_id,
                    result,
                    seconds: timer.elapsed().as_secs_f64(),
                });
            }
            _ => return,
        }
    }
}

/// Sweep [low, limit) with a pool of autonomous worker threads pulling
/// chunks from a coordinator actor.
pub fn run_pool<W, C>(
    low: u64,
    limit: u64,
    workers: usize,
    distance: ThreadDistance,
    acc: Accumulator,
    status: Status,
    worker: W,
    on_fold: C,
) -> Result<Accumulator, PixError>
where
    W: Fn(u64, u64) -> ChunkResult + Sync,
    C: FnMut(&CoordinatorState) -> Result<(), PixError> + Send,
{
    let coordinator = Coordinator::new(low, limit, workers, distance, acc, status);
    let (request_tx, request_rx) = channel();

    thread::scope(|scope| {
        let handle = scope.spawn(move || coordinator.run(request_rx, on_fold));

        for _ in 0..workers.max(1) {
            let request_tx = request_tx.clone();
            let worker = &worker;
            scope.spawn(move || worker_loop(&request_tx, worker));
        }
        // The coordinator exits once every clone of the request sender is
        // dropped
        drop(request_tx);

        handle.join().unwrap()
    })
}
