//! The ranked queue: an [`IndexedHeap`] shared by every workload task,
//! plus the sample logs fed by the probes.
//!
//! All structural access goes through a single mutex. The sample logs each
//! have their own lock and are only touched after the structural lock has
//! been released, so the two are never held together. A snapshot taken by
//! one task may therefore be logged after other tasks have already mutated
//! the heap again; the logs are an approximation of the live state, not a
//! linearizable history.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::Rng;

use crate::{
    MaxSample, OpCountSample, OverheadSample, SampleLog,
    error::Result,
    heap::IndexedHeap,
    sink::Sink,
};

pub const MAX_LOG_FILE: &str = "max.csv";
pub const OVERHEAD_LOG_FILE: &str = "ovhd.csv";
pub const OPCOUNT_LOG_FILE: &str = "opcount.csv";

/// Reported as the top entry while the queue is empty.
pub const EMPTY_TOP: (i64, f64) = (-1, -1.0);

#[derive(Debug, Default)]
pub struct RankedQueue {
    heap: Mutex<IndexedHeap>,
    ops_executed: AtomicU64,
    max_log: SampleLog<MaxSample>,
    overhead_log: SampleLog<OverheadSample>,
    opcount_log: SampleLog<OpCountSample>,
}

impl RankedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `id`. Does nothing if it is already tracked.
    pub fn add(&self, id: i64, weight: f64) {
        self.heap.lock().insert(id, weight);
        self.ops_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `delta` to the weight of `id`.
    ///
    /// A zero delta is not an operation at all and is not counted. Unknown ids
    /// are counted but otherwise ignored.
    pub fn inc(&self, id: i64, delta: f64) {
        if delta == 0.0 {
            return;
        }
        self.heap.lock().adjust(id, delta);
        self.ops_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Stops tracking `id`. Unknown ids are counted but otherwise ignored.
    pub fn rem(&self, id: i64) {
        self.heap.lock().remove(id);
        self.ops_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Logs what a server reported as its top entry next to the local top.
    pub fn max(&self, query_id: i64, query_weight: f64) {
        let (top_id, top_weight) = self.top().unwrap_or(EMPTY_TOP);
        self.max_log.push(MaxSample {
            queried_id: query_id,
            queried_weight: query_weight,
            top_id,
            top_weight,
        });
    }

    /// Logs a server-side overhead measurement next to the current size.
    pub fn overhead(&self, metric: i64) {
        let size = self.len() as u64;
        self.overhead_log.push(OverheadSample {
            size,
            overhead: metric,
        });
    }

    /// Logs the server's processed-operations counter next to the local one.
    pub fn opcount(&self, server_ops: i64) {
        self.opcount_log.push(OpCountSample {
            local_ops: self.ops_executed(),
            server_ops,
        });
    }

    /// Id at a uniformly chosen heap position, or `-1` if nothing is tracked.
    pub fn random_get(&self) -> i64 {
        let heap = self.heap.lock();
        if heap.is_empty() {
            return -1;
        }
        let pos = rand::rng().random_range(0..heap.len());
        heap.id_at(pos).unwrap_or(-1)
    }

    pub fn top(&self) -> Option<(i64, f64)> {
        self.heap.lock().top()
    }

    pub fn weight(&self, id: i64) -> Option<f64> {
        self.heap.lock().get(id).map(|e| e.weight)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Number of `add`/`inc`/`rem` calls counted so far.
    pub fn ops_executed(&self) -> u64 {
        self.ops_executed.load(Ordering::Relaxed)
    }

    pub fn max_samples(&self) -> Vec<MaxSample> {
        self.max_log.snapshot()
    }

    pub fn overhead_samples(&self) -> Vec<OverheadSample> {
        self.overhead_log.snapshot()
    }

    pub fn opcount_samples(&self) -> Vec<OpCountSample> {
        self.opcount_log.snapshot()
    }

    /// Runs the heap's structural checks under the lock.
    pub fn is_consistent(&self) -> bool {
        self.heap.lock().is_valid()
    }

    /// Persists every sample log through `sink`.
    pub fn write_logfiles<S: Sink>(&self, sink: &S) -> Result<()> {
        self.overhead_log.persist(sink, OVERHEAD_LOG_FILE)?;
        self.max_log.persist(sink, MAX_LOG_FILE)?;
        self.opcount_log.persist(sink, OPCOUNT_LOG_FILE)
    }
}
