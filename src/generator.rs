//! Synthetic operation generators.
//!
//! A [`Generator`] produces one operation per call, executes it against the
//! worker's connection and may mirror it into the [`RankedQueue`]. The
//! executor only drives the pacing; what gets sent is entirely up to the
//! generator.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rand::Rng;

use crate::{
    connection::{Connection, Reply},
    error::Result,
    rpq::RankedQueue,
};

pub trait Generator: Send + Sync + 'static {
    /// Produces and executes one operation against `conn`.
    fn exec_one<C: Connection>(&self, conn: &mut C) -> impl Future<Output = Result<Reply>> + Send;

    /// Operations produced so far, across all callers.
    fn generated(&self) -> u64;
}

/// One mutation of the ranked working set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Add { id: i64, weight: f64 },
    Inc { id: i64, delta: f64 },
    Rem { id: i64 },
}

impl Op {
    /// Sorted-set command carrying the same semantics as the local operation:
    /// `NX` keeps inserts idempotent and `XX` keeps increments from creating
    /// members.
    pub fn args(&self, key: &str) -> Vec<String> {
        match *self {
            Op::Add { id, weight } => vec![
                "ZADD".into(),
                key.into(),
                "NX".into(),
                weight.to_string(),
                id.to_string(),
            ],
            Op::Inc { id, delta } => vec![
                "ZADD".into(),
                key.into(),
                "XX".into(),
                "INCR".into(),
                delta.to_string(),
                id.to_string(),
            ],
            Op::Rem { id } => vec!["ZREM".into(), key.into(), id.to_string()],
        }
    }

    pub fn apply(&self, queue: &RankedQueue) {
        match *self {
            Op::Add { id, weight } => queue.add(id, weight),
            Op::Inc { id, delta } => queue.inc(id, delta),
            Op::Rem { id } => queue.rem(id),
        }
    }
}

/// Add/increment/remove mix over one sorted set.
///
/// Roughly 40% adds of a random id, 40% increments and 20% removals. Increments
/// and removals target a live id picked with [`RankedQueue::random_get`] so
/// that most of them hit. Every operation the server accepts is replayed on
/// the local queue.
#[derive(Debug)]
pub struct ZSetGenerator {
    queue: Arc<RankedQueue>,
    key: String,
    max_id: i64,
    generated: AtomicU64,
}

impl ZSetGenerator {
    pub fn new(queue: Arc<RankedQueue>, key: impl Into<String>, max_id: i64) -> Self {
        Self {
            queue,
            key: key.into(),
            max_id: max_id.max(1),
            generated: AtomicU64::new(0),
        }
    }

    pub fn next_op(&self) -> Op {
        let mut rng = rand::rng();
        match rng.random_range(0..10) {
            0..4 => Op::Add {
                id: rng.random_range(0..self.max_id),
                weight: rng.random_range(0..1000) as f64,
            },
            4..8 => Op::Inc {
                id: self.live_or_random(&mut rng),
                delta: rng.random_range(-50..=50) as f64,
            },
            _ => Op::Rem {
                id: self.live_or_random(&mut rng),
            },
        }
    }

    fn live_or_random(&self, rng: &mut impl Rng) -> i64 {
        match self.queue.random_get() {
            -1 => rng.random_range(0..self.max_id),
            id => id,
        }
    }
}

impl Generator for ZSetGenerator {
    async fn exec_one<C: Connection>(&self, conn: &mut C) -> Result<Reply> {
        let op = self.next_op();
        self.generated.fetch_add(1, Ordering::Relaxed);
        let reply = conn.execute(&op.args(&self.key)).await?;
        op.apply(&self.queue);
        Ok(reply)
    }

    fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }
}
