use parking_lot::Mutex;

use crate::{Record, error::Result, sink::Sink};

/// Append-only buffer of records behind its own lock.
///
/// Appends from different tasks are atomic relative to each other and the
/// buffer keeps them in arrival order.
#[derive(Debug)]
pub struct SampleLog<R: Record> {
    rows: Mutex<Vec<R>>,
}

impl<R: Record> Default for SampleLog<R> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

impl<R: Record> SampleLog<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, row: R) {
        self.rows.lock().push(row);
    }

    /// Copy of every row appended so far.
    pub fn snapshot(&self) -> Vec<R> {
        self.rows.lock().clone()
    }

    /// Hands every row to `sink` under `name`.
    pub fn persist<S: Sink>(&self, sink: &S, name: &str) -> Result<()> {
        let rows = self.rows.lock();
        sink.write(name, &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OverheadSample;
    use std::{sync::Arc, thread};

    #[test]
    fn concurrent_pushes_are_all_kept() {
        let log = Arc::new(SampleLog::<OverheadSample>::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..500 {
                        log.push(OverheadSample {
                            size: t,
                            overhead: i,
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let rows = log.snapshot();
        assert_eq!(rows.len(), 4000);
        // each producer's rows keep their relative order
        for t in 0..8 {
            let mine: Vec<i64> = rows
                .iter()
                .filter(|r| r.size == t)
                .map(|r| r.overhead)
                .collect();
            assert_eq!(mine, (0..500).collect::<Vec<_>>());
        }
    }
}
