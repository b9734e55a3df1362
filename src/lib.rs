//! rpqbench: an open-loop load generator for key-value servers that tracks
//! the top entry of a ranked working set while the load mutates it.
//!
//! Every operation the workload sends to a server is mirrored into a local
//! [`RankedQueue`], an indexed max-heap shared by all workers. Periodic probes
//! ask the server for its own view (its top entry, its memory footprint) and
//! log it next to the local one, so runs against different server builds or
//! configurations can be compared row by row afterwards.
//!
//! # Architecture
//!
//! - [`Scenario`]: what to run. Names the run and carries the [`Generator`],
//!   the [`Connector`], the shared [`RankedQueue`] and the [`sink::Sink`] the
//!   sample logs are flushed to.
//! - [`Executor`]: how to run it. The [`PacedExecutor`] spawns a fixed number
//!   of workers per server, each issuing its share of the operations at
//!   absolute deadlines, plus optional read, overhead and op-count samplers
//!   and a progress bar.
//! - [`RankedQueue`]: the shared indexed max-heap and its sample logs.
//! - [`Record`]: one row of a sample log ([`MaxSample`], [`OverheadSample`],
//!   [`OpCountSample`]).
//! - [`RunReport`] / [`Reporter`]: the summary of a finished run and where it
//!   goes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rpqbench::{
//!     Executor, PacedExecutor, Probe, RankedQueue, Reporter, Scenario,
//!     connection::{ServerAddr, TcpConnector},
//!     generator::ZSetGenerator,
//!     report::StdoutReporter,
//!     sink::CsvSink,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = Arc::new(RankedQueue::new());
//!     let scenario = Scenario::builder()
//!         .name("zset baseline")
//!         .generator(Arc::new(ZSetGenerator::new(Arc::clone(&queue), "rpq", 10_000)))
//!         .connector(Arc::new(TcpConnector))
//!         .queue(queue)
//!         .sink(CsvSink::new("."))
//!         .build();
//!
//!     let report = PacedExecutor::builder()
//!         .servers(vec![ServerAddr::new("127.0.0.1", 6379)])
//!         .threads_per_server(4)
//!         .total_ops(100_000)
//!         .target_rate(5_000.0)
//!         .read(Probe::read_max("rpq"))
//!         .build()
//!         .exec(&scenario)
//!         .await?;
//!
//!     StdoutReporter.report(&report).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//! - `internals`: exposes the executor's task bodies and pacing helpers

/// Command-line configuration
pub mod config;
/// Connections to the servers under test
pub mod connection;
pub mod error;
/// Orchestrators that define how a run actually happens
pub mod executor;
pub mod generator;
pub mod heap;
pub mod probe;
/// Sample-log rows
pub mod record;
/// Run summaries and reporters
pub mod report;
pub mod rpq;
pub mod sample_log;
/// Glue that ties a run together
pub mod scenario;
/// Persistence of sample logs
pub mod sink;
pub mod stats;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
pub use executor::{Executor, PacedExecutor};
pub use generator::Generator;
pub use probe::Probe;
pub use record::{MaxSample, OpCountSample, OverheadSample, Record};
pub use report::{Reporter, RunReport};
pub use rpq::RankedQueue;
pub use sample_log::SampleLog;
pub use scenario::Scenario;

pub use connection::Connector;

/// Procedural macros to reduce boilerplate
pub mod macros {
    pub use rpqbench_macros::*;
}
