//! Executor: orchestration of a benchmark run.
//!
//! The `Executor` trait is the runtime hook that executes a [`Scenario`].
//! rpqbench ships the [`PacedExecutor`], an open-loop scheduler: every worker
//! owns one connection and issues a fixed number of operations at absolute
//! deadlines, while optional sampler tasks probe the servers once per period.
pub mod paced;
pub use paced::PacedExecutor;

use crate::{
    connection::Connector, generator::Generator, report::RunReport, scenario::Scenario,
    sink::Sink,
};

/// The runtime hook that executes a `Scenario`.
///
/// An executor decides how many tasks run, how they are paced and how the run
/// ends. It returns the [`RunReport`] of the finished run.
pub trait Executor<G, K, S>
where
    Self: Send + Sync + Sized,
    G: Generator,
    K: Connector,
    S: Sink,
{
    type Error;

    /// Execute the scenario to completion.
    fn exec(
        &self,
        scenario: &Scenario<G, K, S>,
    ) -> impl Future<Output = Result<RunReport, Self::Error>> + Send;
}
