//! The `PacedExecutor`: open-loop, deadline-paced workers plus periodic
//! samplers.
//!
//! # High-level flow
//! 1. A shared execution context is created holding the stop channel the
//!    auxiliary tasks listen on.
//! 2. The optional read, overhead and op-count samplers and the progress
//!    reporter are spawned. Each opens its own connections and then
//!    loops once per `sample_period` until told to stop.
//! 3. `threads_per_server` workers are spawned for every server. Each opens
//!    one connection and issues exactly `total_ops / total_workers`
//!    operations through the scenario's generator.
//! 4. Once every worker has finished, the stop signal is sent, the auxiliary
//!    tasks are joined, the report is built and the sample logs are flushed.
//!
//! # Pacing
//! Workers never sleep for `interval` from "now". Operation `t` (1-based) is
//! followed by a sleep until
//!
//! ```text
//! deadline(t) = start + t * interval
//! interval    = total_workers / target_rate
//! ```
//!
//! so the time spent executing an operation and any wake-up jitter are
//! absorbed by the next sleep instead of accumulating over the run. A worker
//! that falls behind issues its next operation immediately until it has
//! caught up with its schedule. Samplers use the same formula with
//! `sample_period`.
//!
//! # Shutdown
//! Workers have no stop path; the run lasts until the slowest of them is
//! done. The auxiliary tasks check the stop channel before every iteration
//! and race it against every deadline sleep, so they exit as soon as the
//! signal is sent. There is no join timeout: a worker stuck on a connection
//! stalls the whole run.
//!
//! # Comparison mode
//! With `compare` set, the read sampler opens connections to the first two
//! servers and issues the probe on both concurrently every period. Both
//! readings are recorded once both replies are in, first server 0's then
//! server 1's, so rows of `max.csv` alternate between the two servers.
//! Readings that differ are counted as divergences. Both probes are in flight at the
//! same time but nothing guarantees the servers observe them at one logical
//! instant, so divergence counts are approximate.
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use super::Executor;
use crate::{
    connection::{Connector, ServerAddr},
    error::{Error, Result},
    generator::Generator,
    probe::Probe,
    report::RunReport,
    scenario::Scenario,
    sink::Sink,
    stats::RunStats,
};
use internals::*;

use std::{sync::Arc, time::Duration};

/// Open-loop executor driving a fixed operation count at a target rate.
///
/// # Tuning knobs
///
/// - `threads_per_server`: workers (and therefore connections) per server.
///   The per-worker inter-arrival interval grows with the total worker count
///   so the aggregate rate stays at `target_rate`.
/// - `sample_period`: cadence of the samplers and the progress bar.
/// - `read` / `overhead` / `opcount`: probes to run; `None` disables the
///   sampler.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PacedExecutor {
    /// Servers under test. Server 0 is the sampling target, server 1 the
    /// comparison target.
    pub servers: Vec<ServerAddr>,
    #[builder(default = 1)]
    pub threads_per_server: usize,
    /// Operations issued across all workers.
    pub total_ops: u64,
    /// Aggregate operations per second.
    pub target_rate: f64,
    #[builder(default, setter(into))]
    pub read: Option<Probe>,
    #[builder(default, setter(into))]
    pub overhead: Option<Probe>,
    #[builder(default, setter(into))]
    pub opcount: Option<Probe>,
    #[builder(default = false)]
    pub compare: bool,
    #[builder(default = Duration::from_secs(1))]
    pub sample_period: Duration,
    /// Draw the progress bar on the terminal.
    #[builder(default = true)]
    pub progress: bool,
}

impl PacedExecutor {
    pub fn total_workers(&self) -> usize {
        self.servers.len() * self.threads_per_server
    }

    /// Operations each worker issues. Any remainder of `total_ops` that does
    /// not split evenly is not issued.
    pub fn ops_per_worker(&self) -> u64 {
        match self.total_workers() {
            0 => 0,
            workers => self.total_ops / workers as u64,
        }
    }

    /// Time between two consecutive operations of one worker. Saturates for
    /// configurations that [`validate`](Self::validate) rejects.
    pub fn interval(&self) -> Duration {
        self.try_interval().unwrap_or(Duration::MAX)
    }

    fn try_interval(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.total_workers() as f64 / self.target_rate).map_err(|e| {
            Error::Config(format!(
                "target rate {} gives no usable interval for {} workers: {e}",
                self.target_rate,
                self.total_workers()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Config("at least one server is required".into()));
        }
        if self.threads_per_server == 0 {
            return Err(Error::Config("threads per server must be positive".into()));
        }
        if !(self.target_rate.is_finite() && self.target_rate > 0.0) {
            return Err(Error::Config(format!(
                "target rate must be a positive number, got {}",
                self.target_rate
            )));
        }
        self.try_interval()?;
        if self.sample_period.is_zero() {
            return Err(Error::Config("sample period must be positive".into()));
        }
        if self.compare && self.servers.len() < 2 {
            return Err(Error::Config(
                "comparison mode needs at least two servers".into(),
            ));
        }
        if self.compare && self.read.is_none() {
            return Err(Error::Config("comparison mode needs a read probe".into()));
        }
        Ok(())
    }
}

impl<G, K, S> Executor<G, K, S> for PacedExecutor
where
    G: Generator,
    K: Connector,
    S: Sink,
{
    type Error = Error;

    async fn exec(&self, scenario: &Scenario<G, K, S>) -> Result<RunReport> {
        self.validate()?;
        let workers = self.total_workers();
        let per_worker = self.ops_per_worker();
        let interval = self.interval();
        if self.total_ops % workers as u64 != 0 {
            tracing::warn!(
                "{} operations do not split evenly over {workers} workers, issuing {}",
                self.total_ops,
                per_worker * workers as u64
            );
        }

        let (ctx, shutdown_tx) = ExecutionContext::new();

        let read = self.read.clone().map(|probe| {
            tracing::info!("Spawning read sampler...");
            let shadow = self.compare.then(|| self.servers[1].clone());
            tokio::spawn(read_sampler(
                ctx.clone(),
                Arc::clone(&scenario.connector),
                Arc::clone(&scenario.queue),
                probe,
                self.servers[0].clone(),
                shadow,
                self.sample_period,
            ))
        });
        let mut samplers = vec![("read", read)];
        for (name, probe) in [("overhead", &self.overhead), ("opcount", &self.opcount)] {
            let handle = probe.clone().map(|probe| {
                tracing::info!("Spawning {name} sampler...");
                tokio::spawn(probe_sampler(
                    ctx.clone(),
                    Arc::clone(&scenario.connector),
                    Arc::clone(&scenario.queue),
                    probe,
                    self.servers[0].clone(),
                    self.sample_period,
                ))
            });
            samplers.push((name, handle));
        }
        let progress = tokio::spawn(progress_reporter(
            ctx.clone(),
            Arc::clone(&scenario.generator),
            per_worker * workers as u64,
            self.sample_period,
            self.progress,
        ));

        tracing::info!(
            "Spawning {workers} workers ({} per server, {per_worker} ops each, {interval:?} apart)...",
            self.threads_per_server
        );
        let started = Instant::now();
        let handles = spawn_workers(
            Arc::clone(&scenario.generator),
            Arc::clone(&scenario.connector),
            &self.servers,
            self.threads_per_server,
            per_worker,
            interval,
        );

        tracing::info!("Running scenario: {}!", scenario.name);
        let mut stats = RunStats::new();
        let mut failure = None;
        for (i, res) in join_all(handles).await.into_iter().enumerate() {
            match res {
                Ok(Ok(worker)) => stats.merge(worker),
                Ok(Err(e)) => {
                    tracing::error!("Worker {i} failed: {e}");
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    // a panicked worker contributes nothing, the rest of the run stands
                    tracing::error!("Worker {i} panicked with error: {e}");
                }
            }
        }

        tracing::info!("Workers finished, signaling shutdown...");
        shutdown_tx.send(true).map_err(|_| Error::Shutdown)?;
        drop(ctx);

        for (name, handle) in samplers {
            let Some(handle) = handle else { continue };
            match handle.await {
                Ok(Ok(sampler)) => stats.merge(sampler),
                Ok(Err(e)) => {
                    tracing::error!("The {name} sampler failed: {e}");
                    failure.get_or_insert(e);
                }
                Err(e) => tracing::error!("The {name} sampler panicked with error: {e}"),
            }
        }
        if let Err(e) = progress.await {
            tracing::error!("Progress reporter panicked with error: {e}");
        }

        let elapsed = started.elapsed();
        let report = RunReport::new(scenario.name.as_str(), stats, elapsed, self.target_rate);
        tracing::info!(
            "Done running scenario: {}! {} ops in {:.2?} ({:.1} ops/s, {} failed)",
            scenario.name,
            report.issued,
            report.elapsed,
            report.throughput,
            report.failed
        );

        tracing::info!("Flushing sample logs...");
        scenario.queue.write_logfiles(&scenario.sink)?;

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

#[cfg(feature = "internals")]
pub use internals::*;

/// Task bodies and pacing helpers of the `PacedExecutor`.
mod internals {
    use super::*;
    use crate::rpq::RankedQueue;
    use tokio::{
        sync::watch::{Receiver, Sender, channel},
        task::JoinHandle,
    };

    /// Shared state handed to every auxiliary task.
    #[derive(Clone)]
    pub struct ExecutionContext {
        /// Flips to `true` once the auxiliary tasks should stop.
        pub shutdown: Receiver<bool>,
    }

    impl ExecutionContext {
        pub fn new() -> (Self, Sender<bool>) {
            let (tx, rx) = channel(false);
            (Self { shutdown: rx }, tx)
        }

        pub fn is_stopped(&self) -> bool {
            *self.shutdown.borrow()
        }

        /// Sleeps until `deadline` unless stopped first. Returns `true` if the
        /// caller should run another iteration.
        pub async fn wait_until(&mut self, deadline: Instant) -> bool {
            let woke = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => true,
                // a dropped sender also ends the wait
                _ = self.shutdown.wait_for(|stop| *stop) => false,
            };
            woke && !self.is_stopped()
        }
    }

    /// `start + t * step`, computed from the start every time so that rounding
    /// never accumulates.
    pub fn deadline(start: Instant, step: Duration, t: u64) -> Instant {
        let nanos = u64::try_from(step.as_nanos())
            .unwrap_or(u64::MAX)
            .saturating_mul(t);
        start + Duration::from_nanos(nanos)
    }

    /// Spawns `per_server` workers for every server, each issuing `ops`
    /// operations `interval` apart over its own connection.
    pub fn spawn_workers<G, K>(
        generator: Arc<G>,
        connector: Arc<K>,
        servers: &[ServerAddr],
        per_server: usize,
        ops: u64,
        interval: Duration,
    ) -> Vec<JoinHandle<Result<RunStats>>>
    where
        G: Generator,
        K: Connector,
    {
        servers
            .iter()
            .flat_map(|addr| std::iter::repeat_n(addr, per_server))
            .enumerate()
            .map(|(i, addr)| {
                let generator = Arc::clone(&generator);
                let connector = Arc::clone(&connector);
                let addr = addr.clone();
                tokio::spawn(async move {
                    let mut conn = connector.connect(&addr).await?;
                    tracing::debug!("Worker {i} connected to {addr}.");

                    let start = Instant::now();
                    let mut stats = RunStats::new();
                    for t in 1..=ops {
                        let outcome = generator.exec_one(&mut conn).await;
                        if let Err(e) = &outcome {
                            tracing::debug!("Worker {i}: operation {t} failed: {e}");
                        }
                        stats.consume(&outcome);
                        tokio::time::sleep_until(deadline(start, interval, t)).await;
                    }

                    tracing::debug!("Worker {i} shutting down.");
                    Ok(stats)
                })
            })
            .collect()
    }

    /// Issues `probe` against `primary` once per `period`; against `primary`
    /// and `shadow` concurrently when comparing. Counts diverging replies.
    pub async fn read_sampler<K: Connector>(
        mut ctx: ExecutionContext,
        connector: Arc<K>,
        queue: Arc<RankedQueue>,
        probe: Probe,
        primary: ServerAddr,
        shadow: Option<ServerAddr>,
        period: Duration,
    ) -> Result<RunStats> {
        let mut conn = connector.connect(&primary).await?;
        let mut shadow_conn = match &shadow {
            Some(addr) => Some(connector.connect(addr).await?),
            None => None,
        };
        tracing::debug!("Read sampler started.");

        let mut stats = RunStats::new();
        let start = Instant::now();
        let mut tick = 0;
        while !ctx.is_stopped() {
            match shadow_conn.as_mut() {
                None => {
                    if let Err(e) = probe.execute(&mut conn, &queue).await {
                        tracing::debug!("Read probe against {primary} failed: {e}");
                    }
                }
                Some(other) => {
                    let (left, right) =
                        tokio::join!(probe.fetch(&mut conn), probe.fetch(other));
                    // recorded in server order whichever reply came back first
                    for reading in [&left, &right].into_iter().flatten() {
                        reading.record(&queue);
                    }
                    match (left, right) {
                        (Ok(left), Ok(right)) => {
                            if left != right {
                                stats.divergences += 1;
                                tracing::warn!(
                                    "Servers diverged on {probe:?}: {left:?} vs {right:?}"
                                );
                            }
                        }
                        (Err(e), _) | (_, Err(e)) => {
                            tracing::debug!("Comparison probe failed: {e}");
                        }
                    }
                }
            }

            tick += 1;
            if !ctx.wait_until(deadline(start, period, tick)).await {
                break;
            }
        }

        tracing::debug!("Read sampler shutting down.");
        Ok(stats)
    }

    /// Issues `probe` against `target` once per `period`.
    pub async fn probe_sampler<K: Connector>(
        mut ctx: ExecutionContext,
        connector: Arc<K>,
        queue: Arc<RankedQueue>,
        probe: Probe,
        target: ServerAddr,
        period: Duration,
    ) -> Result<RunStats> {
        let mut conn = connector.connect(&target).await?;
        tracing::debug!("Sampler for {probe:?} started.");

        let start = Instant::now();
        let mut tick = 0;
        while !ctx.is_stopped() {
            if let Err(e) = probe.execute(&mut conn, &queue).await {
                tracing::debug!("{probe:?} against {target} failed: {e}");
            }
            tick += 1;
            if !ctx.wait_until(deadline(start, period, tick)).await {
                break;
            }
        }

        tracing::debug!("Sampler for {probe:?} shutting down.");
        Ok(RunStats::new())
    }

    /// Renders `generated / total` once per `period`, then a completed bar
    /// once stopped. Returns the final position.
    pub async fn progress_reporter<G: Generator>(
        mut ctx: ExecutionContext,
        generator: Arc<G>,
        total: u64,
        period: Duration,
        visible: bool,
    ) -> u64 {
        let bar = if visible {
            ProgressBar::new(total)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {pos}/{len} ({per_sec})")
        {
            bar.set_style(style.progress_chars("#>-"));
        }

        let start = Instant::now();
        let mut tick = 0;
        while !ctx.is_stopped() {
            bar.set_position(generator.generated().min(total));
            tick += 1;
            if !ctx.wait_until(deadline(start, period, tick)).await {
                break;
            }
        }

        bar.set_length(total);
        bar.set_position(total);
        bar.finish();
        bar.position()
    }
}
