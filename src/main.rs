use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rpqbench::{
    Executor, RankedQueue, Reporter, Scenario,
    config::BenchConfig,
    connection::TcpConnector,
    generator::ZSetGenerator,
    report::StdoutReporter,
    sink::CsvSink,
};

/// Samplers and the progress reporter run next to the workers.
const AUXILIARY_TASKS: usize = 3;

fn main() -> anyhow::Result<()> {
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BenchConfig::parse();
    config.validate()?;

    // one OS thread per task so that workers never wait on each other for a core
    let threads = (config.total_workers() + AUXILIARY_TASKS).max(num_cpus::get());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("rpqbench-worker")
        .worker_threads(threads)
        .build()
        .context("failed to initialize tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: BenchConfig) -> anyhow::Result<()> {
    tracing::info!(
        "Benchmark config: {} ops at {} ops/s against {} server(s) from {}:{}, {} workers each",
        config.total_ops,
        config.rate,
        config.servers,
        config.host,
        config.port,
        config.threads_per_server
    );

    let queue = Arc::new(RankedQueue::new());
    let scenario = Scenario::builder()
        .name(format!("{} @ {}", config.key, config.host))
        .generator(Arc::new(ZSetGenerator::new(
            Arc::clone(&queue),
            config.key.clone(),
            config.max_id,
        )))
        .connector(Arc::new(TcpConnector))
        .queue(queue)
        .sink(CsvSink::new(&config.out_dir))
        .build();

    let report = config.executor()?.exec(&scenario).await?;
    StdoutReporter.report(&report).await?;
    Ok(())
}
