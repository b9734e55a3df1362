use std::path::PathBuf;

use clap::Parser;

use crate::{
    connection::ServerAddr,
    error::{Error, Result},
    executor::PacedExecutor,
    probe::Probe,
};

/// Open-loop load generator tracking the top entry of a ranked working set.
#[derive(Debug, Clone, Parser)]
#[command(name = "rpqbench", version, about)]
pub struct BenchConfig {
    /// Operations to issue across all workers
    #[arg(long, default_value_t = 1_000_000)]
    pub total_ops: u64,

    /// Target operations per second across all workers
    #[arg(long, default_value_t = 10_000.0)]
    pub rate: f64,

    /// Number of servers; server i listens on `port + i`
    #[arg(long, default_value_t = 1)]
    pub servers: u16,

    /// Workers (and connections) per server
    #[arg(long, default_value_t = 4)]
    pub threads_per_server: usize,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port of the first server
    #[arg(long, default_value_t = 6379)]
    pub port: u16,

    /// Issue the read probe against the first two servers and count diverging replies
    #[arg(long)]
    pub compare: bool,

    /// Sample the server's top entry once per second
    #[arg(long)]
    pub read_probe: bool,

    /// Sample the server's memory usage once per second
    #[arg(long)]
    pub overhead_probe: bool,

    /// Sample the server's processed-commands counter once per second
    #[arg(long)]
    pub opcount_probe: bool,

    /// Sorted-set key the workload writes to
    #[arg(long, default_value = "rpq")]
    pub key: String,

    /// Generated ids are drawn from [0, max_id)
    #[arg(long, default_value_t = 100_000)]
    pub max_id: i64,

    /// Directory receiving max.csv and ovhd.csv
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Do not draw the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl BenchConfig {
    pub fn server_addrs(&self) -> Result<Vec<ServerAddr>> {
        (0..self.servers)
            .map(|i| {
                self.port
                    .checked_add(i)
                    .map(|port| ServerAddr::new(self.host.clone(), port))
                    .ok_or_else(|| {
                        Error::Config(format!("server {i} would listen past port 65535"))
                    })
            })
            .collect()
    }

    pub fn total_workers(&self) -> usize {
        usize::from(self.servers) * self.threads_per_server
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_id <= 0 {
            return Err(Error::Config("max id must be positive".into()));
        }
        if self.compare && !self.read_probe {
            return Err(Error::Config("--compare requires --read-probe".into()));
        }
        self.executor()?.validate()
    }

    pub fn executor(&self) -> Result<PacedExecutor> {
        Ok(PacedExecutor::builder()
            .servers(self.server_addrs()?)
            .threads_per_server(self.threads_per_server)
            .total_ops(self.total_ops)
            .target_rate(self.rate)
            .read(self.read_probe.then(|| Probe::read_max(&self.key)))
            .overhead(self.overhead_probe.then(|| Probe::overhead(&self.key)))
            .opcount(self.opcount_probe.then(Probe::opcount))
            .compare(self.compare)
            .progress(!self.no_progress)
            .build())
    }
}
