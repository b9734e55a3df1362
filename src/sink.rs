use std::path::PathBuf;

use crate::{Record, error::Result};

/// Persistence boundary for sample logs.
pub trait Sink: Send + Sync {
    /// Writes `rows` in order as the table called `name`.
    fn write<R: Record>(&self, name: &str, rows: &[R]) -> Result<()>;
}

/// Writes each table as a header-less CSV file named after it inside `dir`.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Sink for CsvSink {
    fn write<R: Record>(&self, name: &str, rows: &[R]) -> Result<()> {
        let path = self.dir.join(name);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        tracing::info!("Wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}
