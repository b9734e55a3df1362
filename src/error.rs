use thiserror::Error;

/// Everything that can go wrong while driving a benchmark run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The server answered with something we could not parse or did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to signal shutdown to sampling tasks")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, Error>;
