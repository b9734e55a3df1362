//! In-memory connections for exercising the executor without a server.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{
    connection::{Connection, Connector, Reply, ServerAddr},
    error::{Error, Result},
};

type Responder = dyn Fn(&ServerAddr, &[String]) -> Result<Reply> + Send + Sync;

#[derive(Debug, Clone)]
pub struct Call {
    pub addr: ServerAddr,
    pub conn: usize,
    pub args: Vec<String>,
    pub at: Instant,
}

#[derive(Clone)]
pub struct MockConnector {
    pub calls: Arc<Mutex<Vec<Call>>>,
    connects: Arc<AtomicUsize>,
    responder: Arc<Responder>,
    refuse_port: Option<u16>,
    slow_port: Option<(u16, Duration)>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::with_responder(|_, _| Ok(Reply::Int(1)))
    }

    pub fn with_responder(
        responder: impl Fn(&ServerAddr, &[String]) -> Result<Reply> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            connects: Arc::new(AtomicUsize::new(0)),
            responder: Arc::new(responder),
            refuse_port: None,
            slow_port: None,
        }
    }

    /// Makes every connect to `port` fail.
    pub fn refusing(mut self, port: u16) -> Self {
        self.refuse_port = Some(port);
        self
    }

    /// Makes every reply from `port` arrive `latency` after its request.
    pub fn delaying(mut self, port: u16, latency: Duration) -> Self {
        self.slow_port = Some((port, latency));
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Calls whose command name is `cmd`.
    pub fn calls_of(&self, cmd: &str) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.args.first().is_some_and(|a| a == cmd))
            .cloned()
            .collect()
    }
}

pub struct MockConnection {
    id: usize,
    addr: ServerAddr,
    calls: Arc<Mutex<Vec<Call>>>,
    responder: Arc<Responder>,
    latency: Duration,
}

impl Connection for MockConnection {
    async fn execute(&mut self, args: &[String]) -> Result<Reply> {
        self.calls.lock().push(Call {
            addr: self.addr.clone(),
            conn: self.id,
            args: args.to_vec(),
            at: Instant::now(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.responder)(&self.addr, args)
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    async fn connect(&self, addr: &ServerAddr) -> Result<Self::Conn> {
        if self.refuse_port == Some(addr.port) {
            return Err(Error::Connect {
                addr: addr.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        let id = self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            id,
            addr: addr.clone(),
            calls: Arc::clone(&self.calls),
            responder: Arc::clone(&self.responder),
            latency: self
                .slow_port
                .filter(|(port, _)| *port == addr.port)
                .map_or(Duration::ZERO, |(_, latency)| latency),
        })
    }
}
