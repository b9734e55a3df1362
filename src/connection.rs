//! Connections to the servers under test.
//!
//! The executor only relies on [`Connection`] and [`Connector`]; the RESP
//! implementation below is what the binary uses to talk to Redis-compatible
//! servers. Requests are arrays of bulk strings, replies are decoded into a
//! [`Reply`]. Error replies come back as [`Error::Server`] so callers can tell
//! them apart from transport and parse failures.

use std::fmt;

use futures::future::BoxFuture;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Status(String),
    Int(i64),
    Bulk(String),
    Array(Vec<Reply>),
}

impl Reply {
    /// Integer value of an integer reply or a numeric bulk string.
    pub fn to_i64(&self) -> Result<i64> {
        match self {
            Reply::Int(n) => Ok(*n),
            Reply::Bulk(s) => s
                .parse()
                .map_err(|_| Error::Protocol(format!("expected integer, got {s:?}"))),
            other => Err(Error::Protocol(format!("expected integer, got {other:?}"))),
        }
    }

    /// Float value of a numeric bulk string or an integer reply.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Reply::Int(n) => Ok(*n as f64),
            Reply::Bulk(s) => s
                .parse()
                .map_err(|_| Error::Protocol(format!("expected float, got {s:?}"))),
            other => Err(Error::Protocol(format!("expected float, got {other:?}"))),
        }
    }
}

/// One open connection to a server. Requests are executed one at a time.
pub trait Connection: Send + 'static {
    fn execute(&mut self, args: &[String]) -> impl Future<Output = Result<Reply>> + Send;
}

/// Opens connections. Every worker and sampler asks for its own.
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    fn connect(&self, addr: &ServerAddr) -> impl Future<Output = Result<Self::Conn>> + Send;
}

/// Opens [`RespConnection`]s over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Conn = RespConnection<TcpStream>;

    async fn connect(&self, addr: &ServerAddr) -> Result<Self::Conn> {
        let stream = TcpStream::connect((addr.host.as_str(), addr.port))
            .await
            .map_err(|source| Error::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(RespConnection::new(stream))
    }
}

/// Longest bulk string or array a server may announce, matching the server's
/// own `proto-max-bulk-len` default.
const MAX_LEN: i64 = 512 * 1024 * 1024;

/// Array slots reserved up front, however many the server announces.
const ARRAY_PREALLOC: usize = 64;

/// RESP2 client over any byte stream.
pub struct RespConnection<S> {
    stream: BufReader<S>,
    out: Vec<u8>,
}

impl<S> RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            out: Vec::with_capacity(256),
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.stream.read_line(&mut line).await? == 0 {
            return Err(Error::Protocol("connection closed by server".into()));
        }
        if !line.ends_with("\r\n") {
            return Err(Error::Protocol(format!("unterminated line {line:?}")));
        }
        line.truncate(line.len() - 2);
        Ok(line)
    }

    fn read_reply(&mut self) -> BoxFuture<'_, Result<Reply>> {
        Box::pin(async move {
            let line = self.read_line().await?;
            let mut chars = line.chars();
            let kind = chars.next();
            let rest = chars.as_str();

            match kind {
                Some('+') => Ok(Reply::Status(rest.to_owned())),
                Some('-') => Err(Error::Server(rest.to_owned())),
                Some(':') => Ok(Reply::Int(parse_len(rest)?)),
                Some('$') => {
                    let Some(len) = parse_bounded_len(rest)? else {
                        return Ok(Reply::Nil);
                    };
                    let mut buf = vec![0; len + 2];
                    self.stream.read_exact(&mut buf).await?;
                    if !buf.ends_with(b"\r\n") {
                        return Err(Error::Protocol("unterminated bulk string".into()));
                    }
                    buf.truncate(len);
                    String::from_utf8(buf)
                        .map(Reply::Bulk)
                        .map_err(|e| Error::Protocol(format!("bulk string is not UTF-8: {e}")))
                }
                Some('*') => {
                    let Some(len) = parse_bounded_len(rest)? else {
                        return Ok(Reply::Nil);
                    };
                    let mut items = Vec::with_capacity(len.min(ARRAY_PREALLOC));
                    for _ in 0..len {
                        items.push(self.read_reply().await?);
                    }
                    Ok(Reply::Array(items))
                }
                _ => Err(Error::Protocol(format!("unknown reply {line:?}"))),
            }
        })
    }
}

impl<S> Connection for RespConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn execute(&mut self, args: &[String]) -> Result<Reply> {
        self.out.clear();
        encode(&mut self.out, args);
        self.stream.get_mut().write_all(&self.out).await?;
        self.read_reply().await
    }
}

fn encode(out: &mut Vec<u8>, args: &[String]) {
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

fn parse_len(s: &str) -> Result<i64> {
    s.parse()
        .map_err(|_| Error::Protocol(format!("invalid length {s:?}")))
}

/// Length of a bulk string or array; `None` for the nil marker.
fn parse_bounded_len(s: &str) -> Result<Option<usize>> {
    match parse_len(s)? {
        len if len < 0 => Ok(None),
        len if len > MAX_LEN => Err(Error::Protocol(format!(
            "announced length {len} exceeds {MAX_LEN}"
        ))),
        len => usize::try_from(len)
            .map(Some)
            .map_err(|_| Error::Protocol(format!("invalid length {len}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    /// Runs one request against a fake server that answers with `response`,
    /// returning the reply and the raw request bytes.
    async fn roundtrip(request: &[&str], response: &'static [u8]) -> (Result<Reply>, Vec<u8>) {
        let (client, mut server) = duplex(4096);
        let expected = {
            let mut buf = Vec::new();
            encode(&mut buf, &args(request));
            buf.len()
        };
        let fake = tokio::spawn(async move {
            let mut seen = vec![0; expected];
            server.read_exact(&mut seen).await.unwrap();
            server.write_all(response).await.unwrap();
            // keep the stream open until the client has read the reply
            let mut rest = Vec::new();
            let _ = server.read_to_end(&mut rest).await;
            seen
        });

        let mut conn = RespConnection::new(client);
        let reply = conn.execute(&args(request)).await;
        drop(conn);
        (reply, fake.await.unwrap())
    }

    #[tokio::test]
    async fn encodes_requests_as_bulk_arrays() {
        let (reply, seen) = roundtrip(&["ZREM", "rpq", "42"], b":1\r\n").await;
        assert_eq!(reply.unwrap(), Reply::Int(1));
        assert_eq!(seen, b"*3\r\n$4\r\nZREM\r\n$3\r\nrpq\r\n$2\r\n42\r\n");
    }

    #[tokio::test]
    async fn decodes_nested_arrays_and_nil() {
        let (reply, _) = roundtrip(
            &["ZREVRANGE", "rpq", "0", "0", "WITHSCORES"],
            b"*3\r\n$2\r\n17\r\n$4\r\n12.5\r\n*2\r\n$-1\r\n+OK\r\n",
        )
        .await;
        assert_eq!(
            reply.unwrap(),
            Reply::Array(vec![
                Reply::Bulk("17".into()),
                Reply::Bulk("12.5".into()),
                Reply::Array(vec![Reply::Nil, Reply::Status("OK".into())]),
            ])
        );
    }

    #[tokio::test]
    async fn error_reply_is_a_server_error() {
        let (reply, _) = roundtrip(&["BOGUS"], b"-ERR unknown command\r\n").await;
        match reply {
            Err(Error::Server(msg)) => assert_eq!(msg, "ERR unknown command"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_is_a_protocol_error() {
        let (reply, _) = roundtrip(&["PING"], b"?what\r\n").await;
        assert!(matches!(reply, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn oversized_lengths_are_protocol_errors() {
        let (reply, _) = roundtrip(&["PING"], b"*9223372036854775807\r\n").await;
        assert!(matches!(reply, Err(Error::Protocol(_))));

        let (reply, _) = roundtrip(&["PING"], b"$9223372036854775807\r\n").await;
        assert!(matches!(reply, Err(Error::Protocol(_))));

        let (reply, _) = roundtrip(&["PING"], b"$536870913\r\n").await;
        assert!(matches!(reply, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn non_utf8_bulk_is_a_protocol_error() {
        let (reply, _) = roundtrip(&["GET", "k"], b"$2\r\n\xff\xfe\r\n").await;
        assert!(matches!(reply, Err(Error::Protocol(_))));
    }

    #[test]
    fn numeric_conversions() {
        assert_eq!(Reply::Bulk("-3".into()).to_i64().unwrap(), -3);
        assert_eq!(Reply::Int(4).to_f64().unwrap(), 4.0);
        assert_eq!(Reply::Bulk("2.25".into()).to_f64().unwrap(), 2.25);
        assert!(Reply::Nil.to_i64().is_err());
        assert!(Reply::Bulk("x".into()).to_f64().is_err());
    }
}
