use crate::{
    connection::{Connection, Reply},
    error::{Error, Result},
    rpq::{EMPTY_TOP, RankedQueue},
};

/// Periodic measurement issued by the samplers.
///
/// A probe sends one command and turns the reply into a [`Reading`], which is
/// then recorded into the ranked queue's sample logs. Fetching and recording
/// are separate steps so that readings from several servers can be recorded
/// in a fixed order. A disabled probe is simply `None` in the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Asks the server for its top member and logs it with
    /// [`RankedQueue::max`].
    ReadMax { key: String },
    /// Asks the server how much memory the key costs and logs it with
    /// [`RankedQueue::overhead`].
    Overhead { key: String },
    /// Asks the server how many commands it has processed and logs it with
    /// [`RankedQueue::opcount`].
    OpCount,
}

/// What a probe extracted from one reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Top { id: i64, weight: f64 },
    Bytes(i64),
    Ops(i64),
}

impl Reading {
    /// Appends the reading to the matching sample log of `queue`.
    pub fn record(self, queue: &RankedQueue) {
        match self {
            Reading::Top { id, weight } => queue.max(id, weight),
            Reading::Bytes(bytes) => queue.overhead(bytes),
            Reading::Ops(ops) => queue.opcount(ops),
        }
    }
}

impl Probe {
    pub fn read_max(key: impl Into<String>) -> Self {
        Probe::ReadMax { key: key.into() }
    }

    pub fn overhead(key: impl Into<String>) -> Self {
        Probe::Overhead { key: key.into() }
    }

    pub fn opcount() -> Self {
        Probe::OpCount
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            Probe::ReadMax { key } => vec![
                "ZREVRANGE".into(),
                key.clone(),
                "0".into(),
                "0".into(),
                "WITHSCORES".into(),
            ],
            Probe::Overhead { key } => vec!["MEMORY".into(), "USAGE".into(), key.clone()],
            Probe::OpCount => vec!["INFO".into(), "stats".into()],
        }
    }

    /// Issues the probe and parses the reply without touching any log.
    pub async fn fetch<C: Connection>(&self, conn: &mut C) -> Result<Reading> {
        let reply = conn.execute(&self.args()).await?;
        match self {
            Probe::ReadMax { .. } => {
                let (id, weight) = parse_top(&reply)?;
                Ok(Reading::Top { id, weight })
            }
            Probe::Overhead { .. } => match &reply {
                Reply::Nil => Ok(Reading::Bytes(0)),
                other => other.to_i64().map(Reading::Bytes),
            },
            Probe::OpCount => parse_processed(&reply).map(Reading::Ops),
        }
    }

    /// Fetches a reading and records it right away.
    pub async fn execute<C: Connection>(
        &self,
        conn: &mut C,
        queue: &RankedQueue,
    ) -> Result<Reading> {
        let reading = self.fetch(conn).await?;
        reading.record(queue);
        Ok(reading)
    }
}

/// `[member, score]` of a `WITHSCORES` range; the empty sentinel for an
/// empty or missing set.
fn parse_top(reply: &Reply) -> Result<(i64, f64)> {
    match reply {
        Reply::Nil => Ok(EMPTY_TOP),
        Reply::Array(items) => match items.as_slice() {
            [] => Ok(EMPTY_TOP),
            [member, score, ..] => Ok((member.to_i64()?, score.to_f64()?)),
            _ => Err(Error::Protocol(format!("short range reply {items:?}"))),
        },
        other => Err(Error::Protocol(format!("expected range reply, got {other:?}"))),
    }
}

/// `total_commands_processed` out of an `INFO stats` report.
fn parse_processed(reply: &Reply) -> Result<i64> {
    let Reply::Bulk(info) = reply else {
        return Err(Error::Protocol(format!("expected INFO report, got {reply:?}")));
    };
    let value = info
        .lines()
        .find_map(|line| line.strip_prefix("total_commands_processed:"))
        .ok_or_else(|| Error::Protocol("INFO report lacks total_commands_processed".into()))?;
    value
        .trim()
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid command count {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        MaxSample, OpCountSample, OverheadSample,
        connection::{Connector, ServerAddr},
        testing::MockConnector,
    };

    fn bulk(s: &str) -> Reply {
        Reply::Bulk(s.into())
    }

    #[tokio::test]
    async fn read_max_logs_server_top_against_local_top() {
        let queue = RankedQueue::new();
        queue.add(5, 40.0);
        queue.add(6, 10.0);
        let connector =
            MockConnector::with_responder(|_, _| Ok(Reply::Array(vec![bulk("6"), bulk("12.5")])));
        let mut conn = connector.connect(&ServerAddr::new("h", 1)).await.unwrap();

        Probe::read_max("rpq").execute(&mut conn, &queue).await.unwrap();

        assert_eq!(
            queue.max_samples(),
            vec![MaxSample {
                queried_id: 6,
                queried_weight: 12.5,
                top_id: 5,
                top_weight: 40.0,
            }]
        );
        assert_eq!(
            connector.calls()[0].args,
            ["ZREVRANGE", "rpq", "0", "0", "WITHSCORES"]
        );
    }

    #[tokio::test]
    async fn read_max_of_empty_set_uses_sentinel() {
        let queue = RankedQueue::new();
        let connector = MockConnector::with_responder(|_, _| Ok(Reply::Array(vec![])));
        let mut conn = connector.connect(&ServerAddr::new("h", 1)).await.unwrap();

        Probe::read_max("rpq").execute(&mut conn, &queue).await.unwrap();

        let sample = queue.max_samples()[0];
        assert_eq!((sample.queried_id, sample.queried_weight), EMPTY_TOP);
        assert_eq!((sample.top_id, sample.top_weight), EMPTY_TOP);
    }

    #[tokio::test]
    async fn overhead_logs_memory_usage() {
        let queue = RankedQueue::new();
        queue.add(1, 1.0);
        queue.add(2, 1.0);
        let connector = MockConnector::with_responder(|_, args| {
            Ok(if args[2] == "missing" {
                Reply::Nil
            } else {
                Reply::Int(2048)
            })
        });
        let mut conn = connector.connect(&ServerAddr::new("h", 1)).await.unwrap();

        Probe::overhead("rpq").execute(&mut conn, &queue).await.unwrap();
        Probe::overhead("missing").execute(&mut conn, &queue).await.unwrap();

        assert_eq!(
            queue.overhead_samples(),
            vec![
                OverheadSample {
                    size: 2,
                    overhead: 2048
                },
                OverheadSample {
                    size: 2,
                    overhead: 0
                },
            ]
        );
    }

    #[tokio::test]
    async fn malformed_reply_logs_nothing() {
        let queue = RankedQueue::new();
        let connector = MockConnector::with_responder(|_, _| Ok(Reply::Status("OK".into())));
        let mut conn = connector.connect(&ServerAddr::new("h", 1)).await.unwrap();

        let outcome = Probe::read_max("rpq").execute(&mut conn, &queue).await;
        assert!(matches!(outcome, Err(Error::Protocol(_))));
        assert!(queue.max_samples().is_empty());
    }

    #[tokio::test]
    async fn opcount_logs_server_counter_against_local_ops() {
        let queue = RankedQueue::new();
        queue.add(1, 1.0);
        queue.rem(1);
        queue.rem(1);
        let connector = MockConnector::with_responder(|_, _| {
            Ok(bulk(
                "# Stats\r\ntotal_connections_received:3\r\ntotal_commands_processed:1234\r\n",
            ))
        });
        let mut conn = connector.connect(&ServerAddr::new("h", 1)).await.unwrap();

        let reading = Probe::opcount().execute(&mut conn, &queue).await.unwrap();

        assert_eq!(reading, Reading::Ops(1234));
        assert_eq!(
            queue.opcount_samples(),
            vec![OpCountSample {
                local_ops: 3,
                server_ops: 1234
            }]
        );
        assert_eq!(connector.calls()[0].args, ["INFO", "stats"]);
    }

    #[tokio::test]
    async fn opcount_without_counter_is_a_protocol_error() {
        let queue = RankedQueue::new();
        let connector = MockConnector::with_responder(|_, _| Ok(bulk("# Stats\r\n")));
        let mut conn = connector.connect(&ServerAddr::new("h", 1)).await.unwrap();

        let outcome = Probe::opcount().execute(&mut conn, &queue).await;
        assert!(matches!(outcome, Err(Error::Protocol(_))));
        assert!(queue.opcount_samples().is_empty());
    }

    #[tokio::test]
    async fn fetch_leaves_logs_alone_until_recorded() {
        let queue = RankedQueue::new();
        let connector =
            MockConnector::with_responder(|_, _| Ok(Reply::Array(vec![bulk("3"), bulk("9")])));
        let mut conn = connector.connect(&ServerAddr::new("h", 1)).await.unwrap();

        let reading = Probe::read_max("rpq").fetch(&mut conn).await.unwrap();
        assert_eq!(reading, Reading::Top { id: 3, weight: 9.0 });
        assert!(queue.max_samples().is_empty());

        reading.record(&queue);
        assert_eq!(queue.max_samples().len(), 1);
    }
}
