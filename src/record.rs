use std::fmt::Debug;

use serde::{Serialize, de::DeserializeOwned};

use crate::macros::record;

/// A `Record` is one immutable row of a sample log.
///
/// Records are produced while the run is live, buffered in a
/// [`crate::SampleLog`] and written out by a [`crate::sink::Sink`] once the
/// run is over, one row per record in the order they were appended.
///
/// The [`record`] attribute derives everything a record needs:
///
/// ```rust
/// use rpqbench::{Record, macros::record};
///
/// #[record]
/// struct LatencySample {
///     micros: u64,
/// }
/// ```
pub trait Record
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// What the server reported as its top entry next to what the local ranked
/// queue held at the same moment.
#[record]
pub struct MaxSample {
    pub queried_id: i64,
    pub queried_weight: f64,
    pub top_id: i64,
    pub top_weight: f64,
}

/// Server-side memory footprint observed at a given working-set size.
#[record]
pub struct OverheadSample {
    pub size: u64,
    pub overhead: i64,
}

/// Operations the server reports having processed next to the operations the
/// local ranked queue has executed.
#[record]
pub struct OpCountSample {
    pub local_ops: u64,
    pub server_ops: i64,
}
