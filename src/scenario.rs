use std::sync::Arc;

use typed_builder::TypedBuilder;

use crate::{connection::Connector, generator::Generator, rpq::RankedQueue, sink::Sink};

/// Everything an executor needs to know about *what* to run.
///
/// The scenario names the run, supplies the operation generator and the way to
/// reach the servers, owns the ranked queue the generator and probes feed, and
/// says where the sample logs go once the run is over. *How* it runs (rates,
/// worker counts, probes) is the executor's business.
#[derive(TypedBuilder)]
pub struct Scenario<G, K, S>
where
    G: Generator,
    K: Connector,
    S: Sink,
{
    #[builder(setter(into))]
    pub name: String,
    pub generator: Arc<G>,
    pub connector: Arc<K>,
    pub queue: Arc<RankedQueue>,
    pub sink: S,
}
