use std::{fmt::Debug, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::executor::Strategy;

/// A `Metric` is a single observation produced by one measured invocation.
///
/// Metrics are collected by an [`crate::Aggregate`], which keeps the raw
/// totals, and are only turned into averages and rates by a
/// [`crate::Report`].
///
/// ## Design principles
/// - **Small and plain:** a metric describes one invocation and nothing else.
/// - **Comparable:** [`PartialEq`] and [`PartialOrd`] allow sorting and
///   equality checks during analysis.
/// - **Thread-safe, clonable, serializable:** metrics may cross tasks and be
///   persisted as JSON.
pub trait Metric
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
}

/// Wall-clock time of one `for_each` over a workload, dispatch to join.
#[derive(Clone, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RunMetric {
    pub strategy: Strategy,
    pub workers: usize,
    pub items: usize,
    pub elapsed: Duration,
}

impl Metric for RunMetric {}
