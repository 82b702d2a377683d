use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fmt::Debug, time::Duration};

use crate::{Metric, executor::Strategy, metric::RunMetric};

/// The `Aggregate` trait defines how raw [`Metric`] values are collected and
/// combined into a mergeable representation.
///
/// Aggregates keep raw totals (counts, sums, extremes). Derived values such as
/// means and throughput belong in a [`crate::Report`], which is built from
/// the aggregate once collection is over.
///
/// # Implementor notes
/// - `merge` must be associative and commutative so partial aggregates can be
///   combined in any order.
/// - `new` must return the identity of `merge`.
pub trait Aggregate
where
    Self: Serialize + DeserializeOwned + PartialOrd + PartialEq + Send + Sync + Debug + Clone,
{
    /// The metric type this aggregate summarizes.
    type Metric: Metric;

    /// Create a new, empty instance of the aggregate.
    fn new() -> Self;

    /// Aggregate multiple metrics into the current instance.
    ///
    /// This default implementation calls [`Aggregate::consume`] for each metric.
    fn aggregate(&mut self, metrics: &[Self::Metric]) {
        metrics.iter().for_each(|m| self.consume(m));
    }

    /// Incorporate a single metric into the aggregate.
    fn consume(&mut self, metric: &Self::Metric);

    /// Combine two different aggregates into one.
    fn merge(&mut self, other: Self);
}

/// Repeated invocations of one strategy on one workload.
///
/// The identifying fields (`strategy`, `workers`, `items`) are taken from the
/// first metric seen; aggregating runs of different strategies together is
/// not meaningful.
#[derive(Clone, Debug, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RunAggregate {
    pub strategy: Option<Strategy>,
    pub workers: usize,
    pub items: usize,
    pub count: usize,
    pub total: Duration,
    pub min: Option<Duration>,
    pub max: Duration,
}

impl Aggregate for RunAggregate {
    type Metric = RunMetric;

    fn new() -> Self {
        RunAggregate::default()
    }

    fn consume(&mut self, metric: &Self::Metric) {
        if self.strategy.is_none() {
            self.strategy = Some(metric.strategy);
            self.workers = metric.workers;
            self.items = metric.items;
        }
        self.count += 1;
        self.total += metric.elapsed;
        self.min = Some(self.min.map_or(metric.elapsed, |m| m.min(metric.elapsed)));
        self.max = self.max.max(metric.elapsed);
    }

    fn merge(&mut self, other: Self) {
        if self.strategy.is_none() {
            self.strategy = other.strategy;
            self.workers = other.workers;
            self.items = other.items;
        }
        self.count += other.count;
        self.total += other.total;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = self.max.max(other.max);
    }
}
