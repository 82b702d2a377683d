//! Parloop: a microbenchmark harness for parallel-for work distribution.
//!
//! Parloop applies a cheap numeric kernel (normalized `sinc`) to every element
//! of a large random vector and times how long different work-distribution
//! strategies take to cover the whole range. Every strategy runs the same
//! body over the same inputs, so the only thing that varies between them is
//! how indices are handed to concurrent tasks.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Workload`]: the shared input vector and the output slots it is mapped
//!   into. Outputs start as NaN so a slot that was never written is visible.
//! - [`Scenario`]: a workload plus the per-element operation.
//! - [`Executor`]: a parallel-for. Implementations are [`SerialExecutor`],
//!   [`PerItemExecutor`], [`StridedExecutor`], [`ContiguousExecutor`] and the
//!   standing-pool [`Engine`]. Each produces one [`RunMetric`] per timed call.
//! - [`Aggregate`]: collects metrics of repeated calls ([`RunAggregate`]).
//! - [`Report`]: derived view of an aggregate (mean, throughput, sample
//!   values), consumed by a [`Reporter`] such as [`StdoutReporter`] or
//!   [`JsonReporter`].
//! - [`harness::run`]: glues the above together for one [`Config`].
//!
//! # Concurrency model
//!
//! Units of work are Tokio tasks. The number of OS threads they actually run
//! on is the worker count of the runtime they are spawned on; the `parloop`
//! binary builds a multi-thread runtime with exactly `workers` threads.
//!
//! # Example
//!
//! ```rust
//! use parloop::{Executor, Scenario, StridedExecutor, Workload};
//!
//! #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! async fn main() -> parloop::Result<()> {
//!     let scenario = Scenario::builder()
//!         .name("sinc")
//!         .workload(Workload::generate(10_000, 1))
//!         .build();
//!     let executor = StridedExecutor::builder().workers(2).build();
//!
//!     let metric = executor.exec(&scenario).await?;
//!     assert_eq!(metric.items, 10_000);
//!     assert!(scenario.workload().outputs().to_vec().iter().all(|v| !v.is_nan()));
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//! - `profiling`: CPU profiling through `pprof`, written as a flamegraph.

/// Metric aggregators
pub mod aggregate;
/// Run configuration
pub mod config;
/// Standing worker pool
pub mod engine;
mod error;
/// Work-distribution strategies
pub mod executor;
/// Glue for one benchmark run
pub mod harness;
/// Trace and profile sessions
pub mod instrument;
/// The per-element numeric kernel
pub mod kernel;
/// Single measurements
pub mod metric;
/// Range partitioning
pub mod partition;
/// Reports and Reporters
pub mod report;
/// Workload plus operation
pub mod scenario;
/// Completion barrier
pub mod sync;
/// Input and output arrays
pub mod workload;

pub use aggregate::{Aggregate, RunAggregate};
pub use config::{Config, OutputFormat};
pub use engine::{Engine, EngineOptions};
pub use error::{Error, Result};
pub use executor::{
    AnyExecutor, ContiguousExecutor, Executor, PerItemExecutor, SerialExecutor, Strategy,
    StridedExecutor,
};
pub use metric::{Metric, RunMetric};
pub use report::{JsonReporter, Report, Reporter, RunReport, StdoutReporter};
pub use scenario::Scenario;
pub use workload::Workload;
