//! Executor: the work-distribution strategies
//!
//! An [`Executor`] runs a body once for every index of `[0, n)` and returns
//! only after every unit has completed. Executors differ in how the indices
//! are handed to concurrent tasks:
//!
//! - [`SerialExecutor`]: a plain loop on the calling task. Baseline and
//!   correctness reference.
//! - [`PerItemExecutor`]: one task per index, joined through a
//!   [`WaitGroup`](crate::sync::WaitGroup). Optionally bounded by a semaphore.
//! - [`StridedExecutor`]: one task per worker, worker `k` takes
//!   `k, k + w, k + 2w, ...`.
//! - [`ContiguousExecutor`]: one task per worker, worker `k` takes the
//!   contiguous block from [`compute_block`](crate::partition::compute_block).
//! - [`Engine`](crate::engine::Engine): a standing pool reused across calls.
//!
//! Tasks are spawned on the ambient Tokio runtime, so the number of threads
//! they actually run on is the runtime's worker count. The harness builds that
//! runtime with exactly `workers` threads.
//!
//! # Output ownership
//! Bodies write to disjoint slots: every index is handed to exactly one unit,
//! so no two tasks ever touch the same slot during one call. The join at the
//! end of `for_each` is what makes those writes visible to the caller.
//!
//! # Failure
//! A panicking body does not stop the other units of a per-run executor. The
//! executor waits for all of them, then reports a single
//! [`Error::TaskPanicked`](crate::Error::TaskPanicked) carrying the number of
//! failed tasks.
pub mod contiguous;
pub mod per_item;
pub mod serial;
pub mod strided;

pub use contiguous::ContiguousExecutor;
pub use per_item::PerItemExecutor;
pub use serial::SerialExecutor;
pub use strided::StridedExecutor;

use std::{fmt, time::Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{
    Error,
    Result,
    config::Config,
    engine::{Engine, EngineOptions},
    metric::RunMetric,
    scenario::Scenario,
};

/// The work-distribution policies the harness can compare.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Serial,
    PerItem,
    Strided,
    Contiguous,
    Engine,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Serial,
        Strategy::PerItem,
        Strategy::Strided,
        Strategy::Contiguous,
        Strategy::Engine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Serial => "serial",
            Strategy::PerItem => "per-item",
            Strategy::Strided => "strided",
            Strategy::Contiguous => "contiguous",
            Strategy::Engine => "engine",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parallel-for: runs `body(i)` exactly once for each `i` in `[0, n)`.
///
/// Implementations must not return before every unit has completed, and must
/// hand each index to exactly one unit.
pub trait Executor
where
    Self: Send + Sync,
{
    /// Which policy this executor implements.
    fn strategy(&self) -> Strategy;

    /// Configured degree of parallelism.
    fn workers(&self) -> usize;

    /// Run `body` over `[0, n)` and wait for all of it.
    fn for_each<F>(&self, n: usize, body: F) -> impl Future<Output = Result<()>> + Send
    where
        F: Fn(usize) + Send + Sync + 'static;

    /// Apply the scenario's operation over its workload, timing only the
    /// dispatch and join.
    fn exec(&self, scenario: &Scenario) -> impl Future<Output = Result<RunMetric>> + Send {
        async move {
            let items = scenario.workload().len();
            let body = scenario.body();

            let start = Instant::now();
            self.for_each(items, body).await?;
            let elapsed = start.elapsed();

            tracing::debug!(
                "{}: {} items on {} workers in {:?}",
                self.strategy(),
                items,
                self.workers(),
                elapsed
            );
            Ok(RunMetric {
                strategy: self.strategy(),
                workers: self.workers(),
                items,
                elapsed,
            })
        }
    }
}

/// Runtime-selected executor.
pub enum AnyExecutor {
    Serial(SerialExecutor),
    PerItem(PerItemExecutor),
    Strided(StridedExecutor),
    Contiguous(ContiguousExecutor),
    Engine(Engine),
}

impl AnyExecutor {
    /// Builds the executor for `strategy` from the run configuration.
    ///
    /// Must be called from within a Tokio runtime: the engine spawns its
    /// workers immediately.
    pub fn new(strategy: Strategy, config: &Config) -> Self {
        match strategy {
            Strategy::Serial => Self::Serial(SerialExecutor),
            Strategy::PerItem => Self::PerItem(
                PerItemExecutor::builder()
                    .workers(config.workers)
                    .max_in_flight(config.max_in_flight)
                    .build(),
            ),
            Strategy::Strided => {
                Self::Strided(StridedExecutor::builder().workers(config.workers).build())
            }
            Strategy::Contiguous => {
                Self::Contiguous(ContiguousExecutor::builder().workers(config.workers).build())
            }
            Strategy::Engine => Self::Engine(
                EngineOptions::builder()
                    .workers(config.workers)
                    .grain(config.grain)
                    .build(),
            ),
        }
    }

    /// Stops background workers, if this executor has any.
    pub async fn shutdown(&self) {
        if let Self::Engine(engine) = self {
            engine.shutdown().await;
        }
    }
}

impl Executor for AnyExecutor {
    fn strategy(&self) -> Strategy {
        match self {
            Self::Serial(e) => e.strategy(),
            Self::PerItem(e) => e.strategy(),
            Self::Strided(e) => e.strategy(),
            Self::Contiguous(e) => e.strategy(),
            Self::Engine(e) => e.strategy(),
        }
    }

    fn workers(&self) -> usize {
        match self {
            Self::Serial(e) => e.workers(),
            Self::PerItem(e) => e.workers(),
            Self::Strided(e) => e.workers(),
            Self::Contiguous(e) => e.workers(),
            Self::Engine(e) => e.workers(),
        }
    }

    async fn for_each<F>(&self, n: usize, body: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        match self {
            Self::Serial(e) => e.for_each(n, body).await,
            Self::PerItem(e) => e.for_each(n, body).await,
            Self::Strided(e) => e.for_each(n, body).await,
            Self::Contiguous(e) => e.for_each(n, body).await,
            Self::Engine(e) => e.for_each(n, body).await,
        }
    }
}

/// Rejects a zero worker count before anything is spawned.
pub(crate) fn check_workers(workers: usize) -> Result<()> {
    if workers == 0 {
        return Err(Error::InvalidConfig(
            "worker count must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Joins one task per worker and folds their failures into a single error.
pub(crate) async fn join_workers(strategy: Strategy, handles: Vec<JoinHandle<()>>) -> Result<()> {
    let mut panicked = 0;
    let mut cancelled = false;

    for res in join_all(handles).await {
        match res {
            Ok(()) => {}
            Err(e) if e.is_panic() => {
                tracing::error!("{strategy} worker panicked: {e}");
                panicked += 1;
            }
            Err(_) => cancelled = true,
        }
    }

    if panicked > 0 {
        return Err(Error::TaskPanicked {
            strategy,
            tasks: panicked,
        });
    }
    if cancelled {
        return Err(Error::RuntimeShutdown { strategy });
    }
    Ok(())
}
