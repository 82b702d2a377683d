use std::{io, path::PathBuf};

use thiserror::Error;

use crate::executor::Strategy;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reported once per run, after the join, however many units failed.
    #[error("{strategy}: {tasks} task(s) panicked")]
    TaskPanicked { strategy: Strategy, tasks: usize },

    #[error("{strategy}: tasks were cancelled by runtime shutdown")]
    RuntimeShutdown { strategy: Strategy },

    #[error("engine has been shut down")]
    EngineShutdown,

    #[error("{strategy} output differs from {reference} at index {index}: {got} != {expected}")]
    OutputMismatch {
        strategy: Strategy,
        reference: Strategy,
        index: usize,
        got: f64,
        expected: f64,
    },

    #[error("{what} {}: {source}", .path.display())]
    Instrumentation {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[cfg(feature = "profiling")]
    #[error("cpu profiler: {0}")]
    Profiler(#[from] pprof::Error),

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
}
