use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{Error, Result, executor::Strategy};

/// How reports are written to stdout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `Duration` debug form plus optional sample lines.
    #[default]
    Text,
    /// One JSON object per report.
    Json,
}

/// Everything one harness run needs.
///
/// ```rust
/// use parloop::{Config, Strategy};
///
/// let config = Config::builder()
///     .items(1_000)
///     .workers(4)
///     .strategies(vec![Strategy::Strided])
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct Config {
    /// Length of the input and output vectors.
    #[builder(default = 10_000_000)]
    pub items: usize,
    /// Runtime threads, and the degree of parallelism of every executor.
    #[builder(default = num_cpus::get())]
    pub workers: usize,
    /// Seed for input generation. Equal seeds give equal inputs.
    #[builder(default = 1)]
    pub seed: u64,
    /// Leading inputs and outputs echoed after each report.
    #[builder(default)]
    pub print_some: usize,
    /// Forces the serial strategy, whatever `strategies` holds.
    #[builder(default)]
    pub serial: bool,
    /// Strategies to run, in order. The first one is the output reference.
    #[builder(default = vec![Strategy::Contiguous])]
    pub strategies: Vec<Strategy>,
    /// Measured invocations per strategy.
    #[builder(default = 1)]
    pub repeat: usize,
    /// Engine chunk size. `None` lets the engine pick.
    #[builder(default)]
    pub grain: Option<usize>,
    /// Per-item concurrency cap. `None` is unbounded.
    #[builder(default)]
    pub max_in_flight: Option<usize>,
    #[builder(default)]
    pub format: OutputFormat,
    /// Write a JSON execution trace here.
    #[builder(default)]
    pub trace: Option<PathBuf>,
    /// Write a CPU profile flamegraph here.
    #[builder(default)]
    pub cpu_profile: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

impl Config {
    /// The strategies that will actually run, with `serial` applied.
    pub fn selected_strategies(&self) -> Vec<Strategy> {
        if self.serial {
            vec![Strategy::Serial]
        } else {
            self.strategies.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid("workers must be at least 1"));
        }
        if self.repeat == 0 {
            return Err(invalid("repeat must be at least 1"));
        }
        if self.grain == Some(0) {
            return Err(invalid("grain must be at least 1"));
        }
        if self.max_in_flight == Some(0) {
            return Err(invalid("max-in-flight must be at least 1"));
        }
        if self.print_some > self.items {
            return Err(Error::InvalidConfig(format!(
                "print-some ({}) exceeds items ({})",
                self.print_some, self.items
            )));
        }
        if self.selected_strategies().is_empty() {
            return Err(invalid("no strategy selected"));
        }
        if self.cpu_profile.is_some() && !cfg!(feature = "profiling") {
            return Err(invalid(
                "cpu profiling requires building with the `profiling` feature",
            ));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> Error {
    Error::InvalidConfig(msg.to_string())
}
