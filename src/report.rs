use std::{fmt::Debug, io::Write, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Aggregate, Result, aggregate::RunAggregate, executor::Strategy, workload::Workload};

/// A [`Report`] represents the processed form of an [`Aggregate`].
///
/// Reports turn raw aggregated data into derived values such as means and
/// rates. They are plain data with no I/O; a [`Reporter`] decides where they
/// go.
///
/// Implementors define how to construct the report from an [`Aggregate`] via
/// a [`From<A>`] implementation.
pub trait Report<A>
where
    Self: Send + Sync + Debug + From<A> + Serialize + DeserializeOwned,
    A: Aggregate,
{
}

/// A [`Reporter`] consumes a [`Report`] and performs side effects: displaying
/// it, or persisting it somewhere.
///
/// ```rust
/// use parloop::{report::RunReport, Reporter, RunAggregate};
///
/// struct DebugReporter;
/// impl Reporter<RunAggregate, RunReport> for DebugReporter {
///     async fn report(&self, report: &RunReport) -> parloop::Result<()> {
///         println!("{report:?}");
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter<A: Aggregate, R: Report<A>> {
    fn report(&self, report: &R) -> impl Future<Output = Result<()>>;
}

/// Leading inputs and the outputs they produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub inputs: Vec<f64>,
    pub outputs: Vec<f64>,
}

/// Summary of the measured invocations of one strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub strategy: Option<Strategy>,
    pub workers: usize,
    pub items: usize,
    pub runs: usize,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Items per second at the mean duration. Zero when nothing was timed.
    pub items_per_sec: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<Sample>,
}

impl From<RunAggregate> for RunReport {
    fn from(value: RunAggregate) -> Self {
        let mean = match u32::try_from(value.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => value.total / count,
            Err(_) => value.total.div_f64(value.count as f64),
        };
        let items_per_sec = if mean.is_zero() {
            0.0
        } else {
            value.items as f64 / mean.as_secs_f64()
        };
        Self {
            strategy: value.strategy,
            workers: value.workers,
            items: value.items,
            runs: value.count,
            mean,
            min: value.min.unwrap_or_default(),
            max: value.max,
            items_per_sec,
            sample: None,
        }
    }
}

impl Report<RunAggregate> for RunReport {}

impl RunReport {
    /// Attaches the first `count` inputs and outputs of `workload`.
    /// A zero count attaches nothing.
    pub fn with_sample(mut self, workload: &Workload, count: usize) -> Self {
        if count > 0 {
            let count = count.min(workload.len());
            self.sample = Some(Sample {
                inputs: workload.inputs()[..count].to_vec(),
                outputs: workload.outputs().head(count),
            });
        }
        self
    }
}

/// Human-readable rendering: the elapsed time in `Duration` debug form,
/// optionally labelled with the strategy, then the sample lines.
pub fn render_text(report: &RunReport, label: bool) -> String {
    let prefix = match (label, report.strategy) {
        (false, _) => String::new(),
        (true, Some(strategy)) => format!("{strategy}: "),
        (true, None) => "-: ".to_string(),
    };
    let spread = if report.runs > 1 {
        format!(
            " (min {:?}, max {:?}, {} runs)",
            report.min, report.max, report.runs
        )
    } else {
        String::new()
    };

    let mut out = format!("{prefix}{:?}{spread}\n", report.mean);
    if let Some(sample) = &report.sample {
        out.push_str(&format!(
            "inputs: {:?}\noutputs: {:?}\n",
            sample.inputs, sample.outputs
        ));
    }
    out
}

/// Prints [`render_text`] to stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutReporter {
    /// Prefix each report with its strategy name.
    pub label: bool,
}

impl Reporter<RunAggregate, RunReport> for StdoutReporter {
    async fn report(&self, report: &RunReport) -> Result<()> {
        let text = render_text(report, self.label);
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

/// Prints each report as one line of JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonReporter;

impl Reporter<RunAggregate, RunReport> for JsonReporter {
    async fn report(&self, report: &RunReport) -> Result<()> {
        let line = serde_json::to_string(report)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }
}
