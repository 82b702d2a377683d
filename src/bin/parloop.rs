use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use parloop::{
    Config, JsonReporter, OutputFormat, Reporter, StdoutReporter, Strategy, harness,
    instrument::TraceSink,
};

/// Time parallel-for work distribution strategies on a sinc workload
#[derive(Parser, Debug)]
#[command(name = "parloop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about, long_about = None)]
struct Cli {
    /// Number of work items
    #[arg(short = 'N', long = "items", default_value_t = 10_000_000)]
    items: usize,

    /// Runtime worker threads, and the parallelism of every strategy
    #[arg(short, long, visible_aliases = ["numgr", "num-cpu"], default_value_t = num_cpus::get())]
    workers: usize,

    /// Random generator seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Print the first COUNT inputs and outputs to verify
    #[arg(long, value_name = "COUNT", alias = "printsome", default_value_t = 0)]
    print_some: usize,

    /// Run the non-parallel loop instead, whatever --strategy says
    #[arg(long)]
    serial: bool,

    /// Strategies to run, in order; `all` runs every one and compares outputs
    #[arg(short, long, value_enum, value_delimiter = ',', default_value = "contiguous")]
    strategy: Vec<StrategyArg>,

    /// Timed invocations per strategy
    #[arg(long, default_value_t = 1)]
    repeat: usize,

    /// Indices claimed per step by engine workers
    #[arg(long)]
    grain: Option<usize>,

    /// Cap on concurrently alive per-item tasks
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Write a JSON trace of the measured section to FILE
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Write a CPU profile flamegraph of the measured section to FILE
    #[arg(long, value_name = "FILE", alias = "cpuprofile")]
    cpu_profile: Option<PathBuf>,

    /// Log level for stderr (trace, debug, info, warn, error); RUST_LOG wins
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Serial,
    PerItem,
    Strided,
    Contiguous,
    Engine,
    All,
}

impl StrategyArg {
    fn expand(self) -> Vec<Strategy> {
        match self {
            StrategyArg::Serial => vec![Strategy::Serial],
            StrategyArg::PerItem => vec![Strategy::PerItem],
            StrategyArg::Strided => vec![Strategy::Strided],
            StrategyArg::Contiguous => vec![Strategy::Contiguous],
            StrategyArg::Engine => vec![Strategy::Engine],
            StrategyArg::All => Strategy::ALL.to_vec(),
        }
    }
}

impl Cli {
    fn config(&self) -> Config {
        Config::builder()
            .items(self.items)
            .workers(self.workers)
            .seed(self.seed)
            .print_some(self.print_some)
            .serial(self.serial)
            .strategies(self.strategy.iter().flat_map(|s| s.expand()).collect())
            .repeat(self.repeat)
            .grain(self.grain)
            .max_in_flight(self.max_in_flight)
            .format(self.format)
            .trace(self.trace.clone())
            .cpu_profile(self.cpu_profile.clone())
            .build()
    }
}

fn init_logging(level: &str, trace: &TraceSink) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;

    tracing_subscriber::registry()
        .with(trace.layer())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let trace = TraceSink::new();
    init_logging(&cli.log_level, &trace)?;

    let config = cli.config();
    config.validate().context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .thread_name("parloop-worker")
        .enable_all()
        .build()
        .context("failed to build runtime")?;
    tracing::info!("Runtime started with {} worker threads", config.workers);

    runtime
        .block_on(async {
            let reports = harness::run(&config, Some(&trace)).await?;
            let label = reports.len() > 1;
            for report in &reports {
                match config.format {
                    OutputFormat::Text => StdoutReporter { label }.report(report).await?,
                    OutputFormat::Json => JsonReporter.report(report).await?,
                }
            }
            Ok::<_, parloop::Error>(())
        })
        .context("benchmark failed")?;

    runtime.shutdown_background();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["parloop"]);
        let config = cli.config();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn legacy_flag_names() {
        let cli = Cli::parse_from(["parloop", "-N", "100", "--numgr", "3", "--printsome", "5"]);
        assert_eq!(cli.items, 100);
        assert_eq!(cli.workers, 3);
        assert_eq!(cli.print_some, 5);
    }

    #[test]
    fn all_expands_to_every_strategy() {
        let cli = Cli::parse_from(["parloop", "-s", "all"]);
        assert_eq!(cli.config().strategies, Strategy::ALL.to_vec());
    }

    #[test]
    fn strategy_list() {
        let cli = Cli::parse_from(["parloop", "--strategy", "engine,per-item"]);
        assert_eq!(
            cli.config().strategies,
            vec![Strategy::Engine, Strategy::PerItem]
        );
    }
}
