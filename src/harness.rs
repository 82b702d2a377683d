//! The benchmark run: generate inputs, time each selected strategy, check
//! that every strategy produced the same outputs, and build the reports.
use crate::{
    Aggregate,
    Error,
    Result,
    aggregate::RunAggregate,
    config::Config,
    executor::{AnyExecutor, Executor, Strategy},
    instrument::{Session, TraceSink},
    report::RunReport,
    scenario::Scenario,
    workload::Workload,
};

/// Runs every selected strategy `config.repeat` times over one generated
/// workload and returns one report per strategy, in selection order.
///
/// Must be called inside a Tokio runtime; the harness binary builds one with
/// `config.workers` threads. Instrumentation requested by the configuration
/// wraps the whole measured section. `trace` is the sink installed with the
/// subscriber and is only needed when `config.trace` is set.
pub async fn run(config: &Config, trace: Option<&TraceSink>) -> Result<Vec<RunReport>> {
    config.validate()?;
    tracing::info!("Effective configuration: {}", serde_json::to_string(config)?);

    let workload = Workload::generate(config.items, config.seed);
    let scenario = Scenario::builder()
        .name("normalized sinc")
        .workload(workload)
        .build();
    let executors: Vec<AnyExecutor> = config
        .selected_strategies()
        .into_iter()
        .map(|strategy| AnyExecutor::new(strategy, config))
        .collect();

    let outcome = measure(config, &scenario, &executors, trace).await;
    for executor in &executors {
        executor.shutdown().await;
    }
    outcome
}

async fn measure(
    config: &Config,
    scenario: &Scenario,
    executors: &[AnyExecutor],
    trace: Option<&TraceSink>,
) -> Result<Vec<RunReport>> {
    let workload = scenario.workload();
    let mut reference: Option<(Strategy, Vec<f64>)> = None;
    let mut reports = Vec::with_capacity(executors.len());

    let session = Session::start(config, trace)?;
    if !session.is_empty() {
        tracing::info!("Instrumentation started for the measured section");
    }
    for executor in executors {
        let mut agg = RunAggregate::new();
        for round in 0..config.repeat {
            workload.reset_outputs();
            let metric = executor.exec(scenario).await?;
            tracing::debug!(
                "{} '{}' round {}: {:?}",
                metric.strategy,
                scenario.name,
                round + 1,
                metric.elapsed
            );
            agg.consume(&metric);
        }

        let strategy = executor.strategy();
        match &reference {
            Some((expected_by, expected)) => {
                check_outputs(strategy, *expected_by, expected, workload)?
            }
            None if executors.len() > 1 => {
                reference = Some((strategy, workload.outputs().to_vec()));
            }
            None => {}
        }

        reports.push(RunReport::from(agg).with_sample(workload, config.print_some));
    }
    session.stop()?;
    Ok(reports)
}

/// Outputs must match the reference bit for bit.
fn check_outputs(
    strategy: Strategy,
    reference: Strategy,
    expected: &[f64],
    workload: &Workload,
) -> Result<()> {
    let outputs = workload.outputs();
    for (index, &want) in expected.iter().enumerate() {
        let got = outputs.load(index);
        if got.to_bits() != want.to_bits() {
            return Err(Error::OutputMismatch {
                strategy,
                reference,
                index,
                got,
                expected: want,
            });
        }
    }
    tracing::debug!("{strategy} outputs match {reference}");
    Ok(())
}
