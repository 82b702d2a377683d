use typed_builder::TypedBuilder;

use crate::{kernel::normalized_sinc, workload::Workload};

/// A named workload plus the per-element operation applied to it.
///
/// Executors run a scenario through [`Executor::exec`](crate::Executor::exec),
/// which times one full pass over the workload.
///
/// ```rust
/// use parloop::{Scenario, Workload};
///
/// let scenario = Scenario::builder()
///     .name("sinc")
///     .workload(Workload::generate(1_000, 1))
///     .build();
/// assert_eq!(scenario.workload().len(), 1_000);
/// ```
#[derive(Clone, Debug, TypedBuilder)]
pub struct Scenario {
    #[builder(setter(into))]
    pub name: String,
    pub workload: Workload,
    /// Applied as `outputs[i] = op(inputs[i])`.
    #[builder(default = normalized_sinc as fn(f64) -> f64)]
    pub op: fn(f64) -> f64,
}

impl Scenario {
    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    /// The unit of work for one index, ready to hand to an executor.
    pub fn body(&self) -> impl Fn(usize) + Send + Sync + 'static + use<> {
        self.workload.apply(self.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::sinc;

    #[test]
    fn defaults_to_normalized_sinc() {
        let scenario = Scenario::builder()
            .name("default")
            .workload(Workload::from_inputs(vec![0.0, 0.5]))
            .build();
        let body = scenario.body();
        body(0);
        body(1);
        assert_eq!(scenario.workload().outputs().to_vec(), vec![1.0, normalized_sinc(0.5)]);
    }

    #[test]
    fn custom_op() {
        let scenario = Scenario::builder()
            .name("raw sinc")
            .workload(Workload::from_inputs(vec![2.0]))
            .op(sinc)
            .build();
        scenario.body()(0);
        assert_eq!(scenario.workload().outputs().load(0), sinc(2.0));
    }
}
