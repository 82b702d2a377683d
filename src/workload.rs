//! Input and output arrays of one benchmark run.
//!
//! The inputs are immutable and shared by every task through an `Arc`. The
//! outputs live in [`OutputSlots`]: one slot per index, written by exactly
//! one unit of work per run. Slots hold the bit pattern of an `f64` in an
//! `AtomicU64` accessed with `Relaxed` ordering; that makes the array `Sync`
//! without any lock, and visibility to the reader comes from the executor's
//! join, not from the slots.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Output array shared by all workers of a run.
#[derive(Debug)]
pub struct OutputSlots {
    slots: Box<[AtomicU64]>,
}

impl OutputSlots {
    /// `len` slots, all holding NaN.
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicU64::new(f64::NAN.to_bits())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn store(&self, index: usize, value: f64) {
        self.slots[index].store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self, index: usize) -> f64 {
        f64::from_bits(self.slots[index].load(Ordering::Relaxed))
    }

    pub fn fill(&self, value: f64) {
        let bits = value.to_bits();
        for slot in self.slots.iter() {
            slot.store(bits, Ordering::Relaxed);
        }
    }

    /// Copies the first `count` values out (all of them if `count` is larger).
    pub fn head(&self, count: usize) -> Vec<f64> {
        self.slots
            .iter()
            .take(count)
            .map(|slot| f64::from_bits(slot.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.head(self.len())
    }
}

/// Inputs plus the output slots they are mapped into.
///
/// Cloning is cheap and shares both arrays.
#[derive(Clone, Debug)]
pub struct Workload {
    inputs: Arc<[f64]>,
    outputs: Arc<OutputSlots>,
}

impl Workload {
    /// `len` values uniform in `[-5, 5)`, reproducible for a given `seed`.
    pub fn generate(len: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let inputs: Vec<f64> = (0..len)
            .map(|_| 10.0 * (rng.r#gen::<f64>() - 0.5))
            .collect();
        Self::from_inputs(inputs)
    }

    pub fn from_inputs(inputs: Vec<f64>) -> Self {
        let outputs = OutputSlots::new(inputs.len());
        Self {
            inputs: inputs.into(),
            outputs: Arc::new(outputs),
        }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn inputs(&self) -> &[f64] {
        &self.inputs
    }

    pub fn outputs(&self) -> &OutputSlots {
        &self.outputs
    }

    /// Puts the NaN sentinel back into every output slot.
    pub fn reset_outputs(&self) {
        self.outputs.fill(f64::NAN);
    }

    /// The unit of work for index `i`: `outputs[i] = op(inputs[i])`.
    pub fn apply(&self, op: fn(f64) -> f64) -> impl Fn(usize) + Send + Sync + 'static + use<> {
        let inputs = Arc::clone(&self.inputs);
        let outputs = Arc::clone(&self.outputs);
        move |i| outputs.store(i, op(inputs[i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_inputs() {
        let a = Workload::generate(1000, 42);
        let b = Workload::generate(1000, 42);
        assert_eq!(a.inputs(), b.inputs());
    }

    #[test]
    fn different_seed_different_inputs() {
        let a = Workload::generate(100, 1);
        let b = Workload::generate(100, 2);
        assert_ne!(a.inputs(), b.inputs());
    }

    #[test]
    fn inputs_in_range() {
        let w = Workload::generate(10_000, 7);
        assert!(w.inputs().iter().all(|x| (-5.0..5.0).contains(x)));
        // both halves of the interval are populated
        assert!(w.inputs().iter().any(|&x| x < -4.0));
        assert!(w.inputs().iter().any(|&x| x > 4.0));
    }

    #[test]
    fn empty_workload() {
        let w = Workload::generate(0, 1);
        assert!(w.is_empty());
        assert!(w.outputs().is_empty());
        assert!(w.outputs().to_vec().is_empty());
    }

    #[test]
    fn outputs_start_as_nan() {
        let w = Workload::generate(16, 1);
        assert_eq!(w.outputs().len(), 16);
        assert!(w.outputs().to_vec().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn apply_writes_one_slot() {
        let w = Workload::from_inputs(vec![1.0, 2.0, 3.0]);
        let unit = w.apply(|x| x * 10.0);
        unit(1);
        let out = w.outputs().to_vec();
        assert!(out[0].is_nan());
        assert_eq!(out[1], 20.0);
        assert!(out[2].is_nan());
    }

    #[test]
    fn reset_restores_sentinel() {
        let w = Workload::from_inputs(vec![1.0, 2.0]);
        let unit = w.apply(|x| x);
        unit(0);
        unit(1);
        w.reset_outputs();
        assert!(w.outputs().to_vec().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn head_clamps_to_len() {
        let slots = OutputSlots::new(3);
        slots.store(0, 1.5);
        assert_eq!(slots.head(10).len(), 3);
        assert_eq!(slots.head(1), vec![1.5]);
        assert_eq!(slots.load(0), 1.5);
    }

    #[test]
    fn clones_share_outputs() {
        let w = Workload::from_inputs(vec![4.0]);
        let other = w.clone();
        other.apply(|x| -x)(0);
        assert_eq!(w.outputs().load(0), -4.0);
    }
}
