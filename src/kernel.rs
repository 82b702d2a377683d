//! The per-element numeric transform applied by every strategy.
//!
//! [`sinc`] is the kernel proper. The harness applies [`normalized_sinc`],
//! which is the kernel evaluated at `pi * x`, so inputs drawn from `[-5, 5]`
//! cover ten lobes of the function.

use std::f64::consts::PI;

/// Unnormalized sinc: `sin(x) / x`, with the removable singularity at zero
/// filled in exactly.
///
/// The check is an exact comparison against `0.0` (which also matches
/// `-0.0`); there is no epsilon band around the singular point.
#[inline]
pub fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    x.sin() / x
}

/// Normalized sinc: `sinc(pi * x)`. Zero at every non-zero integer.
#[inline]
pub fn normalized_sinc(x: f64) -> f64 {
    sinc(x * PI)
}
