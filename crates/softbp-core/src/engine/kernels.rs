//! Numeric kernels over distribution vectors.
//!
//! Every distribution in the engine is a plain `[f64]` slice of length `Nk`
//! holding un-normalized probability mass (or its base-10 logarithm). The
//! kernels here are the only place where element-wise arithmetic on those
//! slices happens; update code composes them and never indexes raw offsets.

use crate::engine::errors::BpError;

/// Target sum for normalized distributions.
pub const NORMALIZATION_TARGET: f64 = 1.0;

#[inline]
pub fn check_len(values: &[f64], expected: usize) -> Result<(), BpError> {
    if values.len() != expected {
        return Err(BpError::DimensionMismatch {
            expected,
            actual: values.len(),
        });
    }
    Ok(())
}

/// `dst[i] *= src[i]`
#[inline]
pub fn mul_assign(dst: &mut [f64], src: &[f64]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d *= *s;
    }
}

/// `dst[i] += src[i]`
#[inline]
pub fn add_assign(dst: &mut [f64], src: &[f64]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d += *s;
    }
}

/// `dst[i] = lhs[i] - rhs[i]`
#[inline]
pub fn sub_into(dst: &mut [f64], lhs: &[f64], rhs: &[f64]) {
    debug_assert_eq!(dst.len(), lhs.len());
    debug_assert_eq!(dst.len(), rhs.len());
    for ((d, l), r) in dst.iter_mut().zip(lhs).zip(rhs) {
        *d = *l - *r;
    }
}

/// `dst[i] = log10(src[i])`, with zero mass mapping to `-inf`.
#[inline]
pub fn log10_into(dst: &mut [f64], src: &[f64]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d = s.log10();
    }
}

/// `values[i] = 10^values[i]`
#[inline]
pub fn pow10_in_place(values: &mut [f64]) {
    for v in values.iter_mut() {
        *v = 10f64.powf(*v);
    }
}

/// Largest element, `-inf` for an empty slice.
#[inline]
pub fn max_value(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// `values[i] += cst`
#[inline]
pub fn add_constant(values: &mut [f64], cst: f64) {
    for v in values.iter_mut() {
        *v += cst;
    }
}

/// Shifts a log-domain vector so that its maximum becomes 0.
///
/// Converting the shifted vector back with [`pow10_in_place`] keeps the
/// largest entry at exactly 1, so nothing overflows or underflows to an
/// all-zero vector. The shift is a constant factor in the linear domain and
/// disappears in the following normalization.
pub fn shift_max_to_zero(values: &mut [f64], context: &str) -> Result<(), BpError> {
    let max = max_value(values);
    if !max.is_finite() {
        return Err(BpError::DegenerateDistribution(format!(
            "{}: log-domain maximum is {}",
            context, max
        )));
    }
    add_constant(values, -max);
    Ok(())
}

/// Scales `values` so that they sum to `target`.
///
/// Fails with [`BpError::DegenerateDistribution`] instead of producing
/// NaN/Inf when the mass is zero, negative or non-finite.
pub fn normalize_to(values: &mut [f64], target: f64, context: &str) -> Result<(), BpError> {
    let sum: f64 = values.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return Err(BpError::DegenerateDistribution(format!(
            "{}: total mass is {}",
            context, sum
        )));
    }
    let scale = target / sum;
    for v in values.iter_mut() {
        *v *= scale;
    }
    Ok(())
}

/// Replaces tiny negative residues left by signed transforms with 0.
#[inline]
pub fn clamp_non_negative(values: &mut [f64]) {
    for v in values.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

/// Replicates `values[..width]` across the whole slice.
///
/// `width` must divide `values.len()`.
pub fn tile(values: &mut [f64], width: usize) {
    if width == 0 || width >= values.len() {
        return;
    }
    debug_assert_eq!(values.len() % width, 0);
    let (head, rest) = values.split_at_mut(width);
    for chunk in rest.chunks_mut(width) {
        chunk.copy_from_slice(head);
    }
}

/// Converts a log10 vector into a normalized linear distribution.
pub fn log10_to_linear(log_values: &[f64], context: &str) -> Result<Vec<f64>, BpError> {
    let mut out = log_values.to_vec();
    shift_max_to_zero(&mut out, context)?;
    pow10_in_place(&mut out);
    normalize_to(&mut out, NORMALIZATION_TARGET, context)?;
    Ok(out)
}
