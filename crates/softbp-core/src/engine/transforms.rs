//! Exact marginalization transforms for binary bitwise relations.
//!
//! For `o = a XOR b` and `o = a AND b` over `n`-bit hypotheses, the naive
//! marginals are double sums over `2^n x 2^n` pairs. Both relations are
//! diagonalized by a transform of size `2^n`:
//!
//! - XOR convolution becomes an element-wise product under the
//!   Walsh-Hadamard transform.
//! - AND becomes an element-wise product under the superset-sum (zeta)
//!   transform, since `a & b ⊇ s` iff `a ⊇ s` and `b ⊇ s`.
//!
//! Results are exact up to floating-point rounding. Signed transforms can leave
//! residues like `-1e-17` where the true value is 0; these are clamped.

use crate::engine::kernels::{clamp_non_negative, mul_assign};

/// Marginal messages of a binary relation node.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMarginals {
    pub to_output: Vec<f64>,
    pub to_input0: Vec<f64>,
    pub to_input1: Vec<f64>,
}

/// In-place Walsh-Hadamard transform (non-normalized).
///
/// Applying it twice multiplies the input by `values.len()`.
pub fn fwht(values: &mut [f64]) {
    let len = values.len();
    debug_assert!(len.is_power_of_two());
    let mut h = 1;
    while h < len {
        for block in values.chunks_mut(2 * h) {
            let (lo, hi) = block.split_at_mut(h);
            for (x, y) in lo.iter_mut().zip(hi.iter_mut()) {
                let (a, b) = (*x, *y);
                *x = a + b;
                *y = a - b;
            }
        }
        h *= 2;
    }
}

/// `values[s] = Σ_{t ⊇ s} values[t]`
pub fn superset_zeta(values: &mut [f64]) {
    for_each_bit_pair(values, |low, high| *low += high);
}

/// Inverse of [`superset_zeta`].
pub fn superset_mobius(values: &mut [f64]) {
    for_each_bit_pair(values, |low, high| *low -= high);
}

/// `values[s] = Σ_{t ⊆ s} values[t]`
pub fn subset_zeta(values: &mut [f64]) {
    for_each_bit_pair_rev(values, |high, low| *high += low);
}

/// Inverse of [`subset_zeta`].
pub fn subset_mobius(values: &mut [f64]) {
    for_each_bit_pair_rev(values, |high, low| *high -= low);
}

/// Visits `(values[m], values[m | bit])` for every bit and every `m` without it.
fn for_each_bit_pair(values: &mut [f64], mut f: impl FnMut(&mut f64, f64)) {
    let len = values.len();
    debug_assert!(len.is_power_of_two());
    let mut h = 1;
    while h < len {
        for block in values.chunks_mut(2 * h) {
            let (lo, hi) = block.split_at_mut(h);
            for (x, y) in lo.iter_mut().zip(hi.iter()) {
                f(x, *y);
            }
        }
        h *= 2;
    }
}

/// Visits `(values[m | bit], values[m])` for every bit and every `m` without it.
fn for_each_bit_pair_rev(values: &mut [f64], mut f: impl FnMut(&mut f64, f64)) {
    let len = values.len();
    debug_assert!(len.is_power_of_two());
    let mut h = 1;
    while h < len {
        for block in values.chunks_mut(2 * h) {
            let (lo, hi) = block.split_at_mut(h);
            for (y, x) in hi.iter_mut().zip(lo.iter()) {
                f(y, *x);
            }
        }
        h *= 2;
    }
}

/// Marginals of `o = a XOR b` given the three adjacent distributions.
///
/// - toward the output: `(A ⊛ B)[o] = Σ_a A[a] B[a ^ o]`
/// - toward input 0: `(B ⊛ O)[a] = Σ_b B[b] O[a ^ b]`
/// - toward input 1: `(A ⊛ O)[b]`
pub fn xor_marginals(a: &[f64], b: &[f64], o: &[f64]) -> BinaryMarginals {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), o.len());

    let mut fa = a.to_vec();
    let mut fb = b.to_vec();
    let mut fo = o.to_vec();
    fwht(&mut fa);
    fwht(&mut fb);
    fwht(&mut fo);

    BinaryMarginals {
        to_output: inverse_product(&fa, &fb),
        to_input0: inverse_product(&fb, &fo),
        to_input1: inverse_product(&fa, &fo),
    }
}

/// Inverse Walsh-Hadamard transform of `lhs ⊙ rhs`.
fn inverse_product(lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
    let mut out = lhs.to_vec();
    mul_assign(&mut out, rhs);
    fwht(&mut out);
    let scale = 1.0 / out.len() as f64;
    for v in out.iter_mut() {
        *v *= scale;
    }
    clamp_non_negative(&mut out);
    out
}

/// Marginals of `o = a AND b` given the three adjacent distributions.
///
/// Toward the output, superset sums multiply:
/// `Ŝ_O = Ŝ_A ⊙ Ŝ_B`, then Möbius inversion recovers `O`.
///
/// Toward input 0, `m[a] = Σ_b B[b] O[a & b]`. Writing `O` as subset sums of
/// its Möbius coefficients `g` gives `m[a] = Σ_{t ⊆ a} g[t] Ŝ_B[t]`, i.e. a
/// subset zeta transform of `g ⊙ Ŝ_B`. Input 1 is symmetric.
pub fn and_marginals(a: &[f64], b: &[f64], o: &[f64]) -> BinaryMarginals {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), o.len());

    let mut sa = a.to_vec();
    let mut sb = b.to_vec();
    superset_zeta(&mut sa);
    superset_zeta(&mut sb);

    let mut to_output = sa.clone();
    mul_assign(&mut to_output, &sb);
    superset_mobius(&mut to_output);
    clamp_non_negative(&mut to_output);

    let mut g = o.to_vec();
    subset_mobius(&mut g);

    let mut to_input0 = g.clone();
    mul_assign(&mut to_input0, &sb);
    subset_zeta(&mut to_input0);
    clamp_non_negative(&mut to_input0);

    let mut to_input1 = g;
    mul_assign(&mut to_input1, &sa);
    subset_zeta(&mut to_input1);
    clamp_non_negative(&mut to_input1);

    BinaryMarginals {
        to_output,
        to_input0,
        to_input1,
    }
}
