//! Shared helpers for the softbp integration and property tests.

/// Uniform distribution over `nk` hypotheses.
pub fn uniform(nk: usize) -> Vec<f64> {
    vec![1.0 / nk as f64; nk]
}

/// Point mass at hypothesis `at`.
pub fn point(nk: usize, at: usize) -> Vec<f64> {
    let mut v = vec![0.0; nk];
    v[at] = 1.0;
    v
}

/// Rescales `values` to sum to 1.
pub fn normalized(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    values.iter().map(|v| v / total).collect()
}

/// Deterministic strictly positive distribution (LCG driven).
pub fn make_distribution(len: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let unit = ((state >> 11) as f64) / ((u64::MAX >> 11) as f64);
        out.push(0.001 + unit);
    }
    normalized(&out)
}

pub fn assert_close_vec(lhs: &[f64], rhs: &[f64], eps: f64) {
    assert_eq!(lhs.len(), rhs.len(), "length mismatch");
    for (idx, (a, b)) in lhs.iter().zip(rhs.iter()).enumerate() {
        assert!(
            (a - b).abs() <= eps,
            "index {} differs: lhs={}, rhs={}, eps={}",
            idx,
            a,
            b,
            eps
        );
    }
}

pub fn assert_sums_to_one(values: &[f64], eps: f64) {
    let total: f64 = values.iter().sum();
    assert!(
        (total - 1.0).abs() <= eps,
        "distribution sums to {} (eps={})",
        total,
        eps
    );
}
