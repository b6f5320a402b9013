//! Dense univariate polynomials with ascending coefficients
//! (`c[0] + c[1] t + c[2] t^2 + ...`).

use nalgebra::DMatrix;

pub(crate) fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len().max(b.len())];
    for (i, v) in a.iter().enumerate() {
        out[i] += v;
    }
    for (i, v) in b.iter().enumerate() {
        out[i] += v;
    }
    out
}

pub(crate) fn scale(a: &[f64], s: f64) -> Vec<f64> {
    a.iter().map(|v| v * s).collect()
}

pub(crate) fn mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Real parts of all roots, from the eigenvalues of the companion matrix.
///
/// Leading coefficients that are negligible relative to the largest one are
/// dropped first, so a degree-6 polynomial whose top term vanishes is solved
/// as the lower-degree polynomial it really is.
pub(crate) fn real_parts_of_roots(coeffs: &[f64]) -> Vec<f64> {
    let max = coeffs.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
    if max == 0.0 || !max.is_finite() {
        return Vec::new();
    }
    let mut degree = coeffs.len() - 1;
    while degree > 0 && coeffs[degree].abs() <= 1e-14 * max {
        degree -= 1;
    }
    if degree == 0 {
        return Vec::new();
    }
    let lead = coeffs[degree];
    if degree == 1 {
        return vec![-coeffs[0] / lead];
    }

    let mut companion = DMatrix::<f64>::zeros(degree, degree);
    for i in 1..degree {
        companion[(i, i - 1)] = 1.0;
    }
    for i in 0..degree {
        companion[(i, degree - 1)] = -coeffs[i] / lead;
    }
    companion
        .complex_eigenvalues()
        .iter()
        .map(|z| z.re)
        .filter(|re| re.is_finite())
        .collect()
}
