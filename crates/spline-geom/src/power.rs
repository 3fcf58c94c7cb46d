//! Conversions between Bernstein and monomial coefficients over [0, 1].

use spline_basis::binomial;

/// Monomial coefficients of the polynomial with Bernstein coefficients
/// `bez` (both over [0, 1]).
pub fn bezier_to_power(bez: &[f64]) -> Vec<f64> {
    let n = bez.len().saturating_sub(1);
    (0..bez.len())
        .map(|j| {
            let mut sum = 0.0;
            for (i, &b) in bez.iter().take(j + 1).enumerate() {
                let sign = if (j - i) % 2 == 0 { 1.0 } else { -1.0 };
                sum += sign * binomial(j, i) * b;
            }
            binomial(n, j) * sum
        })
        .collect()
}

/// Bernstein coefficients of the polynomial `sum_j pow[j] * t^j` over [0, 1].
pub fn power_to_bezier(pow: &[f64]) -> Vec<f64> {
    let n = pow.len().saturating_sub(1);
    (0..pow.len())
        .map(|i| {
            let mut sum = 0.0;
            for (j, &c) in pow.iter().take(i + 1).enumerate() {
                sum += binomial(i, j) / binomial(n, j) * c;
            }
            sum
        })
        .collect()
}
