use crate::knots::{KnotError, KnotVector};
use crate::KNOT_EPS;

/// Evaluate the non-zero B-spline basis functions at `t` via the Cox-de Boor
/// triangular recurrence.
///
/// Returns `(first, values)` where `values[i]` is the value of basis function
/// `first + i` and `values.len() == order`. Parameters outside the knot
/// vector's domain are an error; values within a machine-epsilon band of a
/// domain endpoint are clamped onto it.
pub fn basis_funcs(kv: &KnotVector, t: f64) -> Result<(usize, Vec<f64>), KnotError> {
    let (min, max) = kv.domain();
    let t = clamp_to_domain(t, min, max)?;

    let knots = kv.knots();
    let p = kv.order() - 1;
    let n = kv.num_ctl() - 1;

    // Knot-span search, binary between the clamped ends.
    let span = if t >= knots[n + 1] {
        // Right end: use the last non-empty span.
        let mut s = n;
        while s > p && (knots[s + 1] - knots[s]).abs() < KNOT_EPS {
            s -= 1;
        }
        s
    } else if t <= knots[p] {
        p
    } else {
        let mut low = p;
        let mut high = n + 1;
        let mut mid = (low + high) / 2;
        while t < knots[mid] || t >= knots[mid + 1] {
            if t < knots[mid] {
                high = mid;
            } else {
                low = mid;
            }
            mid = (low + high) / 2;
        }
        mid
    };

    let mut vals = vec![0.0; p + 1];
    let mut left = vec![0.0; p + 1];
    let mut right = vec![0.0; p + 1];

    vals[0] = 1.0;
    for j in 1..=p {
        left[j] = t - knots[span + 1 - j];
        right[j] = knots[span + j] - t;
        let mut saved = 0.0;
        for r in 0..j {
            let temp = vals[r] / (right[r + 1] + left[j - r]);
            vals[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        vals[j] = saved;
    }

    Ok((span - p, vals))
}

/// Bernstein basis values `B_{i,order-1}(t)` for `i = 0..order`, computed by
/// the de Casteljau-style accumulation (numerically stable for `t` in [0,1]).
pub fn bernstein_basis(order: usize, t: f64) -> Vec<f64> {
    let mut vals = vec![0.0; order];
    vals[0] = 1.0;
    for j in 1..order {
        let mut saved = 0.0;
        for r in 0..j {
            let temp = vals[r];
            vals[r] = saved + (1.0 - t) * temp;
            saved = t * temp;
        }
        vals[j] = saved;
    }
    vals
}

/// Bernstein coefficients of the product of two Bernstein polynomials.
pub fn bernstein_product(a: &[f64], b: &[f64]) -> Vec<f64> {
    let da = a.len() - 1;
    let db = b.len() - 1;
    let mut out = vec![0.0; da + db + 1];
    for (i, &av) in a.iter().enumerate() {
        for (j, &bv) in b.iter().enumerate() {
            out[i + j] += crate::bernstein_product_coef(da, i, db, j) * av * bv;
        }
    }
    out
}

/// Bernstein coefficients of the derivative of a Bernstein polynomial.
pub fn bernstein_diff(c: &[f64]) -> Vec<f64> {
    let k = c.len();
    if k == 1 {
        return vec![0.0];
    }
    (0..k - 1)
        .map(|i| (k - 1) as f64 * (c[i + 1] - c[i]))
        .collect()
}

/// One elevation step: Bernstein coefficients of the same polynomial one
/// degree up.
pub fn bernstein_raise(c: &[f64]) -> Vec<f64> {
    let k = c.len();
    let mut out = vec![0.0; k + 1];
    out[0] = c[0];
    out[k] = c[k - 1];
    for i in 1..k {
        let a = i as f64 / k as f64;
        out[i] = a * c[i - 1] + (1.0 - a) * c[i];
    }
    out
}

pub(crate) fn clamp_to_domain(t: f64, min: f64, max: f64) -> Result<f64, KnotError> {
    if t < min {
        if min - t < KNOT_EPS {
            Ok(min)
        } else {
            Err(KnotError::OutOfDomain { t, min, max })
        }
    } else if t > max {
        if t - max < KNOT_EPS {
            Ok(max)
        } else {
            Err(KnotError::OutOfDomain { t, min, max })
        }
    } else {
        Ok(t)
    }
}
