//! Least-squares fitting of B-spline curves to sampled data.

use nalgebra::{DMatrix, DVector};
use spline_basis::{basis_funcs, knot_subtract, KnotVector};
use tracing::debug;

use crate::curve::Curve;
use crate::error::GeomError;
use crate::points::{CtlPoints, PointType};

/// Fit a non-rational B-spline curve over `kv` to samples
/// `(params[i], values[i])` in the least-squares sense.
///
/// Every sample row must have the same number of coordinates; there must be
/// at least as many samples as control points.
pub fn fit_bspline_curve(
    kv: &KnotVector,
    params: &[f64],
    values: &[Vec<f64>],
) -> Result<Curve, GeomError> {
    let n = kv.num_ctl();
    if params.len() != values.len() {
        return Err(GeomError::MeshSizeMismatch {
            expected: params.len(),
            found: values.len(),
        });
    }
    if params.len() < n {
        return Err(GeomError::NotEnoughSamples {
            got: params.len(),
            unknowns: n,
        });
    }
    let coords = values.first().map_or(0, |v| v.len());
    if let Some(bad) = values.iter().find(|v| v.len() != coords) {
        return Err(GeomError::MeshSizeMismatch {
            expected: coords,
            found: bad.len(),
        });
    }

    // Collocation matrix: row per sample, column per control point.
    let mut a = DMatrix::zeros(params.len(), n);
    for (r, &t) in params.iter().enumerate() {
        let (first, vals) = basis_funcs(kv, t)?;
        for (q, &v) in vals.iter().enumerate() {
            a[(r, first + q)] = v;
        }
    }

    debug!(samples = params.len(), ctl = n, coords, "fitting b-spline curve");
    let svd = a.svd(true, true);
    let mut channels = Vec::with_capacity(coords);
    for c in 0..coords {
        let rhs = DVector::from_fn(values.len(), |r, _| values[r][c]);
        let sol = svd
            .solve(&rhs, 1e-12)
            .map_err(|e| GeomError::SolveFailed(e.to_string()))?;
        channels.push(sol.iter().copied().collect());
    }

    let points = CtlPoints::from_channels(PointType::new(coords, false), channels)?;
    Curve::bspline(points, kv.clone())
}

/// Largest deviation incurred by removing one interior knot from a
/// non-rational B-spline curve.
///
/// The curve is sampled densely, refit over the reduced knot vector, and the
/// two are compared at the samples. Useful for deciding whether a refinement
/// knot can be dropped again without visibly changing the shape.
pub fn knot_removal_error(curve: &Curve, knot: f64) -> Result<f64, GeomError> {
    let kv = curve.knots().ok_or(GeomError::WrongBasis {
        expected: crate::BasisKind::Bspline,
        found: curve.basis(),
    })?;
    if curve.is_rational() {
        return Err(GeomError::Unsupported(
            "knot removal error for rational curves".into(),
        ));
    }
    let reduced = knot_subtract(kv.knots(), &[knot]);
    if reduced.len() == kv.len() {
        return Err(GeomError::Unsupported(format!(
            "knot {} not present in the vector",
            knot
        )));
    }
    let reduced = KnotVector::new(kv.order(), reduced)?;

    let (min, max) = kv.domain();
    let samples = 4 * curve.len().max(8);
    let params: Vec<f64> = (0..=samples)
        .map(|i| min + (max - min) * i as f64 / samples as f64)
        .collect();
    let values: Vec<Vec<f64>> = params
        .iter()
        .map(|&t| curve.eval(t))
        .collect::<Result<_, _>>()?;

    let refit = fit_bspline_curve(&reduced, &params, &values)?;
    let mut worst = 0.0_f64;
    for (t, v) in params.iter().zip(&values) {
        let p = refit.eval(*t)?;
        let err = p
            .iter()
            .zip(v)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f64, f64::max);
        worst = worst.max(err);
    }
    Ok(worst)
}
