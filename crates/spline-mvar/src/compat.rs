use spline_basis::{knot_merge, knot_subtract};
use spline_geom::{BasisKind, CtlPoints, PointType};
use tracing::instrument;

use crate::error::MvarError;
use crate::multivar::Multivar;

/// Which aspects [`make_compatible`] must reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatOptions {
    pub same_point_type: bool,
    pub same_orders: bool,
    pub same_knots: bool,
}

impl Default for CompatOptions {
    fn default() -> Self {
        Self {
            same_point_type: true,
            same_orders: true,
            same_knots: true,
        }
    }
}

/// Bring two multivariates onto a shared representation, returning adjusted
/// copies and leaving the inputs untouched.
///
/// After a full reconciliation the outputs share point type, basis, per-axis
/// orders, and per-axis knot vectors (the second operand's domains are
/// remapped onto the first's), so pointwise arithmetic applies directly.
/// Degenerate axes introduced by [`Multivar::promote`] (order 1, one control
/// point) are broadcast to the other operand's structure. The operation is
/// idempotent: feeding the outputs back in returns them unchanged.
#[instrument(skip(a, b))]
pub fn make_compatible(
    a: &Multivar,
    b: &Multivar,
    opts: CompatOptions,
) -> Result<(Multivar, Multivar), MvarError> {
    if a.dim() != b.dim() {
        return Err(MvarError::DimMismatch {
            expected: a.dim(),
            found: b.dim(),
        });
    }
    let mut a = a.float_periodic()?;
    let mut b = b.float_periodic()?;

    if opts.same_point_type {
        let common = PointType::common(a.point_type(), b.point_type());
        a = a.coerce_point_type(common)?;
        b = b.coerce_point_type(common)?;
    }

    // Order raising is a Bezier operation, so reconcile orders before any
    // conversion to b-spline form. Degenerate (constant) axes are left for
    // the broadcast below.
    if opts.same_orders {
        for axis in 0..a.dim() {
            if is_degenerate(&a, axis) || is_degenerate(&b, axis) {
                continue;
            }
            while a.orders()[axis] < b.orders()[axis] {
                if a.basis() != BasisKind::Bezier {
                    return Err(MvarError::Unsupported(format!(
                        "order mismatch on b-spline axis {}",
                        axis
                    )));
                }
                a = a.degree_raise_axis(axis)?;
            }
            while b.orders()[axis] < a.orders()[axis] {
                if b.basis() != BasisKind::Bezier {
                    return Err(MvarError::Unsupported(format!(
                        "order mismatch on b-spline axis {}",
                        axis
                    )));
                }
                b = b.degree_raise_axis(axis)?;
            }
        }
    }

    // Mixed bases meet in b-spline form; two Beziers stay Bezier.
    if a.basis() != b.basis()
        || (opts.same_knots && a.basis() == BasisKind::Bspline)
    {
        a = a.to_bspline()?;
        b = b.to_bspline()?;
    }

    for axis in 0..a.dim() {
        // Constant axes from promotion adopt the other side's structure.
        if is_degenerate(&a, axis) && !is_degenerate(&b, axis) {
            a = broadcast_axis(&a, axis, &b)?;
        } else if is_degenerate(&b, axis) && !is_degenerate(&a, axis) {
            b = broadcast_axis(&b, axis, &a)?;
        }

        if opts.same_knots && a.basis() == BasisKind::Bspline {
            // Remap b onto a's domain, then exchange missing knots.
            let (amin, amax) = a.domain(axis)?;
            let bkv = b.kv_for(axis)?;
            let (bmin, bmax) = bkv.domain();
            if (amin - bmin).abs() > f64::EPSILON || (amax - bmax).abs() > f64::EPSILON {
                let remapped = bkv.affine_remap(amin, amax);
                b = b.replace_knot_vector(axis, remapped)?;
            }
            let missing_in_a = knot_subtract(b.kv_for(axis)?.knots(), a.kv_for(axis)?.knots());
            if !missing_in_a.is_empty() {
                let merged = knot_merge(a.kv_for(axis)?.knots(), &missing_in_a);
                a = a.insert_knot_vector(axis, &merged)?;
            }
            let missing_in_b = knot_subtract(a.kv_for(axis)?.knots(), b.kv_for(axis)?.knots());
            if !missing_in_b.is_empty() {
                let merged = knot_merge(b.kv_for(axis)?.knots(), &missing_in_b);
                b = b.insert_knot_vector(axis, &merged)?;
            }
        }
    }

    Ok((a, b))
}

fn is_degenerate(mv: &Multivar, axis: usize) -> bool {
    mv.orders()[axis] == 1 && mv.lengths()[axis] == 1
}

/// Replicate a constant axis so its structure matches `target`'s axis.
fn broadcast_axis(mv: &Multivar, axis: usize, target: &Multivar) -> Result<Multivar, MvarError> {
    let n = target.lengths()[axis];
    let mut lengths = mv.lengths.clone();
    lengths[axis] = n;
    let total: usize = lengths.iter().product();
    let ptype = mv.point_type();
    let mut out = CtlPoints::zeros(ptype, total);

    let old_strides = mv.strides();
    let mut idx = vec![0usize; lengths.len()];
    for flat in 0..total {
        let mut src = 0;
        for a in 0..lengths.len() {
            let i = if a == axis { 0 } else { idx[a] };
            src += i * old_strides[a];
        }
        for c in 0..ptype.channels() {
            out.raw_channel_mut(c)[flat] = mv.points.raw_channel(c)[src];
        }
        let mut a = 0;
        while a < lengths.len() {
            idx[a] += 1;
            if idx[a] < lengths[a] {
                break;
            }
            idx[a] = 0;
            a += 1;
        }
    }

    let mut orders = mv.orders.clone();
    orders[axis] = target.orders()[axis];
    let mut knots = mv.knots.clone();
    knots[axis] = target.knots[axis].clone();
    let mut aux = mv.aux_domains.clone();
    aux[axis] = target.aux_domains[axis];
    Ok(Multivar {
        orders,
        lengths,
        knots,
        points: out,
        aux_domains: aux,
        ..mv.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spline_basis::KnotVector;
    use spline_geom::Curve;

    fn scalar(vals: Vec<f64>) -> CtlPoints {
        CtlPoints::from_channels(PointType::new(1, false), vec![vals]).unwrap()
    }

    #[test]
    fn bezier_orders_are_raised_to_match() {
        let a = Multivar::bezier(&[2], scalar(vec![0.0, 1.0])).unwrap();
        let b = Multivar::bezier(&[4], scalar(vec![1.0, 0.0, 2.0, -1.0])).unwrap();
        let (ca, cb) = make_compatible(&a, &b, CompatOptions::default()).unwrap();
        assert_eq!(ca.orders(), cb.orders());
        assert_eq!(ca.orders(), &[4]);
        for i in 0..=6 {
            let t = i as f64 / 6.0;
            assert!((ca.eval(&[t]).unwrap()[0] - a.eval(&[t]).unwrap()[0]).abs() < 1e-13);
            assert!((cb.eval(&[t]).unwrap()[0] - b.eval(&[t]).unwrap()[0]).abs() < 1e-13);
        }
        // Compatible operands now add.
        assert!(ca.add(&cb).is_ok());
    }

    #[test]
    fn knot_vectors_are_unified() {
        let ka = KnotVector::new(3, vec![0.0, 0.0, 0.0, 0.4, 1.0, 1.0, 1.0]).unwrap();
        let kb = KnotVector::new(3, vec![0.0, 0.0, 0.0, 0.7, 1.0, 1.0, 1.0]).unwrap();
        let a = Multivar::bspline(vec![ka], scalar(vec![0.0, 1.0, 2.0, 3.0])).unwrap();
        let b = Multivar::bspline(vec![kb], scalar(vec![3.0, 1.0, 0.0, 2.0])).unwrap();
        let (ca, cb) = make_compatible(&a, &b, CompatOptions::default()).unwrap();
        assert_eq!(
            ca.knot_vector(0).unwrap().knots(),
            cb.knot_vector(0).unwrap().knots()
        );
        assert_eq!(ca.knot_vector(0).unwrap().multiplicity(0.4), 1);
        assert_eq!(ca.knot_vector(0).unwrap().multiplicity(0.7), 1);
        for i in 0..=8 {
            let t = i as f64 / 8.0;
            assert!((ca.eval(&[t]).unwrap()[0] - a.eval(&[t]).unwrap()[0]).abs() < 1e-12);
            assert!((cb.eval(&[t]).unwrap()[0] - b.eval(&[t]).unwrap()[0]).abs() < 1e-12);
        }
        let d = ca.sub(&cb).unwrap();
        assert!((d.eval(&[0.5]).unwrap()[0]
            - (a.eval(&[0.5]).unwrap()[0] - b.eval(&[0.5]).unwrap()[0]))
        .abs()
            < 1e-12);
    }

    #[test]
    fn second_operand_is_remapped_onto_the_first_domain() {
        let ka = KnotVector::uniform_open(2, 3, 0.0, 1.0).unwrap();
        let kb = KnotVector::uniform_open(2, 3, 5.0, 9.0).unwrap();
        let a = Multivar::bspline(vec![ka], scalar(vec![0.0, 1.0, 0.0])).unwrap();
        let b = Multivar::bspline(vec![kb], scalar(vec![2.0, 0.0, 2.0])).unwrap();
        let (ca, cb) = make_compatible(&a, &b, CompatOptions::default()).unwrap();
        assert_eq!(ca.domain(0).unwrap(), cb.domain(0).unwrap());
        // b's values survive the affine reparameterization.
        assert!((cb.eval(&[0.5]).unwrap()[0] - b.eval(&[7.0]).unwrap()[0]).abs() < 1e-12);
    }

    #[test]
    fn promoted_curves_broadcast_into_each_other() {
        // The solver's setup for curve/curve problems: each curve promoted
        // into a shared two-parameter space on its own axis.
        let kv = KnotVector::uniform_open(3, 4, 0.0, 1.0).unwrap();
        let c1 = Curve::bspline(scalar(vec![0.0, 1.0, 2.0, 1.5]), kv.clone()).unwrap();
        let c2 = Curve::bspline(scalar(vec![2.0, 0.5, -1.0, 0.0]), kv).unwrap();
        let a = Multivar::from_curve(&c1).unwrap().promote(2, 0).unwrap();
        let b = Multivar::from_curve(&c2).unwrap().promote(2, 1).unwrap();
        let (ca, cb) = make_compatible(&a, &b, CompatOptions::default()).unwrap();
        assert_eq!(ca.orders(), cb.orders());
        assert_eq!(ca.lengths(), cb.lengths());
        for i in 0..=4 {
            for j in 0..=4 {
                let p = [i as f64 / 4.0, j as f64 / 4.0];
                assert!(
                    (ca.eval(&p).unwrap()[0] - c1.eval(p[0]).unwrap()[0]).abs() < 1e-12,
                    "first operand changed at {:?}",
                    p
                );
                assert!(
                    (cb.eval(&p).unwrap()[0] - c2.eval(p[1]).unwrap()[0]).abs() < 1e-12,
                    "second operand changed at {:?}",
                    p
                );
            }
        }
        let d = ca.sub(&cb).unwrap();
        assert!(d.is_scalar());
    }

    #[test]
    fn make_compatible_is_idempotent() {
        let a = Multivar::bezier(&[2], scalar(vec![0.0, 1.0])).unwrap();
        let b = Multivar::bezier(&[3], scalar(vec![1.0, 0.0, 2.0])).unwrap();
        let (ca, cb) = make_compatible(&a, &b, CompatOptions::default()).unwrap();
        let (da, db) = make_compatible(&ca, &cb, CompatOptions::default()).unwrap();
        assert_eq!(ca, da);
        assert_eq!(cb, db);
    }

    #[test]
    fn rational_and_vector_types_widen() {
        let rational = CtlPoints::from_channels(
            PointType::new(1, true),
            vec![vec![1.0, 2.0], vec![0.0, 2.0]],
        )
        .unwrap();
        let a = Multivar::bezier(&[2], rational).unwrap();
        let b = Multivar::bezier(&[2], scalar(vec![5.0, 6.0])).unwrap();
        let (ca, cb) = make_compatible(&a, &b, CompatOptions::default()).unwrap();
        assert_eq!(ca.point_type(), cb.point_type());
        assert!(cb.point_type().is_rational());
        // b's euclidean values are unchanged by the weight-1 lift.
        assert!((cb.eval(&[0.5]).unwrap()[0] - 5.5).abs() < 1e-13);
    }
}
