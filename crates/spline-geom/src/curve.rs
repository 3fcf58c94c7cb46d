use serde::{Deserialize, Serialize};
use spline_basis::{
    basis_funcs, bernstein_basis, bernstein_diff, bernstein_product, bernstein_raise, knot_merge,
    knot_subtract, AlphaMatrix, KnotError, KnotVector, KNOT_EPS,
};

use crate::error::GeomError;
use crate::points::{CtlPoints, PointType};
use crate::BasisKind;

/// Relative distance from a domain endpoint inside which a subdivision
/// parameter is nudged inward instead of producing a degenerate half.
const BOUNDARY_NUDGE: f64 = 1e-10;

/// A parametric curve: control points blended by one of the supported bases.
///
/// B-spline curves carry an explicit knot vector; Bezier and power curves are
/// parameterized over [0, 1] and `knots` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    basis: BasisKind,
    order: usize,
    points: CtlPoints,
    knots: Option<KnotVector>,
}

impl Curve {
    /// Bezier curve; the order is the number of control points.
    pub fn bezier(points: CtlPoints) -> Result<Self, GeomError> {
        if points.is_empty() {
            return Err(GeomError::MeshSizeMismatch {
                expected: 1,
                found: 0,
            });
        }
        Ok(Self {
            basis: BasisKind::Bezier,
            order: points.len(),
            points,
            knots: None,
        })
    }

    /// B-spline curve over an explicit knot vector.
    pub fn bspline(points: CtlPoints, knots: KnotVector) -> Result<Self, GeomError> {
        if knots.num_ctl() != points.len() {
            return Err(GeomError::MeshSizeMismatch {
                expected: knots.num_ctl(),
                found: points.len(),
            });
        }
        Ok(Self {
            basis: BasisKind::Bspline,
            order: knots.order(),
            points,
            knots: Some(knots),
        })
    }

    /// Power-basis (monomial) curve over [0, 1].
    pub fn power(points: CtlPoints) -> Result<Self, GeomError> {
        if points.is_empty() {
            return Err(GeomError::MeshSizeMismatch {
                expected: 1,
                found: 0,
            });
        }
        Ok(Self {
            basis: BasisKind::Power,
            order: points.len(),
            points,
            knots: None,
        })
    }

    pub fn basis(&self) -> BasisKind {
        self.basis
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &CtlPoints {
        &self.points
    }

    pub fn knots(&self) -> Option<&KnotVector> {
        self.knots.as_ref()
    }

    pub fn point_type(&self) -> PointType {
        self.points.point_type()
    }

    pub fn is_rational(&self) -> bool {
        self.points.point_type().is_rational()
    }

    /// Parameter domain of the curve.
    pub fn domain(&self) -> (f64, f64) {
        match &self.knots {
            Some(kv) => kv.domain(),
            None => (0.0, 1.0),
        }
    }

    /// Evaluate the curve, returning euclidean coordinates.
    pub fn eval(&self, t: f64) -> Result<Vec<f64>, GeomError> {
        let raw = self.eval_channels(t)?;
        Ok(if self.is_rational() {
            let w = raw[0];
            raw[1..].iter().map(|v| v / w).collect()
        } else {
            raw
        })
    }

    /// Evaluate every raw channel (weight channel included when rational).
    pub fn eval_channels(&self, t: f64) -> Result<Vec<f64>, GeomError> {
        match self.basis {
            BasisKind::Bezier => {
                let t = clamp_unit(t)?;
                let vals = bernstein_basis(self.order, t);
                Ok(self.blend(0, &vals))
            }
            BasisKind::Bspline => {
                let kv = self.knots.as_ref().expect("bspline curve carries knots");
                let (first, vals) = basis_funcs(kv, t)?;
                Ok(self.blend(first, &vals))
            }
            BasisKind::Power => {
                let n = self.points.len();
                Ok((0..self.points.point_type().channels())
                    .map(|c| {
                        let ch = self.points.raw_channel(c);
                        (0..n).rev().fold(0.0, |acc, i| acc * t + ch[i])
                    })
                    .collect())
            }
        }
    }

    fn blend(&self, first: usize, vals: &[f64]) -> Vec<f64> {
        (0..self.points.point_type().channels())
            .map(|c| {
                let ch = self.points.raw_channel(c);
                vals.iter()
                    .enumerate()
                    .map(|(q, v)| v * ch[first + q])
                    .sum()
            })
            .collect()
    }

    /// Derivative curve with respect to the parameter.
    ///
    /// Rational curves are differentiated by the quotient rule and only in
    /// Bezier form (subdivide a rational B-spline into Bezier segments
    /// first); the result is again rational, with weight channel `w^2`.
    pub fn derivative(&self) -> Result<Curve, GeomError> {
        if self.is_rational() {
            return match self.basis {
                BasisKind::Bezier => self.rational_bezier_derivative(),
                _ => Err(GeomError::Unsupported(
                    "rational derivative outside Bezier form".into(),
                )),
            };
        }
        let ptype = self.points.point_type();
        let channels = ptype.channels();
        match self.basis {
            BasisKind::Power => {
                let n = self.points.len();
                let new_len = (n - 1).max(1);
                let mut out = CtlPoints::zeros(ptype, new_len);
                for c in 0..channels {
                    let src: Vec<f64> = self.points.raw_channel(c).to_vec();
                    let dst = out.raw_channel_mut(c);
                    for j in 0..n - 1 {
                        dst[j] = (j + 1) as f64 * src[j + 1];
                    }
                }
                Curve::power(out)
            }
            BasisKind::Bezier => {
                let k = self.order;
                if k == 1 {
                    return Curve::bezier(CtlPoints::zeros(ptype, 1));
                }
                let mut out = CtlPoints::zeros(ptype, k - 1);
                for c in 0..channels {
                    let src: Vec<f64> = self.points.raw_channel(c).to_vec();
                    let dst = out.raw_channel_mut(c);
                    for i in 0..k - 1 {
                        dst[i] = (k - 1) as f64 * (src[i + 1] - src[i]);
                    }
                }
                Curve::bezier(out)
            }
            BasisKind::Bspline => {
                let kv = self.knots.as_ref().expect("bspline curve carries knots");
                let k = self.order;
                if k == 1 {
                    return Err(GeomError::Unsupported(
                        "derivative of an order-1 spline".into(),
                    ));
                }
                let knots = kv.knots();
                let n = self.points.len();
                let mut out = CtlPoints::zeros(ptype, n - 1);
                for c in 0..channels {
                    let src: Vec<f64> = self.points.raw_channel(c).to_vec();
                    let dst = out.raw_channel_mut(c);
                    for i in 0..n - 1 {
                        let denom = knots[i + k] - knots[i + 1];
                        if denom.abs() >= KNOT_EPS {
                            dst[i] = (k - 1) as f64 * (src[i + 1] - src[i]) / denom;
                        }
                    }
                }
                let dkv = KnotVector::new(k - 1, knots[1..knots.len() - 1].to_vec())?;
                Curve::bspline(out, dkv)
            }
        }
    }

    fn rational_bezier_derivative(&self) -> Result<Curve, GeomError> {
        let ptype = self.points.point_type();
        let coords = ptype.coords();
        let k = self.order;
        let w = self.points.weights().expect("rational curve has weights");

        // Quotient rule in homogeneous channels: the euclidean derivative of
        // x/w is (x'w - xw') / w^2. The numerator has order 2k - 2 and the
        // weight w^2 order 2k - 1, so the numerator is degree-raised once to
        // share the result basis.
        let w2 = bernstein_product(w, w);
        let dw = bernstein_diff(w);
        let mut channels = Vec::with_capacity(coords + 1);
        channels.push(w2);
        for c in 0..coords {
            let x = self.points.coord_channel(c);
            let dx = bernstein_diff(x);
            let a = bernstein_product(&dx, w);
            let b = bernstein_product(x, &dw);
            let num: Vec<f64> = a.iter().zip(&b).map(|(p, q)| p - q).collect();
            channels.push(bernstein_raise(&num));
        }
        let out = CtlPoints::from_channels(PointType::new(coords, true), channels)?;
        Curve::bezier(out)
    }

    /// Split the curve at parameter `t` into two curves covering
    /// `[min, t]` and `[t, max]` of the original domain.
    pub fn subdivide(&self, t: f64) -> Result<(Curve, Curve), GeomError> {
        match self.basis {
            BasisKind::Power => Err(GeomError::Unsupported(
                "subdivision in the power basis".into(),
            )),
            BasisKind::Bezier => {
                let t = clamp_unit(t)?;
                let ptype = self.points.point_type();
                let channels = ptype.channels();
                let k = self.order;
                let mut left = CtlPoints::zeros(ptype, k);
                let mut right = CtlPoints::zeros(ptype, k);
                for c in 0..channels {
                    let mut beta: Vec<f64> = self.points.raw_channel(c).to_vec();
                    // One de Casteljau sweep; the left half reads the leading
                    // edge of the triangle, the right half the trailing edge.
                    left.raw_channel_mut(c)[0] = beta[0];
                    right.raw_channel_mut(c)[k - 1] = beta[k - 1];
                    for r in 1..k {
                        for i in 0..k - r {
                            beta[i] = (1.0 - t) * beta[i] + t * beta[i + 1];
                        }
                        left.raw_channel_mut(c)[r] = beta[0];
                        right.raw_channel_mut(c)[k - 1 - r] = beta[k - 1 - r];
                    }
                }
                Ok((Curve::bezier(left)?, Curve::bezier(right)?))
            }
            BasisKind::Bspline => self.subdivide_bspline(t),
        }
    }

    fn subdivide_bspline(&self, t: f64) -> Result<(Curve, Curve), GeomError> {
        let kv = self.knots.as_ref().expect("bspline curve carries knots");
        let k = self.order;
        let (min, max) = kv.domain();
        if t < min - KNOT_EPS || t > max + KNOT_EPS {
            return Err(GeomError::Knot(KnotError::OutOfDomain { t, min, max }));
        }
        // A split exactly on a clamped end would leave one half without a
        // valid knot vector; nudge inward and return a sliver instead. The
        // floor keeps the nudged value outside the span-search tolerance.
        let nudge = (BOUNDARY_NUDGE * (max - min)).max(2.0 * KNOT_EPS);
        let t = t.clamp(min + nudge, max - nudge);

        // Raise the multiplicity of t to order - 1; the split halves then
        // share a single control point sitting on the curve.
        let mu = kv.multiplicity(t);
        let refined = if mu < k - 1 {
            let inserts = vec![t; k - 1 - mu];
            self.refine(&knot_merge(kv.knots(), &inserts))?
        } else {
            self.clone()
        };
        let rkv = refined.knots.as_ref().expect("refined curve is b-spline");
        let rknots = rkv.knots();
        let e = rkv.last_index_le(t);

        let ptype = self.points.point_type();
        let channels = ptype.channels();

        if mu >= k {
            // The curve is already discontinuous at t; the halves partition
            // the control points with nothing shared.
            let cut = e + 1 - k;
            let left_kv = KnotVector::new(k, rknots[..=e].to_vec())?;
            let right_kv = KnotVector::new(k, rknots[cut..].to_vec())?;
            let take = |lo: usize, hi: usize| -> Result<CtlPoints, GeomError> {
                let mut pts = CtlPoints::zeros(ptype, hi - lo);
                for c in 0..channels {
                    let src = refined.points.raw_channel(c)[lo..hi].to_vec();
                    pts.raw_channel_mut(c).copy_from_slice(&src);
                }
                Ok(pts)
            };
            let left = Curve::bspline(take(0, cut)?, left_kv)?;
            let right = Curve::bspline(take(cut, refined.points.len())?, right_kv)?;
            return Ok((left, right));
        }

        let s = e + 1 - k;
        let mut left_knots = rknots[..=e].to_vec();
        left_knots.push(t);
        let mut right_knots = vec![t];
        right_knots.extend_from_slice(&rknots[e + 2 - k..]);
        let left_kv = KnotVector::new(k, left_knots)?;
        let right_kv = KnotVector::new(k, right_knots)?;

        let mut left_pts = CtlPoints::zeros(ptype, s + 1);
        let mut right_pts = CtlPoints::zeros(ptype, refined.points.len() - s);
        for c in 0..channels {
            let src = refined.points.raw_channel(c).to_vec();
            left_pts.raw_channel_mut(c).copy_from_slice(&src[..=s]);
            right_pts.raw_channel_mut(c).copy_from_slice(&src[s..]);
        }
        Ok((
            Curve::bspline(left_pts, left_kv)?,
            Curve::bspline(right_pts, right_kv)?,
        ))
    }

    /// Insert the given parameters as knots, merged with the existing
    /// vector; repeated values raise multiplicity.
    pub fn refine_at_params(&self, params: &[f64]) -> Result<Curve, GeomError> {
        let kv = self.knots.as_ref().ok_or(GeomError::WrongBasis {
            expected: BasisKind::Bspline,
            found: self.basis,
        })?;
        let (min, max) = kv.domain();
        for &t in params {
            if t < min || t > max {
                return Err(GeomError::Knot(KnotError::OutOfDomain { t, min, max }));
            }
        }
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("refinement knots are finite"));
        self.refine(&knot_merge(kv.knots(), &sorted))
    }

    /// Re-express the curve over a refined knot vector (a multiset superset
    /// of the current one). The curve's shape is unchanged.
    pub fn refine(&self, new_knots: &[f64]) -> Result<Curve, GeomError> {
        let kv = match (&self.basis, &self.knots) {
            (BasisKind::Bspline, Some(kv)) => kv,
            _ => {
                return Err(GeomError::WrongBasis {
                    expected: BasisKind::Bspline,
                    found: self.basis,
                })
            }
        };
        let alpha = AlphaMatrix::build(self.order, kv, new_knots)?;
        let ptype = self.points.point_type();
        let mut out = CtlPoints::zeros(ptype, alpha.new_len());
        for c in 0..ptype.channels() {
            let src = self.points.raw_channel(c).to_vec();
            alpha.apply(&src, 0, 1, out.raw_channel_mut(c), 0, 1);
        }
        Curve::bspline(out, KnotVector::new(self.order, new_knots.to_vec())?)
    }

    /// Raise a Bezier curve's order by one without changing its shape.
    pub fn degree_raise(&self) -> Result<Curve, GeomError> {
        if self.basis != BasisKind::Bezier {
            return Err(GeomError::WrongBasis {
                expected: BasisKind::Bezier,
                found: self.basis,
            });
        }
        let ptype = self.points.point_type();
        let mut out = CtlPoints::zeros(ptype, self.order + 1);
        for c in 0..ptype.channels() {
            let raised = bernstein_raise(self.points.raw_channel(c));
            out.raw_channel_mut(c).copy_from_slice(&raised);
        }
        Curve::bezier(out)
    }

    /// The same locus traversed in the opposite direction: the parameter is
    /// mirrored across the knot range (for clamped curves, the reversed
    /// curve at `t` equals this curve at `min + max - t`).
    pub fn reverse(&self) -> Result<Curve, GeomError> {
        let ptype = self.points.point_type();
        match self.basis {
            BasisKind::Power => {
                // Substitute 1 - t: new_j = (-1)^j * sum_{i >= j} C(i, j) c_i.
                let n = self.points.len();
                let mut out = CtlPoints::zeros(ptype, n);
                for c in 0..ptype.channels() {
                    let src: Vec<f64> = self.points.raw_channel(c).to_vec();
                    let dst = out.raw_channel_mut(c);
                    for (j, d) in dst.iter_mut().enumerate() {
                        let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                        *d = sign
                            * (j..n)
                                .map(|i| spline_basis::binomial(i, j) * src[i])
                                .sum::<f64>();
                    }
                }
                Curve::power(out)
            }
            BasisKind::Bezier => Curve::bezier(reverse_points(&self.points)),
            BasisKind::Bspline => {
                let kv = self.knots.as_ref().expect("bspline curve carries knots");
                let knots = kv.knots();
                let lo = knots[0];
                let hi = knots[knots.len() - 1];
                let mirrored: Vec<f64> =
                    knots.iter().rev().map(|&k| lo + hi - k).collect();
                Curve::bspline(
                    reverse_points(&self.points),
                    KnotVector::new(kv.order(), mirrored)?,
                )
            }
        }
    }

    /// Convert to an equivalent B-spline curve.
    pub fn to_bspline(&self) -> Result<Curve, GeomError> {
        match self.basis {
            BasisKind::Bspline => Ok(self.clone()),
            BasisKind::Bezier => {
                Curve::bspline(self.points.clone(), KnotVector::bezier(self.order)?)
            }
            BasisKind::Power => {
                let ptype = self.points.point_type();
                let mut out = CtlPoints::zeros(ptype, self.points.len());
                for c in 0..ptype.channels() {
                    let bez = crate::power::power_to_bezier(self.points.raw_channel(c));
                    out.raw_channel_mut(c).copy_from_slice(&bez);
                }
                Curve::bspline(out, KnotVector::bezier(self.order)?)
            }
        }
    }
}

/// Bring two curves onto a shared representation so pointwise comparisons
/// and arithmetic line up: common point type, matched orders (raised while
/// still Bezier), B-spline form when either operand needs it, the second
/// operand's domain remapped onto the first's, and unified knot vectors.
/// Returns adjusted copies; the inputs are untouched.
pub fn make_curves_compatible(a: &Curve, b: &Curve) -> Result<(Curve, Curve), GeomError> {
    let common = PointType::common(a.point_type(), b.point_type());
    let mut a = Curve {
        points: a.points.coerce(common)?,
        ..a.clone()
    };
    let mut b = Curve {
        points: b.points.coerce(common)?,
        ..b.clone()
    };

    if a.basis == BasisKind::Power {
        a = a.to_bspline()?;
    }
    if b.basis == BasisKind::Power {
        b = b.to_bspline()?;
    }

    // Order raising is a Bezier operation; do it before any promotion.
    while a.basis == BasisKind::Bezier && a.order < b.order {
        a = a.degree_raise()?;
    }
    while b.basis == BasisKind::Bezier && b.order < a.order {
        b = b.degree_raise()?;
    }

    if a.basis != b.basis || a.basis == BasisKind::Bspline {
        a = a.to_bspline()?;
        b = b.to_bspline()?;
        if a.order != b.order {
            return Err(GeomError::Unsupported(
                "order mismatch between b-spline curves".into(),
            ));
        }

        let (amin, amax) = a.domain();
        let bkv = b.knots.as_ref().expect("bspline curve carries knots");
        let remapped = bkv.affine_remap(amin, amax);
        b = Curve::bspline(b.points.clone(), remapped)?;

        let akv = a.knots.as_ref().expect("bspline curve carries knots");
        let bkv = b.knots.as_ref().expect("bspline curve carries knots");
        let missing_in_a = knot_subtract(bkv.knots(), akv.knots());
        let missing_in_b = knot_subtract(akv.knots(), bkv.knots());
        if !missing_in_a.is_empty() {
            let merged = knot_merge(akv.knots(), &missing_in_a);
            a = a.refine(&merged)?;
        }
        if !missing_in_b.is_empty() {
            let bkv = b.knots.as_ref().expect("bspline curve carries knots");
            let merged = knot_merge(bkv.knots(), &missing_in_b);
            b = b.refine(&merged)?;
        }
    }

    Ok((a, b))
}

fn reverse_points(points: &CtlPoints) -> CtlPoints {
    let ptype = points.point_type();
    let mut out = CtlPoints::zeros(ptype, points.len());
    for c in 0..ptype.channels() {
        let mut ch: Vec<f64> = points.raw_channel(c).to_vec();
        ch.reverse();
        out.raw_channel_mut(c).copy_from_slice(&ch);
    }
    out
}

fn clamp_unit(t: f64) -> Result<f64, GeomError> {
    if t < -KNOT_EPS || t > 1.0 + KNOT_EPS {
        return Err(GeomError::Knot(KnotError::OutOfDomain {
            t,
            min: 0.0,
            max: 1.0,
        }));
    }
    Ok(t.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_curve(vals: &[f64]) -> CtlPoints {
        CtlPoints::from_channels(PointType::new(1, false), vec![vals.to_vec()]).unwrap()
    }

    #[test]
    fn bezier_line_interpolates() {
        let c = Curve::bezier(scalar_curve(&[2.0, 6.0])).unwrap();
        assert!((c.eval(0.25).unwrap()[0] - 3.0).abs() < 1e-14);
        assert!((c.eval(1.0).unwrap()[0] - 6.0).abs() < 1e-14);
    }

    #[test]
    fn rational_quarter_circle_stays_on_the_circle() {
        // Standard order-3 rational Bezier arc from (1,0) to (0,1) with the
        // middle weight sqrt(2)/2, stored homogeneously.
        let w1 = (2.0_f64).sqrt() / 2.0;
        let pts = CtlPoints::from_channels(
            PointType::new(2, true),
            vec![
                vec![1.0, w1, 1.0],
                vec![1.0, w1, 0.0],
                vec![0.0, w1, 1.0],
            ],
        )
        .unwrap();
        let arc = Curve::bezier(pts).unwrap();
        for i in 0..=8 {
            let t = i as f64 / 8.0;
            let p = arc.eval(t).unwrap();
            let r2 = p[0] * p[0] + p[1] * p[1];
            assert!((r2 - 1.0).abs() < 1e-12, "off circle at t={}: r^2={}", t, r2);
        }
    }

    #[test]
    fn bezier_derivative_matches_finite_difference() {
        let c = Curve::bezier(scalar_curve(&[0.0, 2.0, -1.0, 3.0])).unwrap();
        let d = c.derivative().unwrap();
        let h = 1e-6;
        for i in 1..8 {
            let t = i as f64 / 8.0;
            let fd = (c.eval(t + h).unwrap()[0] - c.eval(t - h).unwrap()[0]) / (2.0 * h);
            assert!(
                (d.eval(t).unwrap()[0] - fd).abs() < 1e-5,
                "derivative mismatch at t={}",
                t
            );
        }
    }

    #[test]
    fn rational_derivative_is_tangent_to_the_circle() {
        let w1 = (2.0_f64).sqrt() / 2.0;
        let pts = CtlPoints::from_channels(
            PointType::new(2, true),
            vec![
                vec![1.0, w1, 1.0],
                vec![1.0, w1, 0.0],
                vec![0.0, w1, 1.0],
            ],
        )
        .unwrap();
        let arc = Curve::bezier(pts).unwrap();
        let d = arc.derivative().unwrap();
        assert!(d.is_rational());
        assert_eq!(d.order(), 2 * arc.order() - 1);
        for i in 0..=6 {
            let t = i as f64 / 6.0;
            let p = arc.eval(t).unwrap();
            let v = d.eval(t).unwrap();
            let dot = p[0] * v[0] + p[1] * v[1];
            assert!(dot.abs() < 1e-10, "tangent not orthogonal at t={}: {}", t, dot);
        }
    }

    #[test]
    fn bspline_derivative_matches_finite_difference() {
        let kv = KnotVector::uniform_open(4, 7, 0.0, 1.0).unwrap();
        let c = Curve::bspline(scalar_curve(&[0.0, 1.0, -2.0, 0.5, 3.0, 1.0, 0.0]), kv).unwrap();
        let d = c.derivative().unwrap();
        let h = 1e-6;
        for i in 1..10 {
            let t = i as f64 / 10.0;
            let fd = (c.eval(t + h).unwrap()[0] - c.eval(t - h).unwrap()[0]) / (2.0 * h);
            assert!(
                (d.eval(t).unwrap()[0] - fd).abs() < 1e-4,
                "derivative mismatch at t={}",
                t
            );
        }
    }

    #[test]
    fn bezier_subdivision_reproduces_the_curve() {
        let c = Curve::bezier(scalar_curve(&[1.0, -2.0, 4.0, 0.0])).unwrap();
        let (l, r) = c.subdivide(0.3).unwrap();
        for i in 0..=10 {
            let s = i as f64 / 10.0;
            let lt = s * 0.3;
            assert!(
                (l.eval(s).unwrap()[0] - c.eval(lt).unwrap()[0]).abs() < 1e-12,
                "left half diverges at s={}",
                s
            );
            let rt = 0.3 + s * 0.7;
            assert!(
                (r.eval(s).unwrap()[0] - c.eval(rt).unwrap()[0]).abs() < 1e-12,
                "right half diverges at s={}",
                s
            );
        }
    }

    #[test]
    fn bspline_subdivision_covers_both_sides() {
        let kv = KnotVector::uniform_open(3, 6, 0.0, 2.0).unwrap();
        let c = Curve::bspline(scalar_curve(&[0.0, 1.0, 3.0, -1.0, 2.0, 0.5]), kv).unwrap();
        let (l, r) = c.subdivide(0.8).unwrap();

        let (lmin, lmax) = l.domain();
        let (rmin, rmax) = r.domain();
        assert!((lmin - 0.0).abs() < 1e-12 && (lmax - 0.8).abs() < 1e-12);
        assert!((rmin - 0.8).abs() < 1e-12 && (rmax - 2.0).abs() < 1e-12);

        for i in 0..=20 {
            let t = 2.0 * i as f64 / 20.0;
            let expect = c.eval(t).unwrap()[0];
            let got = if t <= 0.8 {
                l.eval(t).unwrap()[0]
            } else {
                r.eval(t).unwrap()[0]
            };
            assert!((expect - got).abs() < 1e-12, "split diverges at t={}", t);
        }
        // The halves share the split point.
        assert!((l.eval(0.8).unwrap()[0] - r.eval(0.8).unwrap()[0]).abs() < 1e-12);
    }

    #[test]
    fn subdivision_at_a_clamped_end_returns_a_sliver() {
        let kv = KnotVector::uniform_open(3, 6, 0.0, 2.0).unwrap();
        let c = Curve::bspline(scalar_curve(&[0.0, 1.0, 3.0, -1.0, 2.0, 0.5]), kv).unwrap();

        let (l, r) = c.subdivide(2.0).unwrap();
        let (rmin, rmax) = r.domain();
        assert!(rmax - rmin < 1e-8, "right half should be a sliver");
        for i in 0..=10 {
            let t = 2.0 * i as f64 / 10.0 * 0.95;
            approx::assert_relative_eq!(
                l.eval(t).unwrap()[0],
                c.eval(t).unwrap()[0],
                epsilon = 1e-9
            );
        }
        approx::assert_relative_eq!(r.eval(rmax).unwrap()[0], c.eval(2.0).unwrap()[0], epsilon = 1e-8);

        let (l, r) = c.subdivide(0.0).unwrap();
        let (lmin, lmax) = l.domain();
        assert!(lmax - lmin < 1e-8, "left half should be a sliver");
        approx::assert_relative_eq!(l.eval(lmin).unwrap()[0], c.eval(0.0).unwrap()[0], epsilon = 1e-8);
        for i in 1..=10 {
            let t = 2.0 * i as f64 / 10.0;
            approx::assert_relative_eq!(
                r.eval(t).unwrap()[0],
                c.eval(t).unwrap()[0],
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn refinement_and_degree_raise_preserve_shape() {
        let kv = KnotVector::uniform_open(3, 5, 0.0, 1.0).unwrap();
        let c = Curve::bspline(scalar_curve(&[0.0, 2.0, -1.0, 1.0, 0.5]), kv.clone()).unwrap();
        let refined = c
            .refine(&knot_merge(kv.knots(), &[0.15, 0.5, 0.5]))
            .unwrap();
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert!((refined.eval(t).unwrap()[0] - c.eval(t).unwrap()[0]).abs() < 1e-12);
        }

        let b = Curve::bezier(scalar_curve(&[1.0, 0.0, 2.0])).unwrap();
        let raised = b.degree_raise().unwrap();
        assert_eq!(raised.order(), 4);
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert!((raised.eval(t).unwrap()[0] - b.eval(t).unwrap()[0]).abs() < 1e-13);
        }
    }

    #[test]
    fn power_curve_converts_through_bspline() {
        // 1 + 4t - 3t^2 in the monomial basis.
        let p = Curve::power(scalar_curve(&[1.0, 4.0, -3.0])).unwrap();
        let s = p.to_bspline().unwrap();
        assert_eq!(s.basis(), BasisKind::Bspline);
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert!(
                (s.eval(t).unwrap()[0] - p.eval(t).unwrap()[0]).abs() < 1e-12,
                "conversion diverges at t={}",
                t
            );
        }
    }

    #[test]
    fn power_subdivision_is_rejected() {
        let p = Curve::power(scalar_curve(&[1.0, 4.0])).unwrap();
        assert!(matches!(
            p.subdivide(0.5),
            Err(GeomError::Unsupported(_))
        ));
    }

    #[test]
    fn refine_at_params_inserts_and_preserves_shape() {
        let kv = KnotVector::uniform_open(3, 5, 0.0, 1.0).unwrap();
        let c = Curve::bspline(scalar_curve(&[0.0, 2.0, -1.0, 1.0, 0.5]), kv).unwrap();
        // Unsorted on purpose; repeated value raises multiplicity.
        let refined = c.refine_at_params(&[0.7, 0.2, 0.7]).unwrap();
        let rkv = refined.knots().unwrap();
        assert_eq!(rkv.multiplicity(0.7), 2);
        assert_eq!(rkv.multiplicity(0.2), 1);
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            approx::assert_relative_eq!(
                refined.eval(t).unwrap()[0],
                c.eval(t).unwrap()[0],
                epsilon = 1e-12
            );
        }
        assert!(c.refine_at_params(&[1.5]).is_err());
    }

    #[test]
    fn reversed_curve_traces_backwards() {
        let bez = Curve::bezier(scalar_curve(&[1.0, -2.0, 4.0, 0.0])).unwrap();
        let rbez = bez.reverse().unwrap();
        let kv = KnotVector::uniform_open(3, 6, 0.5, 2.5).unwrap();
        let bsp = Curve::bspline(scalar_curve(&[0.0, 1.0, 3.0, -1.0, 2.0, 0.5]), kv).unwrap();
        let rbsp = bsp.reverse().unwrap();
        let pow = Curve::power(scalar_curve(&[1.0, 4.0, -3.0])).unwrap();
        let rpow = pow.reverse().unwrap();

        for i in 0..=10 {
            let t = i as f64 / 10.0;
            approx::assert_relative_eq!(
                rbez.eval(t).unwrap()[0],
                bez.eval(1.0 - t).unwrap()[0],
                epsilon = 1e-12
            );
            approx::assert_relative_eq!(
                rpow.eval(t).unwrap()[0],
                pow.eval(1.0 - t).unwrap()[0],
                epsilon = 1e-12
            );
            let s = 0.5 + 2.0 * t;
            approx::assert_relative_eq!(
                rbsp.eval(s).unwrap()[0],
                bsp.eval(3.0 - s).unwrap()[0],
                epsilon = 1e-11
            );
        }
    }

    #[test]
    fn compatible_beziers_share_order_and_point_type() {
        let a = Curve::bezier(scalar_curve(&[1.0, 0.0, 2.0])).unwrap();
        let pts = CtlPoints::from_channels(
            PointType::new(2, false),
            vec![vec![0.0, 1.0], vec![3.0, -1.0]],
        )
        .unwrap();
        let b = Curve::bezier(pts).unwrap();
        let (ca, cb) = make_curves_compatible(&a, &b).unwrap();
        assert_eq!(ca.order(), 3);
        assert_eq!(cb.order(), 3);
        assert_eq!(ca.point_type(), cb.point_type());
        assert_eq!(ca.basis(), BasisKind::Bezier);
        for i in 0..=8 {
            let t = i as f64 / 8.0;
            approx::assert_relative_eq!(
                ca.eval(t).unwrap()[0],
                a.eval(t).unwrap()[0],
                epsilon = 1e-12
            );
            let expect = b.eval(t).unwrap();
            let got = cb.eval(t).unwrap();
            approx::assert_relative_eq!(got[0], expect[0], epsilon = 1e-12);
            approx::assert_relative_eq!(got[1], expect[1], epsilon = 1e-12);
        }
    }

    #[test]
    fn compatible_bsplines_merge_knots_and_domains() {
        let akv = KnotVector::uniform_open(3, 5, 0.0, 1.0).unwrap();
        let a = Curve::bspline(scalar_curve(&[0.0, 2.0, -1.0, 1.0, 0.5]), akv).unwrap();
        let bkv = KnotVector::uniform_open(3, 6, 2.0, 4.0).unwrap();
        let b = Curve::bspline(scalar_curve(&[1.0, 0.0, 3.0, -2.0, 0.5, 1.0]), bkv).unwrap();
        let (ca, cb) = make_curves_compatible(&a, &b).unwrap();
        assert_eq!(ca.knots().unwrap().knots(), cb.knots().unwrap().knots());
        assert_eq!(ca.domain(), (0.0, 1.0));
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            approx::assert_relative_eq!(
                ca.eval(t).unwrap()[0],
                a.eval(t).unwrap()[0],
                epsilon = 1e-12
            );
            // b's domain [2, 4] is remapped onto [0, 1].
            approx::assert_relative_eq!(
                cb.eval(t).unwrap()[0],
                b.eval(2.0 + 2.0 * t).unwrap()[0],
                epsilon = 1e-11
            );
        }
    }

    #[test]
    fn compatible_bezier_and_bspline_become_bsplines() {
        let a = Curve::bezier(scalar_curve(&[1.0, 0.0, 2.0])).unwrap();
        let bkv = KnotVector::uniform_open(3, 5, 0.0, 1.0).unwrap();
        let b = Curve::bspline(scalar_curve(&[0.0, 2.0, -1.0, 1.0, 0.5]), bkv).unwrap();
        let (ca, cb) = make_curves_compatible(&a, &b).unwrap();
        assert_eq!(ca.basis(), BasisKind::Bspline);
        assert_eq!(cb.basis(), BasisKind::Bspline);
        assert_eq!(ca.knots().unwrap().knots(), cb.knots().unwrap().knots());
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            approx::assert_relative_eq!(
                ca.eval(t).unwrap()[0],
                a.eval(t).unwrap()[0],
                epsilon = 1e-12
            );
            approx::assert_relative_eq!(
                cb.eval(t).unwrap()[0],
                b.eval(t).unwrap()[0],
                epsilon = 1e-12
            );
        }
    }
}
