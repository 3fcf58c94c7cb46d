use serde::{Deserialize, Serialize};
use spline_basis::{basis_funcs, bernstein_basis, KnotError, KnotVector, KNOT_EPS};

use crate::curve::Curve;
use crate::error::GeomError;
use crate::points::{CtlPoints, PointType};
use crate::BasisKind;

/// A tensor-product surface over parameters `(u, v)`.
///
/// Control points are stored u-fastest: point `(i, j)` lives at flat index
/// `i + j * lengths[0]`. Both axes share the basis kind; B-spline surfaces
/// carry one knot vector per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    basis: BasisKind,
    orders: [usize; 2],
    lengths: [usize; 2],
    points: CtlPoints,
    knots: [Option<KnotVector>; 2],
}

/// Precomputed basis blend for one fixed parameter of a [`Surface`].
///
/// Evaluating many points along an iso-parameter line repeats the same
/// basis-function computation on the fixed axis; callers that sweep a line
/// build the cache once and pass it to [`Surface::eval_with_cache`].
#[derive(Debug, Clone)]
pub struct IsoCache {
    axis: usize,
    first: usize,
    vals: Vec<f64>,
}

impl IsoCache {
    pub fn axis(&self) -> usize {
        self.axis
    }
}

impl Surface {
    /// Bezier patch with `lengths[0] * lengths[1]` control points; the orders
    /// equal the lengths.
    pub fn bezier(lengths: [usize; 2], points: CtlPoints) -> Result<Self, GeomError> {
        if points.len() != lengths[0] * lengths[1] {
            return Err(GeomError::MeshSizeMismatch {
                expected: lengths[0] * lengths[1],
                found: points.len(),
            });
        }
        Ok(Self {
            basis: BasisKind::Bezier,
            orders: lengths,
            lengths,
            points,
            knots: [None, None],
        })
    }

    /// Tensor-product B-spline surface over two knot vectors.
    pub fn bspline(points: CtlPoints, ku: KnotVector, kv: KnotVector) -> Result<Self, GeomError> {
        let lengths = [ku.num_ctl(), kv.num_ctl()];
        if points.len() != lengths[0] * lengths[1] {
            return Err(GeomError::MeshSizeMismatch {
                expected: lengths[0] * lengths[1],
                found: points.len(),
            });
        }
        Ok(Self {
            basis: BasisKind::Bspline,
            orders: [ku.order(), kv.order()],
            lengths,
            points,
            knots: [Some(ku), Some(kv)],
        })
    }

    pub fn basis(&self) -> BasisKind {
        self.basis
    }

    pub fn orders(&self) -> [usize; 2] {
        self.orders
    }

    pub fn lengths(&self) -> [usize; 2] {
        self.lengths
    }

    pub fn points(&self) -> &CtlPoints {
        &self.points
    }

    pub fn knots(&self, axis: usize) -> Option<&KnotVector> {
        self.knots[axis].as_ref()
    }

    pub fn point_type(&self) -> PointType {
        self.points.point_type()
    }

    /// Parameter domain along one axis.
    pub fn domain(&self, axis: usize) -> Result<(f64, f64), GeomError> {
        self.check_axis(axis)?;
        Ok(match &self.knots[axis] {
            Some(kv) => kv.domain(),
            None => (0.0, 1.0),
        })
    }

    fn check_axis(&self, axis: usize) -> Result<(), GeomError> {
        if axis >= 2 {
            return Err(GeomError::InvalidAxis { axis, dim: 2 });
        }
        Ok(())
    }

    fn axis_basis(&self, axis: usize, t: f64) -> Result<(usize, Vec<f64>), GeomError> {
        match &self.knots[axis] {
            Some(kv) => Ok(basis_funcs(kv, t)?),
            None => {
                if t < -KNOT_EPS || t > 1.0 + KNOT_EPS {
                    return Err(GeomError::Knot(KnotError::OutOfDomain {
                        t,
                        min: 0.0,
                        max: 1.0,
                    }));
                }
                Ok((0, bernstein_basis(self.orders[axis], t.clamp(0.0, 1.0))))
            }
        }
    }

    /// Precompute the basis blend for `t` on `axis`.
    pub fn iso_cache(&self, axis: usize, t: f64) -> Result<IsoCache, GeomError> {
        self.check_axis(axis)?;
        let (first, vals) = self.axis_basis(axis, t)?;
        Ok(IsoCache { axis, first, vals })
    }

    /// Evaluate with one axis's blend precomputed; `s` is the parameter on
    /// the remaining axis.
    pub fn eval_with_cache(&self, cache: &IsoCache, s: f64) -> Result<Vec<f64>, GeomError> {
        let other = 1 - cache.axis;
        let (ofirst, ovals) = self.axis_basis(other, s)?;

        let ptype = self.points.point_type();
        let len_u = self.lengths[0];
        let mut raw = Vec::with_capacity(ptype.channels());
        for c in 0..ptype.channels() {
            let ch = self.points.raw_channel(c);
            let mut acc = 0.0;
            for (qa, &va) in cache.vals.iter().enumerate() {
                for (qo, &vo) in ovals.iter().enumerate() {
                    let (i, j) = if cache.axis == 0 {
                        (cache.first + qa, ofirst + qo)
                    } else {
                        (ofirst + qo, cache.first + qa)
                    };
                    acc += va * vo * ch[i + j * len_u];
                }
            }
            raw.push(acc);
        }
        Ok(finish_rational(ptype, raw))
    }

    /// Evaluate the surface at `(u, v)`, returning euclidean coordinates.
    pub fn eval(&self, u: f64, v: f64) -> Result<Vec<f64>, GeomError> {
        let cache = self.iso_cache(1, v)?;
        self.eval_with_cache(&cache, u)
    }

    /// The curve traced by fixing `axis` at parameter `t`.
    pub fn iso_curve(&self, axis: usize, t: f64) -> Result<Curve, GeomError> {
        self.check_axis(axis)?;
        let (first, vals) = self.axis_basis(axis, t)?;
        let other = 1 - axis;
        let ptype = self.points.point_type();
        let len_u = self.lengths[0];

        let mut out = CtlPoints::zeros(ptype, self.lengths[other]);
        for c in 0..ptype.channels() {
            let ch = self.points.raw_channel(c).to_vec();
            let dst = out.raw_channel_mut(c);
            for (p, d) in dst.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (q, &v) in vals.iter().enumerate() {
                    let (i, j) = if axis == 0 { (first + q, p) } else { (p, first + q) };
                    acc += v * ch[i + j * len_u];
                }
                *d = acc;
            }
        }
        match self.basis {
            BasisKind::Bezier => Curve::bezier(out),
            BasisKind::Bspline => Curve::bspline(
                out,
                self.knots[other].clone().expect("bspline surface knots"),
            ),
            BasisKind::Power => Err(GeomError::Unsupported("power-basis surface".into())),
        }
    }

    /// Split the surface along one axis at parameter `t`.
    pub fn subdivide(&self, axis: usize, t: f64) -> Result<(Surface, Surface), GeomError> {
        self.check_axis(axis)?;
        let halves = self.map_lines(axis, |line| {
            let (l, r) = line.subdivide(t)?;
            Ok(vec![l, r])
        })?;
        let mut it = halves.into_iter();
        Ok((it.next().unwrap(), it.next().unwrap()))
    }

    /// Refine the knot vector along one axis; the surface is unchanged.
    pub fn refine(&self, axis: usize, new_knots: &[f64]) -> Result<Surface, GeomError> {
        self.check_axis(axis)?;
        let mut refined = self.map_lines(axis, |line| Ok(vec![line.refine(new_knots)?]))?;
        Ok(refined.remove(0))
    }

    /// Apply a curve operation to every control line along `axis` and
    /// reassemble the resulting surfaces (one per curve the operation
    /// returns). Every line must produce structurally identical curves.
    fn map_lines<F>(&self, axis: usize, op: F) -> Result<Vec<Surface>, GeomError>
    where
        F: Fn(&Curve) -> Result<Vec<Curve>, GeomError>,
    {
        let other = 1 - axis;
        let ptype = self.points.point_type();
        let channels = ptype.channels();
        let len_u = self.lengths[0];

        let mut outputs: Vec<(Vec<CtlPoints>, Curve)> = Vec::new();
        for p in 0..self.lengths[other] {
            // Gather one control line along `axis`.
            let mut line_ch = vec![vec![0.0; self.lengths[axis]]; channels];
            for c in 0..channels {
                for q in 0..self.lengths[axis] {
                    let (i, j) = if axis == 0 { (q, p) } else { (p, q) };
                    line_ch[c][q] = self.points.raw_channel(c)[i + j * len_u];
                }
            }
            let line_pts = CtlPoints::from_channels(ptype, line_ch)?;
            let line = match self.basis {
                BasisKind::Bezier => Curve::bezier(line_pts)?,
                BasisKind::Bspline => Curve::bspline(
                    line_pts,
                    self.knots[axis].clone().expect("bspline surface knots"),
                )?,
                BasisKind::Power => {
                    return Err(GeomError::Unsupported("power-basis surface".into()))
                }
            };
            let results = op(&line)?;

            if p == 0 {
                for r in &results {
                    outputs.push((
                        vec![CtlPoints::zeros(ptype, r.len() * self.lengths[other])],
                        r.clone(),
                    ));
                }
            }
            for (slot, r) in outputs.iter_mut().zip(&results) {
                if r.len() != slot.1.len() {
                    return Err(GeomError::MeshSizeMismatch {
                        expected: slot.1.len(),
                        found: r.len(),
                    });
                }
                let new_axis_len = r.len();
                let new_len_u = if axis == 0 { new_axis_len } else { self.lengths[0] };
                let dst = &mut slot.0[0];
                for c in 0..channels {
                    for q in 0..new_axis_len {
                        let (i, j) = if axis == 0 { (q, p) } else { (p, q) };
                        dst.raw_channel_mut(c)[i + j * new_len_u] =
                            r.points().raw_channel(c)[q];
                    }
                }
            }
        }

        outputs
            .into_iter()
            .map(|(mut pts, proto)| {
                let points = pts.remove(0);
                let axis_kv = proto.knots().cloned();
                match self.basis {
                    BasisKind::Bezier => {
                        let mut lengths = self.lengths;
                        lengths[axis] = proto.len();
                        Surface::bezier(lengths, points)
                    }
                    BasisKind::Bspline => {
                        let kv_axis = axis_kv.expect("bspline line keeps knots");
                        let kv_other = self.knots[other].clone().expect("bspline surface knots");
                        let (ku, kvv) = if axis == 0 {
                            (kv_axis, kv_other)
                        } else {
                            (kv_other, kv_axis)
                        };
                        Surface::bspline(points, ku, kvv)
                    }
                    BasisKind::Power => {
                        Err(GeomError::Unsupported("power-basis surface".into()))
                    }
                }
            })
            .collect()
    }
}

fn finish_rational(ptype: PointType, raw: Vec<f64>) -> Vec<f64> {
    if ptype.is_rational() {
        let w = raw[0];
        raw[1..].iter().map(|v| v / w).collect()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bilinear scalar patch z = u + 2v over the unit square.
    fn bilinear() -> Surface {
        let pts = CtlPoints::from_channels(
            PointType::new(1, false),
            vec![vec![0.0, 1.0, 2.0, 3.0]],
        )
        .unwrap();
        Surface::bezier([2, 2], pts).unwrap()
    }

    fn biquadratic_bspline() -> Surface {
        let ku = KnotVector::uniform_open(3, 4, 0.0, 1.0).unwrap();
        let kv = KnotVector::uniform_open(3, 4, 0.0, 1.0).unwrap();
        let vals: Vec<f64> = (0..16).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let pts =
            CtlPoints::from_channels(PointType::new(1, false), vec![vals]).unwrap();
        Surface::bspline(pts, ku, kv).unwrap()
    }

    #[test]
    fn bilinear_patch_evaluates_exactly() {
        let s = bilinear();
        for &(u, v) in &[(0.0, 0.0), (1.0, 0.0), (0.5, 0.5), (0.25, 0.75)] {
            let z = s.eval(u, v).unwrap()[0];
            assert!((z - (u + 2.0 * v)).abs() < 1e-14, "wrong at ({}, {})", u, v);
        }
    }

    #[test]
    fn cached_evaluation_matches_direct() {
        let s = biquadratic_bspline();
        let cache = s.iso_cache(1, 0.3).unwrap();
        for i in 0..=10 {
            let u = i as f64 / 10.0;
            let direct = s.eval(u, 0.3).unwrap()[0];
            let cached = s.eval_with_cache(&cache, u).unwrap()[0];
            assert!((direct - cached).abs() < 1e-14, "cache diverges at u={}", u);
        }
    }

    #[test]
    fn iso_curve_traces_the_surface() {
        let s = biquadratic_bspline();
        let c = s.iso_curve(0, 0.4).unwrap();
        for i in 0..=10 {
            let v = i as f64 / 10.0;
            assert!(
                (c.eval(v).unwrap()[0] - s.eval(0.4, v).unwrap()[0]).abs() < 1e-12,
                "iso curve diverges at v={}",
                v
            );
        }
    }

    #[test]
    fn axis_subdivision_reproduces_the_surface() {
        let s = biquadratic_bspline();
        let (l, r) = s.subdivide(0, 0.5).unwrap();
        for i in 0..=8 {
            for j in 0..=8 {
                let (u, v) = (i as f64 / 8.0, j as f64 / 8.0);
                let expect = s.eval(u, v).unwrap()[0];
                let got = if u <= 0.5 {
                    l.eval(u, v).unwrap()[0]
                } else {
                    r.eval(u, v).unwrap()[0]
                };
                assert!((expect - got).abs() < 1e-12, "split diverges at ({}, {})", u, v);
            }
        }
    }

    #[test]
    fn axis_refinement_preserves_the_surface() {
        let s = biquadratic_bspline();
        let kv = s.knots(1).unwrap();
        let new = spline_basis::knot_merge(kv.knots(), &[0.25, 0.8]);
        let refined = s.refine(1, &new).unwrap();
        assert_eq!(refined.lengths(), [4, 6]);
        for i in 0..=6 {
            for j in 0..=6 {
                let (u, v) = (i as f64 / 6.0, j as f64 / 6.0);
                assert!(
                    (refined.eval(u, v).unwrap()[0] - s.eval(u, v).unwrap()[0]).abs() < 1e-12,
                    "refinement diverges at ({}, {})",
                    u,
                    v
                );
            }
        }
    }

    #[test]
    fn invalid_axis_is_rejected() {
        let s = bilinear();
        assert!(matches!(
            s.iso_cache(2, 0.5),
            Err(GeomError::InvalidAxis { axis: 2, dim: 2 })
        ));
    }
}
