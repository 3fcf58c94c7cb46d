use spline_basis::{bernstein_product_coef, bernstein_raise, KnotVector, KNOT_EPS};
use spline_geom::{BasisKind, CtlPoints, PointType};

use crate::error::MvarError;
use crate::multivar::{for_each_ortho, Multivar};

impl Multivar {
    /// Tensor-product Bernstein multiplication.
    ///
    /// Both operands must be in Bezier form; point types may differ and are
    /// reconciled in homogeneous terms. When either operand is rational both
    /// are widened to rational and the weight channels multiply, so the
    /// euclidean result is the pointwise product. Coordinate channels
    /// multiply pairwise; a single-coordinate operand broadcasts over the
    /// other's coordinates. The result has order `o_a + o_b - 1` on every
    /// axis.
    pub fn multiply(&self, other: &Multivar) -> Result<Multivar, MvarError> {
        let dim = self.dim();
        if other.dim() != dim {
            return Err(MvarError::DimMismatch {
                expected: dim,
                found: other.dim(),
            });
        }
        for mv in [self, other] {
            if mv.basis != BasisKind::Bezier {
                return Err(MvarError::WrongBasis {
                    expected: BasisKind::Bezier,
                    found: mv.basis,
                });
            }
        }
        let (ca, cb) = (self.point_type().coords(), other.point_type().coords());
        if ca != cb && ca != 1 && cb != 1 {
            return Err(MvarError::PointTypeMismatch(format!(
                "cannot pair {} and {} coordinates",
                ca, cb
            )));
        }
        let rational = self.is_rational() || other.is_rational();
        let a = self.coerce_point_type(PointType::new(ca, rational))?;
        let b = other.coerce_point_type(PointType::new(cb, rational))?;

        let out_orders: Vec<usize> = (0..dim)
            .map(|x| a.orders[x] + b.orders[x] - 1)
            .collect();
        let total: usize = out_orders.iter().product();
        let out_ptype = PointType::new(ca.max(cb), rational);
        let mut out = CtlPoints::zeros(out_ptype, total);

        // An output channel and the operand channel it draws from; a
        // single-coordinate operand repeats its one coordinate channel.
        let chan = |coords: usize, oc: usize| -> usize {
            if rational {
                if oc == 0 || coords != 1 {
                    oc
                } else {
                    1
                }
            } else if coords == 1 {
                0
            } else {
                oc
            }
        };

        // Per-axis blending coefficients, indexed [axis][i][j].
        let coefs: Vec<Vec<Vec<f64>>> = (0..dim)
            .map(|x| {
                let da = a.orders[x] - 1;
                let db = b.orders[x] - 1;
                (0..=da)
                    .map(|i| {
                        (0..=db)
                            .map(|j| bernstein_product_coef(da, i, db, j))
                            .collect()
                    })
                    .collect()
            })
            .collect();

        let mut out_strides = Vec::with_capacity(dim);
        let mut acc = 1;
        for &o in &out_orders {
            out_strides.push(acc);
            acc *= o;
        }

        let mut ia = vec![0usize; dim];
        let mut fa = 0usize;
        loop {
            let mut ib = vec![0usize; dim];
            let mut fb = 0usize;
            loop {
                let mut w = 1.0;
                let mut target = 0usize;
                for x in 0..dim {
                    w *= coefs[x][ia[x]][ib[x]];
                    target += (ia[x] + ib[x]) * out_strides[x];
                }
                for oc in 0..out_ptype.channels() {
                    let av = a.points.raw_channel(chan(ca, oc))[fa];
                    let bv = b.points.raw_channel(chan(cb, oc))[fb];
                    out.raw_channel_mut(oc)[target] += w * av * bv;
                }
                if !advance(&mut ib, &b.lengths) {
                    break;
                }
                fb += 1;
            }
            if !advance(&mut ia, &a.lengths) {
                break;
            }
            fa += 1;
        }

        Multivar::bezier(&out_orders, out)
    }

    /// Pointwise sum; the operands must share basis, orders, knot vectors,
    /// and a non-rational point type (run them through
    /// [`make_compatible`](crate::make_compatible) first).
    pub fn add(&self, other: &Multivar) -> Result<Multivar, MvarError> {
        self.combine(other, |a, b| a + b)
    }

    /// Pointwise difference, under the same compatibility requirements as
    /// [`Multivar::add`].
    pub fn sub(&self, other: &Multivar) -> Result<Multivar, MvarError> {
        self.combine(other, |a, b| a - b)
    }

    fn combine(&self, other: &Multivar, op: impl Fn(f64, f64) -> f64) -> Result<Multivar, MvarError> {
        self.require_same_structure(other)?;
        let ptype = self.point_type();
        let mut out = self.points.clone();
        for c in 0..ptype.channels() {
            let b = other.points.raw_channel(c).to_vec();
            for (o, bv) in out.raw_channel_mut(c).iter_mut().zip(b) {
                *o = op(*o, bv);
            }
        }
        Ok(Multivar {
            points: out,
            ..self.clone()
        })
    }

    fn require_same_structure(&self, other: &Multivar) -> Result<(), MvarError> {
        if self.dim() != other.dim() {
            return Err(MvarError::DimMismatch {
                expected: self.dim(),
                found: other.dim(),
            });
        }
        if self.is_rational() || other.is_rational() {
            return Err(MvarError::Unsupported(
                "pointwise arithmetic on rational functions".into(),
            ));
        }
        if self.point_type() != other.point_type() {
            return Err(MvarError::PointTypeMismatch(format!(
                "{:?} vs {:?}",
                self.point_type(),
                other.point_type()
            )));
        }
        if self.basis != other.basis
            || self.orders != other.orders
            || self.lengths != other.lengths
        {
            return Err(MvarError::Incompatible(
                "operands differ in basis, order, or mesh size".into(),
            ));
        }
        for a in 0..self.dim() {
            match (&self.knots[a], &other.knots[a]) {
                (None, None) => {}
                (Some(p), Some(q))
                    if p.knots()
                        .iter()
                        .zip(q.knots())
                        .all(|(x, y)| (x - y).abs() < KNOT_EPS) => {}
                _ => {
                    return Err(MvarError::Incompatible(format!(
                        "knot vectors differ on axis {}",
                        a
                    )))
                }
            }
        }
        Ok(())
    }

    /// Partial derivative with respect to the parameter of `axis`.
    ///
    /// Rational functions differentiate by the quotient rule and require
    /// Bezier form; the result's weight channel is the squared weight.
    pub fn derivative(&self, axis: usize) -> Result<Multivar, MvarError> {
        self.check_axis(axis)?;
        if self.periodic[axis] {
            return Err(MvarError::Unsupported(
                "differentiating a periodic axis; float it first".into(),
            ));
        }
        if self.is_rational() {
            return self.rational_derivative(axis);
        }
        match self.basis {
            BasisKind::Bezier => Ok(self.bezier_derivative_axis(axis)),
            BasisKind::Bspline => self.bspline_derivative_axis(axis),
            BasisKind::Power => Err(MvarError::Unsupported(
                "power-basis multivariates".into(),
            )),
        }
    }

    fn bezier_derivative_axis(&self, axis: usize) -> Multivar {
        let k = self.orders[axis];
        if k == 1 {
            // Constant along the axis: the derivative is identically zero.
            let mut out = self.clone();
            out.points = CtlPoints::zeros(self.point_type(), self.points.len());
            return out;
        }
        let strides = self.strides();
        let mut lengths = self.lengths.clone();
        lengths[axis] = k - 1;
        let total: usize = lengths.iter().product();
        let ptype = self.point_type();
        let mut out = CtlPoints::zeros(ptype, total);

        let mut new_strides = Vec::with_capacity(lengths.len());
        let mut acc = 1;
        for &l in &lengths {
            new_strides.push(acc);
            acc *= l;
        }

        let scale = (k - 1) as f64;
        self.map_axis_lines(axis, &strides, &new_strides, |src, sb, dst, db| {
            for i in 0..k - 1 {
                dst[db + i * new_strides[axis]] = scale
                    * (src[sb + (i + 1) * strides[axis]] - src[sb + i * strides[axis]]);
            }
        }, &mut out);

        let mut orders = self.orders.clone();
        orders[axis] = k - 1;
        Multivar {
            orders,
            lengths,
            points: out,
            ..self.clone()
        }
    }

    fn bspline_derivative_axis(&self, axis: usize) -> Result<Multivar, MvarError> {
        let kv = self.kv_for(axis)?.clone();
        let k = self.orders[axis];
        if k == 1 {
            return Err(MvarError::Unsupported(
                "derivative of an order-1 spline axis".into(),
            ));
        }
        let knots = kv.knots();
        let n = self.lengths[axis];
        let strides = self.strides();
        let mut lengths = self.lengths.clone();
        lengths[axis] = n - 1;
        let total: usize = lengths.iter().product();
        let ptype = self.point_type();
        let mut out = CtlPoints::zeros(ptype, total);

        let mut new_strides = Vec::with_capacity(lengths.len());
        let mut acc = 1;
        for &l in &lengths {
            new_strides.push(acc);
            acc *= l;
        }

        let scale = (k - 1) as f64;
        let denoms: Vec<f64> = (0..n - 1).map(|i| knots[i + k] - knots[i + 1]).collect();
        self.map_axis_lines(axis, &strides, &new_strides, |src, sb, dst, db| {
            for (i, &d) in denoms.iter().enumerate() {
                if d.abs() >= KNOT_EPS {
                    dst[db + i * new_strides[axis]] = scale
                        * (src[sb + (i + 1) * strides[axis]] - src[sb + i * strides[axis]])
                        / d;
                }
            }
        }, &mut out);

        let dkv = KnotVector::new(k - 1, knots[1..knots.len() - 1].to_vec())?;
        let mut orders = self.orders.clone();
        orders[axis] = k - 1;
        let mut new_knots = self.knots.clone();
        new_knots[axis] = Some(dkv);
        Ok(Multivar {
            orders,
            lengths,
            knots: new_knots,
            points: out,
            ..self.clone()
        })
    }

    fn rational_derivative(&self, axis: usize) -> Result<Multivar, MvarError> {
        if self.basis != BasisKind::Bezier {
            return Err(MvarError::Unsupported(
                "rational derivative outside Bezier form; subdivide first".into(),
            ));
        }
        let coords = self.point_type().coords();
        let w = self.extract_weights()?;
        let dw = w.derivative(axis)?;
        let w2 = w.multiply(&w)?;

        let mut channels: Vec<Vec<f64>> = Vec::with_capacity(coords + 1);
        channels.push(w2.points.raw_channel(0).to_vec());
        for c in 0..coords {
            let x = self.extract_coord(c)?;
            let dx = x.derivative(axis)?;
            // d/dt (x/w) = (x'w - xw') / w^2; the numerator sits one degree
            // below w^2 on the differentiated axis and is raised to match.
            let num = dx.multiply(&w)?.sub(&x.multiply(&dw)?)?;
            let raised = num.degree_raise_axis(axis)?;
            channels.push(raised.points.raw_channel(0).to_vec());
        }

        let points =
            CtlPoints::from_channels(PointType::new(coords, true), channels)?;
        Multivar::bezier(&w2.orders, points)
    }

    /// Raise a Bezier function's order by one along a single axis.
    pub fn degree_raise_axis(&self, axis: usize) -> Result<Multivar, MvarError> {
        self.check_axis(axis)?;
        if self.basis != BasisKind::Bezier {
            return Err(MvarError::WrongBasis {
                expected: BasisKind::Bezier,
                found: self.basis,
            });
        }
        let k = self.orders[axis];
        let strides = self.strides();
        let mut lengths = self.lengths.clone();
        lengths[axis] = k + 1;
        let total: usize = lengths.iter().product();
        let ptype = self.point_type();
        let mut out = CtlPoints::zeros(ptype, total);

        let mut new_strides = Vec::with_capacity(lengths.len());
        let mut acc = 1;
        for &l in &lengths {
            new_strides.push(acc);
            acc *= l;
        }

        self.map_axis_lines(axis, &strides, &new_strides, |src, sb, dst, db| {
            let line: Vec<f64> = (0..k).map(|i| src[sb + i * strides[axis]]).collect();
            for (i, v) in bernstein_raise(&line).into_iter().enumerate() {
                dst[db + i * new_strides[axis]] = v;
            }
        }, &mut out);

        let mut orders = self.orders.clone();
        orders[axis] = k + 1;
        Ok(Multivar {
            orders,
            lengths,
            points: out,
            ..self.clone()
        })
    }

    /// The weight channel as a scalar function (error when non-rational).
    pub fn extract_weights(&self) -> Result<Multivar, MvarError> {
        let w = self
            .points
            .weights()
            .ok_or_else(|| MvarError::PointTypeMismatch("function is not rational".into()))?
            .to_vec();
        let points = CtlPoints::from_channels(PointType::new(1, false), vec![w])?;
        Ok(Multivar {
            points,
            ..self.clone()
        })
    }

    /// Run `op` on every line along `axis`, with source and destination base
    /// offsets tracked under their respective strides.
    fn map_axis_lines(
        &self,
        axis: usize,
        old_strides: &[usize],
        new_strides: &[usize],
        op: impl Fn(&[f64], usize, &mut [f64], usize),
        out: &mut CtlPoints,
    ) {
        let others: Vec<usize> = (0..self.dim()).filter(|&a| a != axis).collect();
        let channels = self.point_type().channels();
        for c in 0..channels {
            let src = self.points.raw_channel(c).to_vec();
            let dst = out.raw_channel_mut(c);
            let mut idx = vec![0usize; others.len()];
            'lines: loop {
                let mut sb = 0;
                let mut db = 0;
                for (p, &a) in others.iter().enumerate() {
                    sb += idx[p] * old_strides[a];
                    db += idx[p] * new_strides[a];
                }
                op(&src, sb, dst, db);
                let mut p = 0;
                loop {
                    if p == others.len() {
                        break 'lines;
                    }
                    idx[p] += 1;
                    if idx[p] < self.lengths[others[p]] {
                        break;
                    }
                    idx[p] = 0;
                    p += 1;
                }
            }
        }
    }
}

/// Odometer step over a mesh shape; returns false when exhausted.
fn advance(idx: &mut [usize], lengths: &[usize]) -> bool {
    for (i, &l) in idx.iter_mut().zip(lengths) {
        *i += 1;
        if *i < l {
            return true;
        }
        *i = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(vals: Vec<f64>) -> CtlPoints {
        CtlPoints::from_channels(PointType::new(1, false), vec![vals]).unwrap()
    }

    #[test]
    fn scalar_product_multiplies_values() {
        // (u + v) * (2u) over [0,1]^2, both as bilinear/linear Beziers.
        let a = Multivar::bezier(&[2, 2], scalar(vec![0.0, 1.0, 1.0, 2.0])).unwrap();
        let b = Multivar::bezier(&[2, 1], scalar(vec![0.0, 2.0])).unwrap();
        let p = a.multiply(&b).unwrap();
        assert_eq!(p.orders(), &[3, 2]);
        for i in 0..=5 {
            for j in 0..=5 {
                let (u, v) = (i as f64 / 5.0, j as f64 / 5.0);
                let expect = (u + v) * 2.0 * u;
                assert!(
                    (p.eval(&[u, v]).unwrap()[0] - expect).abs() < 1e-12,
                    "product wrong at ({}, {})",
                    u,
                    v
                );
            }
        }
    }

    #[test]
    fn scalar_broadcasts_over_vector_channels() {
        let vector = CtlPoints::from_channels(
            PointType::new(2, false),
            vec![vec![1.0, 3.0], vec![-2.0, 4.0]],
        )
        .unwrap();
        let v = Multivar::bezier(&[2], vector).unwrap();
        let s = Multivar::bezier(&[1], scalar(vec![0.5])).unwrap();
        let p = s.multiply(&v).unwrap();
        for i in 0..=4 {
            let t = i as f64 / 4.0;
            let ev = v.eval(&[t]).unwrap();
            let ep = p.eval(&[t]).unwrap();
            assert!((ep[0] - 0.5 * ev[0]).abs() < 1e-13);
            assert!((ep[1] - 0.5 * ev[1]).abs() < 1e-13);
        }
    }

    #[test]
    fn vector_times_vector_multiplies_channelwise() {
        let pa = CtlPoints::from_channels(
            PointType::new(2, false),
            vec![vec![1.0, 3.0], vec![-2.0, 4.0]],
        )
        .unwrap();
        let pb = CtlPoints::from_channels(
            PointType::new(2, false),
            vec![vec![0.5, 2.0], vec![1.0, -1.0]],
        )
        .unwrap();
        let a = Multivar::bezier(&[2], pa).unwrap();
        let b = Multivar::bezier(&[2], pb).unwrap();
        let p = a.multiply(&b).unwrap();
        assert_eq!(p.orders(), &[3]);
        for i in 0..=6 {
            let t = i as f64 / 6.0;
            let (ea, eb) = (a.eval(&[t]).unwrap(), b.eval(&[t]).unwrap());
            let ep = p.eval(&[t]).unwrap();
            assert!((ep[0] - ea[0] * eb[0]).abs() < 1e-13, "x channel at t={}", t);
            assert!((ep[1] - ea[1] * eb[1]).abs() < 1e-13, "y channel at t={}", t);
        }
    }

    #[test]
    fn rational_operand_widens_the_product() {
        // w(t) linear, f(t) = x(t)/w(t); multiplying by a scalar g leaves
        // the weights alone in euclidean terms.
        let rat = CtlPoints::from_channels(
            PointType::new(1, true),
            vec![vec![1.0, 2.0], vec![0.0, 2.0]],
        )
        .unwrap();
        let f = Multivar::bezier(&[2], rat).unwrap();
        let g = Multivar::bezier(&[2], scalar(vec![1.0, 3.0])).unwrap();
        let p = f.multiply(&g).unwrap();
        assert!(p.is_rational());
        assert_eq!(p.orders(), &[3]);
        for i in 0..=8 {
            let t = i as f64 / 8.0;
            let expect = f.eval(&[t]).unwrap()[0] * g.eval(&[t]).unwrap()[0];
            assert!(
                (p.eval(&[t]).unwrap()[0] - expect).abs() < 1e-12,
                "rational product wrong at t={}",
                t
            );
        }
    }

    #[test]
    fn incompatible_coordinate_counts_are_rejected() {
        let two = CtlPoints::from_channels(
            PointType::new(2, false),
            vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap();
        let three = CtlPoints::from_channels(
            PointType::new(3, false),
            vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]],
        )
        .unwrap();
        let a = Multivar::bezier(&[2], two).unwrap();
        let b = Multivar::bezier(&[2], three).unwrap();
        assert!(matches!(
            a.multiply(&b),
            Err(MvarError::PointTypeMismatch(_))
        ));
    }

    #[test]
    fn sum_and_difference_are_pointwise() {
        let a = Multivar::bezier(&[2, 2], scalar(vec![0.0, 1.0, 2.0, 3.0])).unwrap();
        let b = Multivar::bezier(&[2, 2], scalar(vec![1.0, -1.0, 0.5, 2.0])).unwrap();
        let s = a.add(&b).unwrap();
        let d = a.sub(&b).unwrap();
        for i in 0..=4 {
            for j in 0..=4 {
                let p = [i as f64 / 4.0, j as f64 / 4.0];
                let (ea, eb) = (a.eval(&p).unwrap()[0], b.eval(&p).unwrap()[0]);
                assert!((s.eval(&p).unwrap()[0] - (ea + eb)).abs() < 1e-13);
                assert!((d.eval(&p).unwrap()[0] - (ea - eb)).abs() < 1e-13);
            }
        }
    }

    #[test]
    fn mismatched_structure_is_rejected() {
        let a = Multivar::bezier(&[2, 2], scalar(vec![0.0; 4])).unwrap();
        let b = Multivar::bezier(&[3, 2], scalar(vec![0.0; 6])).unwrap();
        assert!(matches!(a.add(&b), Err(MvarError::Incompatible(_))));
    }

    #[test]
    fn bezier_partial_derivative() {
        // f(u, v) = u^2 * v as a [3, 2] Bezier; df/du = 2uv.
        let a = Multivar::bezier(&[3, 2], scalar(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0])).unwrap();
        let du = a.derivative(0).unwrap();
        assert_eq!(du.orders(), &[2, 2]);
        for i in 0..=4 {
            for j in 0..=4 {
                let (u, v) = (i as f64 / 4.0, j as f64 / 4.0);
                assert!(
                    (du.eval(&[u, v]).unwrap()[0] - 2.0 * u * v).abs() < 1e-12,
                    "df/du wrong at ({}, {})",
                    u,
                    v
                );
            }
        }
    }

    #[test]
    fn bspline_partial_derivative_matches_finite_difference() {
        let ku = KnotVector::uniform_open(4, 6, 0.0, 1.0).unwrap();
        let kv = KnotVector::uniform_open(3, 4, 0.0, 1.0).unwrap();
        let vals: Vec<f64> = (0..24).map(|i| ((i * 7) % 11) as f64 / 2.0).collect();
        let mv = Multivar::bspline(vec![ku, kv], scalar(vals)).unwrap();
        let dv = mv.derivative(1).unwrap();
        let h = 1e-6;
        for i in 1..6 {
            for j in 1..6 {
                let (u, v) = (i as f64 / 6.0, j as f64 / 6.0);
                let fd = (mv.eval(&[u, v + h]).unwrap()[0] - mv.eval(&[u, v - h]).unwrap()[0])
                    / (2.0 * h);
                assert!(
                    (dv.eval(&[u, v]).unwrap()[0] - fd).abs() < 1e-4,
                    "df/dv wrong at ({}, {})",
                    u,
                    v
                );
            }
        }
    }

    #[test]
    fn rational_derivative_uses_the_quotient_rule() {
        // Rational 1-variate: f(t) = x(t)/w(t) with w linear.
        let pts = CtlPoints::from_channels(
            PointType::new(1, true),
            vec![vec![1.0, 2.0], vec![0.0, 2.0]],
        )
        .unwrap();
        let mv = Multivar::bezier(&[2], pts).unwrap();
        let d = mv.derivative(0).unwrap();
        assert!(d.is_rational());
        let h = 1e-6;
        for i in 1..10 {
            let t = i as f64 / 10.0;
            let fd =
                (mv.eval(&[t + h]).unwrap()[0] - mv.eval(&[t - h]).unwrap()[0]) / (2.0 * h);
            assert!(
                (d.eval(&[t]).unwrap()[0] - fd).abs() < 1e-5,
                "rational derivative wrong at t={}",
                t
            );
        }
    }

    #[test]
    fn degree_raise_preserves_the_function() {
        let a = Multivar::bezier(&[2, 3], scalar(vec![0.0, 1.0, -1.0, 2.0, 0.5, 1.5])).unwrap();
        let raised = a.degree_raise_axis(1).unwrap();
        assert_eq!(raised.orders(), &[2, 4]);
        for i in 0..=5 {
            for j in 0..=5 {
                let p = [i as f64 / 5.0, j as f64 / 5.0];
                assert!(
                    (raised.eval(&p).unwrap()[0] - a.eval(&p).unwrap()[0]).abs() < 1e-13,
                    "degree raise diverges at {:?}",
                    p
                );
            }
        }
    }
}
