use serde::{Deserialize, Serialize};
use spline_basis::{basis_funcs, bernstein_basis, KnotError, KnotVector, KNOT_EPS};
use spline_geom::{BasisKind, CtlPoints, Curve, PointType, Surface};

use crate::error::MvarError;

/// A multivariate tensor-product function: `dim` parameters mapped through a
/// separable basis to points of `point_type`.
///
/// The control mesh is flattened axis-0-fastest: the flat index of mesh
/// coordinate `(i_0, .., i_{d-1})` is `sum_a i_a * stride_a` with
/// `stride_0 = 1` and `stride_a = prod(lengths[..a])`. All axes share the
/// basis kind; B-spline axes carry their own knot vectors.
///
/// `aux_domains` remembers, per axis, the parameter interval of the original
/// problem this function was carved out of. Subdivision splits it alongside
/// the real domain, so solutions found deep in a subdivision tree can be
/// reported in the caller's coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multivar {
    pub(crate) basis: BasisKind,
    pub(crate) orders: Vec<usize>,
    pub(crate) lengths: Vec<usize>,
    pub(crate) knots: Vec<Option<KnotVector>>,
    pub(crate) periodic: Vec<bool>,
    pub(crate) points: CtlPoints,
    pub(crate) aux_domains: Vec<(f64, f64)>,
}

impl Multivar {
    /// Multivariate Bezier function; the mesh length per axis equals the
    /// order.
    pub fn bezier(orders: &[usize], points: CtlPoints) -> Result<Self, MvarError> {
        if orders.is_empty() || orders.iter().any(|&o| o < 1) {
            return Err(MvarError::Unsupported(
                "a multivariate needs at least one axis of positive order".into(),
            ));
        }
        let expected: usize = orders.iter().product();
        if points.len() != expected {
            return Err(MvarError::MeshSizeMismatch {
                expected,
                found: points.len(),
            });
        }
        Ok(Self {
            basis: BasisKind::Bezier,
            orders: orders.to_vec(),
            lengths: orders.to_vec(),
            knots: vec![None; orders.len()],
            periodic: vec![false; orders.len()],
            points,
            aux_domains: vec![(0.0, 1.0); orders.len()],
        })
    }

    /// Multivariate B-spline over one knot vector per axis.
    pub fn bspline(knots: Vec<KnotVector>, points: CtlPoints) -> Result<Self, MvarError> {
        let periodic = vec![false; knots.len()];
        Self::bspline_periodic(knots, periodic, points)
    }

    /// Multivariate B-spline with selected periodic axes.
    ///
    /// A periodic axis stores only its distinct control points; the last
    /// `order - 1` points of its float-end knot vector wrap around to the
    /// start. [`Multivar::float_periodic`] materializes the wrap.
    pub fn bspline_periodic(
        knots: Vec<KnotVector>,
        periodic: Vec<bool>,
        points: CtlPoints,
    ) -> Result<Self, MvarError> {
        if knots.is_empty() {
            return Err(MvarError::Unsupported(
                "a multivariate needs at least one axis".into(),
            ));
        }
        if periodic.len() != knots.len() {
            return Err(MvarError::DimMismatch {
                expected: knots.len(),
                found: periodic.len(),
            });
        }
        let mut orders = Vec::with_capacity(knots.len());
        let mut lengths = Vec::with_capacity(knots.len());
        let mut aux = Vec::with_capacity(knots.len());
        for (kv, &per) in knots.iter().zip(&periodic) {
            orders.push(kv.order());
            let n = if per {
                kv.num_ctl().saturating_sub(kv.order() - 1)
            } else {
                kv.num_ctl()
            };
            lengths.push(n);
            aux.push(kv.domain());
        }
        let expected: usize = lengths.iter().product();
        if points.len() != expected {
            return Err(MvarError::MeshSizeMismatch {
                expected,
                found: points.len(),
            });
        }
        Ok(Self {
            basis: BasisKind::Bspline,
            orders,
            lengths,
            knots: knots.into_iter().map(Some).collect(),
            periodic,
            points,
            aux_domains: aux,
        })
    }

    /// View a curve as a one-variate function.
    pub fn from_curve(c: &Curve) -> Result<Self, MvarError> {
        match c.basis() {
            BasisKind::Bezier => Self::bezier(&[c.order()], c.points().clone()),
            BasisKind::Bspline => Self::bspline(
                vec![c.knots().expect("bspline curve carries knots").clone()],
                c.points().clone(),
            ),
            BasisKind::Power => Err(MvarError::Unsupported(
                "power-basis multivariates; convert the curve to b-spline first".into(),
            )),
        }
    }

    /// View a tensor-product surface as a two-variate function.
    pub fn from_surface(s: &Surface) -> Result<Self, MvarError> {
        match s.basis() {
            BasisKind::Bezier => Self::bezier(&s.orders(), s.points().clone()),
            BasisKind::Bspline => Self::bspline(
                vec![
                    s.knots(0).expect("bspline surface knots").clone(),
                    s.knots(1).expect("bspline surface knots").clone(),
                ],
                s.points().clone(),
            ),
            BasisKind::Power => Err(MvarError::Unsupported(
                "power-basis multivariates".into(),
            )),
        }
    }

    /// Embed into a higher-dimensional parameter space.
    ///
    /// The existing axes become axes `start_axis .. start_axis + dim` of a
    /// `new_dim`-variate function that is constant along every added axis.
    pub fn promote(&self, new_dim: usize, start_axis: usize) -> Result<Self, MvarError> {
        let dim = self.dim();
        if start_axis + dim > new_dim {
            return Err(MvarError::InvalidAxis {
                axis: start_axis,
                dim: new_dim,
            });
        }
        let mut orders = Vec::with_capacity(new_dim);
        let mut lengths = Vec::with_capacity(new_dim);
        let mut knots = Vec::with_capacity(new_dim);
        let mut periodic = Vec::with_capacity(new_dim);
        let mut aux = Vec::with_capacity(new_dim);
        for a in 0..new_dim {
            if a >= start_axis && a < start_axis + dim {
                let s = a - start_axis;
                orders.push(self.orders[s]);
                lengths.push(self.lengths[s]);
                knots.push(self.knots[s].clone());
                periodic.push(self.periodic[s]);
                aux.push(self.aux_domains[s]);
            } else {
                orders.push(1);
                lengths.push(1);
                knots.push(match self.basis {
                    BasisKind::Bspline => Some(KnotVector::new(1, vec![0.0, 1.0])?),
                    _ => None,
                });
                periodic.push(false);
                aux.push((0.0, 1.0));
            }
        }
        // Length-1 axes contribute nothing to the flat layout, so the mesh
        // data is reused as-is wherever the new axes land.
        Ok(Self {
            basis: self.basis,
            orders,
            lengths,
            knots,
            periodic,
            points: self.points.clone(),
            aux_domains: aux,
        })
    }

    pub fn dim(&self) -> usize {
        self.lengths.len()
    }

    pub fn basis(&self) -> BasisKind {
        self.basis
    }

    pub fn orders(&self) -> &[usize] {
        &self.orders
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn points(&self) -> &CtlPoints {
        &self.points
    }

    pub fn point_type(&self) -> PointType {
        self.points.point_type()
    }

    pub fn is_rational(&self) -> bool {
        self.points.point_type().is_rational()
    }

    /// True for a single-coordinate, non-rational function.
    pub fn is_scalar(&self) -> bool {
        let pt = self.points.point_type();
        pt.coords() == 1 && !pt.is_rational()
    }

    pub fn knot_vector(&self, axis: usize) -> Option<&KnotVector> {
        self.knots.get(axis).and_then(|k| k.as_ref())
    }

    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic.get(axis).copied().unwrap_or(false)
    }

    pub(crate) fn check_axis(&self, axis: usize) -> Result<(), MvarError> {
        if axis >= self.dim() {
            return Err(MvarError::InvalidAxis {
                axis,
                dim: self.dim(),
            });
        }
        Ok(())
    }

    pub(crate) fn kv_for(&self, axis: usize) -> Result<&KnotVector, MvarError> {
        self.check_axis(axis)?;
        self.knots[axis].as_ref().ok_or(MvarError::WrongBasis {
            expected: BasisKind::Bspline,
            found: self.basis,
        })
    }

    /// Parameter domain of one axis.
    pub fn domain(&self, axis: usize) -> Result<(f64, f64), MvarError> {
        self.check_axis(axis)?;
        Ok(match &self.knots[axis] {
            Some(kv) => kv.domain(),
            None => (0.0, 1.0),
        })
    }

    /// Original-problem interval this axis covers (split by subdivision).
    pub fn aux_domain(&self, axis: usize) -> Result<(f64, f64), MvarError> {
        self.check_axis(axis)?;
        Ok(self.aux_domains[axis])
    }

    /// Per-axis strides of the flat control mesh.
    pub fn strides(&self) -> Vec<usize> {
        let mut s = Vec::with_capacity(self.lengths.len());
        let mut acc = 1;
        for &l in &self.lengths {
            s.push(acc);
            acc *= l;
        }
        s
    }

    fn axis_basis(&self, axis: usize, t: f64) -> Result<(usize, Vec<f64>), MvarError> {
        match &self.knots[axis] {
            Some(kv) => Ok(basis_funcs(kv, t)?),
            None => {
                if t < -KNOT_EPS || t > 1.0 + KNOT_EPS {
                    return Err(MvarError::Knot(KnotError::OutOfDomain {
                        t,
                        min: 0.0,
                        max: 1.0,
                    }));
                }
                Ok((0, bernstein_basis(self.orders[axis], t.clamp(0.0, 1.0))))
            }
        }
    }

    /// Evaluate every raw channel at a parameter tuple.
    pub fn eval_channels(&self, params: &[f64]) -> Result<Vec<f64>, MvarError> {
        let dim = self.dim();
        if params.len() != dim {
            return Err(MvarError::DimMismatch {
                expected: dim,
                found: params.len(),
            });
        }
        let mut firsts = Vec::with_capacity(dim);
        let mut blends = Vec::with_capacity(dim);
        for (axis, &t) in params.iter().enumerate() {
            let (f, v) = self.axis_basis(axis, t)?;
            firsts.push(f);
            blends.push(v);
        }
        let strides = self.strides();
        let channels = self.points.point_type().channels();
        let mut out = vec![0.0; channels];

        // Odometer over the local basis support.
        let mut local = vec![0usize; dim];
        loop {
            let mut weight = 1.0;
            let mut flat = 0;
            for a in 0..dim {
                weight *= blends[a][local[a]];
                let mut idx = firsts[a] + local[a];
                if self.periodic[a] {
                    idx %= self.lengths[a];
                }
                flat += idx * strides[a];
            }
            for (c, o) in out.iter_mut().enumerate() {
                *o += weight * self.points.raw_channel(c)[flat];
            }
            let mut a = 0;
            loop {
                if a == dim {
                    return Ok(out);
                }
                local[a] += 1;
                if local[a] < blends[a].len() {
                    break;
                }
                local[a] = 0;
                a += 1;
            }
        }
    }

    /// Evaluate at a parameter tuple, returning euclidean coordinates.
    pub fn eval(&self, params: &[f64]) -> Result<Vec<f64>, MvarError> {
        let raw = self.eval_channels(params)?;
        Ok(if self.is_rational() {
            let w = raw[0];
            raw[1..].iter().map(|v| v / w).collect()
        } else {
            raw
        })
    }

    /// Fix `axis` at parameter `t`, producing a function of one variable
    /// fewer.
    pub fn slice_axis(&self, axis: usize, t: f64) -> Result<Multivar, MvarError> {
        self.check_axis(axis)?;
        if self.dim() < 2 {
            return Err(MvarError::Unsupported(
                "slicing the only axis of a one-variate".into(),
            ));
        }
        let (first, vals) = self.axis_basis(axis, t)?;
        let strides = self.strides();
        let ptype = self.points.point_type();
        let channels = ptype.channels();

        let mut out_lengths: Vec<usize> = self.lengths.clone();
        out_lengths.remove(axis);
        let out_total: usize = out_lengths.iter().product();
        let mut out_pts = CtlPoints::zeros(ptype, out_total);

        let other_axes: Vec<usize> = (0..self.dim()).filter(|&a| a != axis).collect();
        let mut idx = vec![0usize; other_axes.len()];
        let mut flat_out = 0;
        loop {
            let mut base = 0;
            for (p, &a) in other_axes.iter().enumerate() {
                base += idx[p] * strides[a];
            }
            for c in 0..channels {
                let ch = self.points.raw_channel(c);
                let mut acc = 0.0;
                for (q, &v) in vals.iter().enumerate() {
                    let mut i = first + q;
                    if self.periodic[axis] {
                        i %= self.lengths[axis];
                    }
                    acc += v * ch[base + i * strides[axis]];
                }
                out_pts.raw_channel_mut(c)[flat_out] = acc;
            }
            flat_out += 1;
            let mut p = 0;
            loop {
                if p == other_axes.len() {
                    let mut orders = self.orders.clone();
                    let mut knots = self.knots.clone();
                    let mut periodic = self.periodic.clone();
                    let mut aux = self.aux_domains.clone();
                    orders.remove(axis);
                    knots.remove(axis);
                    periodic.remove(axis);
                    aux.remove(axis);
                    return Ok(Multivar {
                        basis: self.basis,
                        orders,
                        lengths: out_lengths,
                        knots,
                        periodic,
                        points: out_pts,
                        aux_domains: aux,
                    });
                }
                idx[p] += 1;
                if idx[p] < self.lengths[other_axes[p]] {
                    break;
                }
                idx[p] = 0;
                p += 1;
            }
        }
    }

    /// Extract spatial coordinate `c` as a scalar function over the same
    /// basis (for rational functions this is the homogeneous numerator).
    pub fn extract_coord(&self, c: usize) -> Result<Multivar, MvarError> {
        let pt = self.points.point_type();
        if c >= pt.coords() {
            return Err(MvarError::PointTypeMismatch(format!(
                "coordinate {} of a {}-coordinate point",
                c,
                pt.coords()
            )));
        }
        let ch = self.points.coord_channel(c).to_vec();
        let points = CtlPoints::from_channels(PointType::new(1, false), vec![ch])?;
        Ok(Multivar {
            points,
            ..self.clone()
        })
    }

    /// Re-express the control points in a wider point type.
    pub fn coerce_point_type(&self, to: PointType) -> Result<Multivar, MvarError> {
        Ok(Multivar {
            points: self.points.coerce(to)?,
            ..self.clone()
        })
    }

    /// Convert to an equivalent B-spline representation; Bezier axes get the
    /// Bezier knot vector over [0, 1].
    pub fn to_bspline(&self) -> Result<Multivar, MvarError> {
        match self.basis {
            BasisKind::Bspline => Ok(self.clone()),
            BasisKind::Bezier => {
                let knots = self
                    .orders
                    .iter()
                    .map(|&o| Ok(Some(KnotVector::bezier(o)?)))
                    .collect::<Result<Vec<_>, MvarError>>()?;
                Ok(Multivar {
                    basis: BasisKind::Bspline,
                    knots,
                    ..self.clone()
                })
            }
            BasisKind::Power => Err(MvarError::Unsupported(
                "power-basis multivariates".into(),
            )),
        }
    }

    /// Materialize the wrapped control points of every periodic axis,
    /// yielding an equivalent non-periodic (floating end) representation.
    pub fn float_periodic(&self) -> Result<Multivar, MvarError> {
        let mut cur = self.clone();
        while let Some(axis) = cur.periodic.iter().position(|&p| p) {
            cur = cur.float_axis(axis)?;
        }
        Ok(cur)
    }

    pub(crate) fn float_axis(&self, axis: usize) -> Result<Multivar, MvarError> {
        let kv = self.kv_for(axis)?.clone();
        let old_len = self.lengths[axis];
        let new_len = old_len + self.orders[axis] - 1;
        debug_assert_eq!(new_len, kv.num_ctl());

        let mut lengths = self.lengths.clone();
        lengths[axis] = new_len;
        let total: usize = lengths.iter().product();
        let ptype = self.points.point_type();
        let mut out = CtlPoints::zeros(ptype, total);

        let old_strides = self.strides();
        let mut new_strides = Vec::with_capacity(lengths.len());
        let mut acc = 1;
        for &l in &lengths {
            new_strides.push(acc);
            acc *= l;
        }

        let mut idx = vec![0usize; lengths.len()];
        for flat in 0..total {
            let mut src = 0;
            for a in 0..lengths.len() {
                let i = if a == axis { idx[a] % old_len } else { idx[a] };
                src += i * old_strides[a];
            }
            for c in 0..ptype.channels() {
                out.raw_channel_mut(c)[flat] = self.points.raw_channel(c)[src];
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

        let mut periodic = self.periodic.clone();
        periodic[axis] = false;
        Ok(Multivar {
            lengths,
            periodic,
            points: out,
            ..self.clone()
        })
    }
}

/// Visit the flat base index of every line along `axis`: all mesh positions
/// with the axis coordinate zero.
pub(crate) fn for_each_ortho(
    lengths: &[usize],
    strides: &[usize],
    axis: usize,
    mut f: impl FnMut(usize),
) {
    let others: Vec<usize> = (0..lengths.len()).filter(|&a| a != axis).collect();
    let mut idx = vec![0usize; others.len()];
    loop {
        let mut base = 0;
        for (p, &a) in others.iter().enumerate() {
            base += idx[p] * strides[a];
        }
        f(base);
        let mut p = 0;
        loop {
            if p == others.len() {
                return;
            }
            idx[p] += 1;
            if idx[p] < lengths[others[p]] {
                break;
            }
            idx[p] = 0;
            p += 1;
        }
    }
}
