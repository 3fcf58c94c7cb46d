use spline_basis::{knot_merge, AlphaMatrix, KnotError, KnotVector};
use spline_geom::CtlPoints;
use tracing::instrument;

use crate::error::MvarError;
use crate::multivar::Multivar;

impl Multivar {
    /// Insert the given parameters as new knots on one axis, sorted and
    /// merged with the existing vector. The function is unchanged; repeated
    /// values raise multiplicity. A periodic axis is floated to its open
    /// form first, so the result is always non-periodic on `axis`.
    #[instrument(skip(self, params), fields(count = params.len()))]
    pub fn refine_at_params(&self, axis: usize, params: &[f64]) -> Result<Multivar, MvarError> {
        self.check_axis(axis)?;
        if self.periodic[axis] {
            return self.float_axis(axis)?.refine_at_params(axis, params);
        }
        let kv = self.kv_for(axis)?;
        let (min, max) = kv.domain();
        for &t in params {
            if t < min || t > max {
                return Err(MvarError::Knot(KnotError::OutOfDomain { t, min, max }));
            }
        }
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("refinement knots are finite"));
        let merged = knot_merge(kv.knots(), &sorted);
        self.insert_knot_vector(axis, &merged)
    }

    /// Re-express the function over a refined knot vector on one axis.
    ///
    /// `new_knots` must be a multiset superset of the axis's current knots.
    /// Near-duplicate values in the result are snapped together so later
    /// span searches see clean breakpoints. A periodic axis is floated to
    /// its open form first.
    pub fn insert_knot_vector(&self, axis: usize, new_knots: &[f64]) -> Result<Multivar, MvarError> {
        self.check_axis(axis)?;
        if self.periodic[axis] {
            return self.float_axis(axis)?.insert_knot_vector(axis, new_knots);
        }
        let kv = self.kv_for(axis)?;
        let order = self.orders[axis];
        let mut new_kv = KnotVector::new(order, new_knots.to_vec())?;
        new_kv.make_robust();
        let alpha = AlphaMatrix::build(order, kv, new_kv.knots())?;

        let mut lengths = self.lengths.clone();
        lengths[axis] = alpha.new_len();
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

        // Sweep every line along `axis`, tracking the base offset in both
        // the old and the new mesh (their strides differ past `axis`).
        let others: Vec<usize> = (0..self.dim()).filter(|&a| a != axis).collect();
        let mut idx = vec![0usize; others.len()];
        loop {
            let mut src_base = 0;
            let mut dst_base = 0;
            for (p, &a) in others.iter().enumerate() {
                src_base += idx[p] * old_strides[a];
                dst_base += idx[p] * new_strides[a];
            }
            for c in 0..ptype.channels() {
                let src = self.points.raw_channel(c).to_vec();
                alpha.apply(
                    &src,
                    src_base,
                    old_strides[axis],
                    out.raw_channel_mut(c),
                    dst_base,
                    new_strides[axis],
                );
            }
            let mut p = 0;
            loop {
                if p == others.len() {
                    let mut knots = self.knots.clone();
                    knots[axis] = Some(new_kv);
                    return Ok(Multivar {
                        lengths,
                        knots,
                        points: out,
                        ..self.clone()
                    });
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

    /// Swap one axis's knot vector for another supporting the same mesh.
    ///
    /// This reparameterizes the axis without touching the control points;
    /// the auxiliary domain is left alone.
    pub fn replace_knot_vector(&self, axis: usize, kv: KnotVector) -> Result<Multivar, MvarError> {
        self.kv_for(axis)?;
        if self.periodic[axis] {
            return Err(MvarError::Unsupported(
                "replacing the knot vector of a periodic axis".into(),
            ));
        }
        if kv.order() != self.orders[axis] || kv.num_ctl() != self.lengths[axis] {
            return Err(MvarError::KnotCountMismatch {
                axis,
                expected: self.lengths[axis],
                found: kv.num_ctl(),
            });
        }
        let mut knots = self.knots.clone();
        knots[axis] = Some(kv);
        Ok(Multivar {
            knots,
            ..self.clone()
        })
    }
}
