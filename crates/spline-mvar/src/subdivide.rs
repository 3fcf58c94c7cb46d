use spline_basis::{knot_merge, KnotError, KnotVector, KNOT_EPS};
use spline_geom::{BasisKind, CtlPoints};
use tracing::instrument;

use crate::error::MvarError;
use crate::multivar::{for_each_ortho, Multivar};

/// Relative distance from a domain endpoint inside which a subdivision
/// parameter is nudged inward instead of producing a sliver half.
const BOUNDARY_NUDGE: f64 = 1e-10;

impl Multivar {
    /// Split the function along one axis at parameter `t`.
    ///
    /// Both halves reproduce the original exactly over their sub-domains and
    /// the auxiliary domain of the axis is split at the matching fraction.
    /// Parameters at (or extremely close to) a domain endpoint are nudged
    /// inward by a relative epsilon. A periodic axis is floated to its open
    /// form first, so both halves are non-periodic on `axis`.
    #[instrument(skip(self))]
    pub fn subdivide(&self, axis: usize, t: f64) -> Result<(Multivar, Multivar), MvarError> {
        self.check_axis(axis)?;
        if self.periodic[axis] {
            return self.float_axis(axis)?.subdivide(axis, t);
        }
        let (min, max) = self.domain(axis)?;
        if t < min - KNOT_EPS || t > max + KNOT_EPS {
            return Err(MvarError::Knot(KnotError::OutOfDomain { t, min, max }));
        }
        // The floor keeps the nudged value outside the span-search tolerance.
        let nudge = (BOUNDARY_NUDGE * (max - min)).max(2.0 * KNOT_EPS);
        let t = t.clamp(min + nudge, max - nudge);

        match self.basis {
            BasisKind::Bezier => self.subdivide_bezier_axis(axis, t, None),
            BasisKind::Bspline => {
                let kv = self.kv_for(axis)?;
                if kv.has_bezier_form() {
                    // A single-segment axis subdivides by de Casteljau on the
                    // local coordinate; cheaper than the insertion matrix.
                    let s = (t - min) / (max - min);
                    self.subdivide_bezier_axis(axis, s, Some((min, t, max)))
                } else {
                    self.subdivide_bspline_axis(axis, t)
                }
            }
            BasisKind::Power => Err(MvarError::Unsupported(
                "power-basis multivariates".into(),
            )),
        }
    }

    /// De Casteljau split at local parameter `s` in [0, 1]. When
    /// `remap` is present the axis is a Bezier-form B-spline over
    /// `(min, t, max)` and the halves keep remapped knot vectors.
    fn subdivide_bezier_axis(
        &self,
        axis: usize,
        s: f64,
        remap: Option<(f64, f64, f64)>,
    ) -> Result<(Multivar, Multivar), MvarError> {
        let k = self.orders[axis];
        let strides = self.strides();
        let ptype = self.points.point_type();
        let mut left = CtlPoints::zeros(ptype, self.points.len());
        let mut right = CtlPoints::zeros(ptype, self.points.len());

        let step = strides[axis];
        for c in 0..ptype.channels() {
            let src = self.points.raw_channel(c).to_vec();
            let mut beta = vec![0.0; k];
            let mut lvals = vec![0.0; k];
            let mut rvals = vec![0.0; k];
            let mut bases: Vec<usize> = Vec::new();
            for_each_ortho(&self.lengths, &strides, axis, |base| bases.push(base));
            for &base in &bases {
                for (q, b) in beta.iter_mut().enumerate() {
                    *b = src[base + q * step];
                }
                lvals[0] = beta[0];
                rvals[k - 1] = beta[k - 1];
                for r in 1..k {
                    for i in 0..k - r {
                        beta[i] = (1.0 - s) * beta[i] + s * beta[i + 1];
                    }
                    lvals[r] = beta[0];
                    rvals[k - 1 - r] = beta[k - 1 - r];
                }
                let lch = left.raw_channel_mut(c);
                for (q, &v) in lvals.iter().enumerate() {
                    lch[base + q * step] = v;
                }
                let rch = right.raw_channel_mut(c);
                for (q, &v) in rvals.iter().enumerate() {
                    rch[base + q * step] = v;
                }
            }
        }

        let (aux_a, aux_b) = self.aux_domains[axis];
        let cut = aux_a + s * (aux_b - aux_a);
        let mut left_mv = Multivar {
            points: left,
            ..self.clone()
        };
        let mut right_mv = Multivar {
            points: right,
            ..self.clone()
        };
        left_mv.aux_domains[axis] = (aux_a, cut);
        right_mv.aux_domains[axis] = (cut, aux_b);
        if let Some((min, t, max)) = remap {
            left_mv.knots[axis] = Some(KnotVector::bezier(k)?.affine_remap(min, t));
            right_mv.knots[axis] = Some(KnotVector::bezier(k)?.affine_remap(t, max));
        }
        Ok((left_mv, right_mv))
    }

    fn subdivide_bspline_axis(
        &self,
        axis: usize,
        t: f64,
    ) -> Result<(Multivar, Multivar), MvarError> {
        let kv = self.kv_for(axis)?;
        let k = self.orders[axis];
        let (min, max) = kv.domain();

        // Raise the multiplicity of t to order - 1 so the halves share one
        // control point lying on the function.
        let mu = kv.multiplicity(t);
        let refined = if mu < k - 1 {
            let inserts = vec![t; k - 1 - mu];
            self.insert_knot_vector(axis, &knot_merge(kv.knots(), &inserts))?
        } else {
            self.clone()
        };
        let rkv = refined.kv_for(axis)?.clone();
        let rknots = rkv.knots();
        let e = rkv.last_index_le(t);
        let axis_len = refined.lengths[axis];

        let (left_kv, right_kv, left_hi, right_lo) = if mu >= k {
            // Already discontinuous at t: the halves partition the mesh.
            let cut = e + 1 - k;
            (
                KnotVector::new(k, rknots[..=e].to_vec())?,
                KnotVector::new(k, rknots[cut..].to_vec())?,
                cut,
                cut,
            )
        } else {
            let s = e + 1 - k;
            let mut lk = rknots[..=e].to_vec();
            lk.push(t);
            let mut rk = vec![t];
            rk.extend_from_slice(&rknots[e + 2 - k..]);
            (
                KnotVector::new(k, lk)?,
                KnotVector::new(k, rk)?,
                s + 1,
                s,
            )
        };

        let frac = (t - min) / (max - min);
        let (aux_a, aux_b) = self.aux_domains[axis];
        let cut = aux_a + frac * (aux_b - aux_a);

        let mut left = Multivar {
            points: refined.take_axis_range(axis, 0, left_hi),
            ..refined.clone()
        };
        left.lengths[axis] = left_hi;
        left.knots[axis] = Some(left_kv);
        left.aux_domains[axis] = (aux_a, cut);

        let mut right = Multivar {
            points: refined.take_axis_range(axis, right_lo, axis_len),
            ..refined.clone()
        };
        right.lengths[axis] = axis_len - right_lo;
        right.knots[axis] = Some(right_kv);
        right.aux_domains[axis] = (cut, aux_b);

        Ok((left, right))
    }

    /// Copy the sub-mesh with axis coordinate in `lo..hi`.
    fn take_axis_range(&self, axis: usize, lo: usize, hi: usize) -> CtlPoints {
        let mut lengths = self.lengths.clone();
        lengths[axis] = hi - lo;
        let total: usize = lengths.iter().product();
        let ptype = self.points.point_type();
        let mut out = CtlPoints::zeros(ptype, total);

        let old_strides = self.strides();
        let mut idx = vec![0usize; lengths.len()];
        for flat in 0..total {
            let mut src = 0;
            for a in 0..lengths.len() {
                let i = if a == axis { idx[a] + lo } else { idx[a] };
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
        out
    }
}
