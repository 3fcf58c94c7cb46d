use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::KNOT_EPS;

/// Errors raised by knot-vector construction and queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KnotError {
    #[error("knot vector not non-decreasing at index {index} ({prev} > {next})")]
    NotAscending { index: usize, prev: f64, next: f64 },

    #[error("knot vector has {len} knots but order {order} + {points} points requires {}", order + points)]
    LengthMismatch {
        len: usize,
        order: usize,
        points: usize,
    },

    #[error("order must be at least 1, got {order}")]
    InvalidOrder { order: usize },

    #[error("parameter {t} outside domain [{min}, {max}]")]
    OutOfDomain { t: f64, min: f64, max: f64 },
}

/// A non-decreasing knot sequence together with the basis order it serves.
///
/// Length must be `order + num_ctl` for an open (non-periodic) basis; the
/// domain of a curve over this vector is `[knot[order-1], knot[len-order]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnotVector {
    order: usize,
    knots: Vec<f64>,
}

impl KnotVector {
    /// Build a knot vector, validating order and monotonicity.
    pub fn new(order: usize, knots: Vec<f64>) -> Result<Self, KnotError> {
        if order < 1 {
            return Err(KnotError::InvalidOrder { order });
        }
        if knots.len() < 2 * order {
            return Err(KnotError::LengthMismatch {
                len: knots.len(),
                order,
                points: order.max(knots.len().saturating_sub(order)),
            });
        }
        for i in 1..knots.len() {
            if knots[i] < knots[i - 1] {
                return Err(KnotError::NotAscending {
                    index: i,
                    prev: knots[i - 1],
                    next: knots[i],
                });
            }
        }
        Ok(Self { order, knots })
    }

    /// The Bezier knot vector of a given order: `order` zeros then `order` ones.
    pub fn bezier(order: usize) -> Result<Self, KnotError> {
        if order < 1 {
            return Err(KnotError::InvalidOrder { order });
        }
        let mut knots = vec![0.0; order];
        knots.extend(std::iter::repeat(1.0).take(order));
        Ok(Self { order, knots })
    }

    /// Clamped ("open") uniform knot vector over `[min, max]` for `num_ctl`
    /// control points.
    pub fn uniform_open(
        order: usize,
        num_ctl: usize,
        min: f64,
        max: f64,
    ) -> Result<Self, KnotError> {
        if order < 1 {
            return Err(KnotError::InvalidOrder { order });
        }
        if num_ctl < order {
            return Err(KnotError::LengthMismatch {
                len: num_ctl + order,
                order,
                points: num_ctl,
            });
        }
        let mut knots = vec![min; order];
        let interior = num_ctl - order;
        for i in 1..=interior {
            knots.push(min + (max - min) * i as f64 / (interior + 1) as f64);
        }
        knots.extend(std::iter::repeat(max).take(order));
        Ok(Self { order, knots })
    }

    /// Fully uniform ("floating") knot vector, used when opening up periodic
    /// bases.
    pub fn uniform_float(
        order: usize,
        num_ctl: usize,
        min: f64,
        max: f64,
    ) -> Result<Self, KnotError> {
        if order < 1 {
            return Err(KnotError::InvalidOrder { order });
        }
        if num_ctl < order {
            return Err(KnotError::LengthMismatch {
                len: num_ctl + order,
                order,
                points: num_ctl,
            });
        }
        let n = num_ctl + order;
        let span = (max - min) / (n - 1) as f64;
        let knots = (0..n).map(|i| min + span * i as f64).collect();
        Ok(Self { order, knots })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn len(&self) -> usize {
        self.knots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knots.is_empty()
    }

    /// Number of control points this vector supports (open end conditions).
    pub fn num_ctl(&self) -> usize {
        self.knots.len() - self.order
    }

    /// Valid evaluation domain `[knot[order-1], knot[len-order]]`.
    pub fn domain(&self) -> (f64, f64) {
        (
            self.knots[self.order - 1],
            self.knots[self.knots.len() - self.order],
        )
    }

    /// Largest index `i` with `knot[i] <= t`, or 0 when `t` precedes all knots.
    pub fn last_index_le(&self, t: f64) -> usize {
        self.knots
            .iter()
            .rposition(|&k| k <= t + KNOT_EPS)
            .unwrap_or(0)
    }

    /// First index `i` with `knot[i] > t`, or `len()` when no knot exceeds `t`.
    pub fn first_index_gt(&self, t: f64) -> usize {
        self.knots
            .iter()
            .position(|&k| k > t + KNOT_EPS)
            .unwrap_or(self.knots.len())
    }

    /// Multiplicity of the value `t` in this vector.
    pub fn multiplicity(&self, t: f64) -> usize {
        self.knots.iter().filter(|&&k| (k - t).abs() < KNOT_EPS).count()
    }

    /// True when this vector describes a single Bezier segment: exactly
    /// `2 * order` knots with full end multiplicities.
    pub fn has_bezier_form(&self) -> bool {
        if self.knots.len() != 2 * self.order {
            return false;
        }
        let first = self.knots[0];
        let last = self.knots[self.knots.len() - 1];
        self.knots[..self.order]
            .iter()
            .all(|&k| (k - first).abs() < KNOT_EPS)
            && self.knots[self.order..]
                .iter()
                .all(|&k| (k - last).abs() < KNOT_EPS)
    }

    /// Snap knots that differ by less than [`KNOT_EPS`] onto their
    /// predecessor, removing spurious near-duplicate breakpoints introduced
    /// by floating-point refinement.
    pub fn make_robust(&mut self) {
        for i in 1..self.knots.len() {
            if (self.knots[i] - self.knots[i - 1]).abs() < KNOT_EPS {
                self.knots[i] = self.knots[i - 1];
            }
        }
    }

    /// Affinely remap this vector so its domain becomes `[new_min, new_max]`.
    pub fn affine_remap(&self, new_min: f64, new_max: f64) -> Self {
        let (d0, d1) = self.domain();
        let scale = if (d1 - d0).abs() < KNOT_EPS {
            0.0
        } else {
            (new_max - new_min) / (d1 - d0)
        };
        let knots = self
            .knots
            .iter()
            .map(|&k| new_min + (k - d0) * scale)
            .collect();
        Self {
            order: self.order,
            knots,
        }
    }

    /// Interior knot values where position may jump (multiplicity >= order).
    pub fn c0_discontinuities(&self) -> Vec<f64> {
        self.discontinuities(self.order)
    }

    /// Interior knot values where the first derivative may jump
    /// (multiplicity >= order - 1).
    pub fn c1_discontinuities(&self) -> Vec<f64> {
        if self.order < 2 {
            return Vec::new();
        }
        self.discontinuities(self.order - 1)
    }

    fn discontinuities(&self, min_mult: usize) -> Vec<f64> {
        let (d0, d1) = self.domain();
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.knots.len() {
            let v = self.knots[i];
            let mut mult = 1;
            while i + mult < self.knots.len() && (self.knots[i + mult] - v).abs() < KNOT_EPS {
                mult += 1;
            }
            if v > d0 + KNOT_EPS && v < d1 - KNOT_EPS && mult >= min_mult {
                out.push(v);
            }
            i += mult;
        }
        out
    }
}

/// Multiset merge of two sorted knot sequences (multiplicities add).
pub fn knot_merge(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] <= b[j] {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Multiset difference: knots of `a` not matched (multiplicity-aware, within
/// [`KNOT_EPS`]) by a knot of `b`. Used to find the knots one operand is
/// missing relative to another.
pub fn knot_subtract(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = Vec::new();
    let mut j = 0;
    for &k in a {
        while j < b.len() && b[j] < k - KNOT_EPS {
            j += 1;
        }
        if j < b.len() && (b[j] - k).abs() < KNOT_EPS {
            j += 1;
        } else {
            out.push(k);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_descending_knots() {
        let err = KnotVector::new(2, vec![0.0, 1.0, 0.5, 2.0]).unwrap_err();
        assert!(
            matches!(err, KnotError::NotAscending { index: 2, .. }),
            "expected NotAscending at index 2, got {:?}",
            err
        );
    }

    #[test]
    fn bezier_form_detection() {
        assert!(KnotVector::bezier(3).unwrap().has_bezier_form());
        let kv = KnotVector::new(2, vec![0.0, 0.0, 1.0, 2.0, 2.0]).unwrap();
        assert!(!kv.has_bezier_form());
    }

    #[test]
    fn constructors_reject_order_zero() {
        assert!(matches!(
            KnotVector::bezier(0),
            Err(KnotError::InvalidOrder { order: 0 })
        ));
        assert!(matches!(
            KnotVector::uniform_open(0, 3, 0.0, 1.0),
            Err(KnotError::InvalidOrder { order: 0 })
        ));
    }

    #[test]
    fn domain_of_clamped_vector() {
        let kv = KnotVector::uniform_open(3, 5, 0.0, 1.0).unwrap();
        let (d0, d1) = kv.domain();
        assert!((d0 - 0.0).abs() < 1e-15 && (d1 - 1.0).abs() < 1e-15);
        assert_eq!(kv.num_ctl(), 5);
        // Interior knots should be evenly spaced: 1/3, 2/3.
        assert!((kv.knots()[3] - 1.0 / 3.0).abs() < 1e-15);
        assert!((kv.knots()[4] - 2.0 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn span_location() {
        let kv = KnotVector::new(2, vec![0.0, 0.0, 1.0, 2.0, 2.0]).unwrap();
        assert_eq!(kv.last_index_le(0.5), 1);
        assert_eq!(kv.last_index_le(1.0), 2);
        assert_eq!(kv.first_index_gt(1.0), 3);
        assert_eq!(kv.first_index_gt(2.0), 5);
    }

    #[test]
    fn multiplicity_counts_duplicates() {
        let kv = KnotVector::new(3, vec![0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 2.0]).unwrap();
        assert_eq!(kv.multiplicity(0.0), 3);
        assert_eq!(kv.multiplicity(1.0), 2);
        assert_eq!(kv.multiplicity(1.5), 0);
    }

    #[test]
    fn merge_and_subtract_are_multiset_ops() {
        let merged = knot_merge(&[0.0, 1.0, 2.0], &[0.5, 1.0]);
        assert_eq!(merged, vec![0.0, 0.5, 1.0, 1.0, 2.0]);

        let diff = knot_subtract(&[0.0, 1.0, 1.0, 2.0], &[1.0]);
        assert_eq!(diff, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn make_robust_snaps_near_duplicates() {
        let mut kv = KnotVector::new(2, vec![0.0, 0.0, 1.0, 1.0 + 1e-13, 2.0, 2.0]).unwrap();
        kv.make_robust();
        assert_eq!(kv.knots()[2], kv.knots()[3]);
    }

    #[test]
    fn discontinuity_detection() {
        // Order 3 with an interior knot of multiplicity 2 -> C1 discontinuity.
        let kv = KnotVector::new(3, vec![0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 2.0]).unwrap();
        assert_eq!(kv.c1_discontinuities(), vec![1.0]);
        assert!(kv.c0_discontinuities().is_empty());
    }

    #[test]
    fn affine_remap_moves_domain() {
        let kv = KnotVector::new(2, vec![0.0, 0.0, 1.0, 2.0, 2.0]).unwrap();
        let remapped = kv.affine_remap(0.0, 1.0);
        let (d0, d1) = remapped.domain();
        assert!((d0 - 0.0).abs() < 1e-15 && (d1 - 1.0).abs() < 1e-15);
        assert!((remapped.knots()[2] - 0.5).abs() < 1e-15);
    }
}
