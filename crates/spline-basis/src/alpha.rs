use crate::knots::{KnotError, KnotVector};
use crate::KNOT_EPS;

/// One row of an [`AlphaMatrix`]: the weights with which consecutive source
/// control points, starting at `col_index`, blend into one target point.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaRow {
    pub col_index: usize,
    pub weights: Vec<f64>,
}

/// Oslo-type knot-insertion matrix.
///
/// Maps the control points of a spline over one knot vector to the control
/// points of the identical spline over a refined (multiset superset) knot
/// vector. Rows are stored sparsely; each row has at most `order` weights and
/// the weights of a row sum to 1.
#[derive(Debug, Clone)]
pub struct AlphaMatrix {
    order: usize,
    old_ctl: usize,
    rows: Vec<AlphaRow>,
}

impl AlphaMatrix {
    /// Build the insertion matrix taking control points over `old_kv` to
    /// control points over `new_knots`.
    ///
    /// `new_knots` must be non-decreasing and a multiset superset of the old
    /// knots (callers typically produce it with
    /// [`knot_merge`](crate::knot_merge)); it shares the old vector's order.
    pub fn build(
        order: usize,
        old_kv: &KnotVector,
        new_knots: &[f64],
    ) -> Result<Self, KnotError> {
        if order < 1 || order != old_kv.order() {
            return Err(KnotError::InvalidOrder { order });
        }
        if new_knots.len() < old_kv.len() {
            return Err(KnotError::LengthMismatch {
                len: new_knots.len(),
                order,
                points: new_knots.len().saturating_sub(order),
            });
        }
        for i in 1..new_knots.len() {
            if new_knots[i] < new_knots[i - 1] {
                return Err(KnotError::NotAscending {
                    index: i,
                    prev: new_knots[i - 1],
                    next: new_knots[i],
                });
            }
        }

        let tau = old_kv.knots();
        let m = tau.len();
        let old_ctl = m - order;
        let new_ctl = new_knots.len() - order;

        let mut rows = Vec::with_capacity(new_ctl);
        let mut dense = vec![0.0; old_ctl.max(1)];

        for j in 0..new_ctl {
            dense.iter_mut().for_each(|v| *v = 0.0);
            let t = new_knots[j];

            // Locate the last non-empty old span containing t. The clamp to
            // m - order - 1 handles t sitting on the right end run.
            let mut mu = old_kv.last_index_le(t).min(m - order - 1);
            while mu > 0 && (tau[mu + 1] - tau[mu]).abs() < KNOT_EPS {
                mu -= 1;
            }
            dense[mu] = 1.0;

            // Discrete B-spline recurrence, raising the stage from k to k+1.
            // Ascending in-place update is safe: the new value at i reads the
            // old values at i and i + 1.
            for k in 1..order {
                let tj = new_knots[j + k];
                let lo = mu.saturating_sub(k);
                for i in lo..=mu {
                    let mut acc = 0.0;
                    let d1 = tau[i + k] - tau[i];
                    if d1.abs() >= KNOT_EPS {
                        acc += (tj - tau[i]) / d1 * dense[i];
                    }
                    if i + 1 < old_ctl && i + k + 1 < m {
                        let d2 = tau[i + k + 1] - tau[i + 1];
                        if d2.abs() >= KNOT_EPS {
                            acc += (tau[i + k + 1] - tj) / d2 * dense[i + 1];
                        }
                    }
                    dense[i] = acc;
                }
            }

            rows.push(sparsify(&dense));
        }

        Ok(Self {
            order,
            old_ctl,
            rows,
        })
    }

    /// Number of control points in the refined spline.
    pub fn new_len(&self) -> usize {
        self.rows.len()
    }

    /// Number of control points the source spline must have.
    pub fn old_len(&self) -> usize {
        self.old_ctl
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn rows(&self) -> &[AlphaRow] {
        &self.rows
    }

    /// Apply the matrix to one strided line of scalars.
    ///
    /// Source values are read at `src_base + i * src_stride` and the refined
    /// values written at `dst_base + j * dst_stride`. Strided access lets the
    /// multivariate layer refine one tensor axis in place without gathering
    /// each line into a temporary.
    pub fn apply(
        &self,
        src: &[f64],
        src_base: usize,
        src_stride: usize,
        dst: &mut [f64],
        dst_base: usize,
        dst_stride: usize,
    ) {
        for (j, row) in self.rows.iter().enumerate() {
            let mut acc = 0.0;
            for (q, &w) in row.weights.iter().enumerate() {
                acc += w * src[src_base + (row.col_index + q) * src_stride];
            }
            dst[dst_base + j * dst_stride] = acc;
        }
    }
}

fn sparsify(dense: &[f64]) -> AlphaRow {
    let first = dense.iter().position(|&v| v.abs() > 1e-15).unwrap_or(0);
    let last = dense
        .iter()
        .rposition(|&v| v.abs() > 1e-15)
        .unwrap_or(first);
    AlphaRow {
        col_index: first,
        weights: dense[first..=last].to_vec(),
    }
}
