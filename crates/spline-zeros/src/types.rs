use spline_mvar::Multivar;

/// How a constraint function restricts the solution set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// The function must vanish.
    Zero,
    /// The function must be non-positive.
    Negative,
    /// The function must be non-negative.
    Positive,
}

/// One scalar constraint over the shared parameter space.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub mvar: Multivar,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn zero(mvar: Multivar) -> Self {
        Self {
            mvar,
            kind: ConstraintKind::Zero,
        }
    }

    pub fn negative(mvar: Multivar) -> Self {
        Self {
            mvar,
            kind: ConstraintKind::Negative,
        }
    }

    pub fn positive(mvar: Multivar) -> Self {
        Self {
            mvar,
            kind: ConstraintKind::Positive,
        }
    }
}

/// Tuning knobs for the subdivision solver.
#[derive(Debug, Clone, Copy)]
pub struct ZeroConfig {
    /// A cell whose every axis span falls below this becomes a candidate;
    /// also the merge radius for duplicate solutions.
    pub subdiv_tol: f64,
    /// Tolerance for treating an evaluated value as zero.
    pub numeric_tol: f64,
    /// Hard cap on subdivision depth; a cell at the cap yields a candidate
    /// even when still wider than `subdiv_tol`.
    pub max_depth: u32,
    /// Polish candidates with Newton iterations when the system is square.
    pub newton_refine: bool,
}

impl Default for ZeroConfig {
    fn default() -> Self {
        Self {
            subdiv_tol: 1e-4,
            numeric_tol: 1e-10,
            max_depth: 48,
            newton_refine: true,
        }
    }
}

/// One point of the zero set, in the original problem coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub params: Vec<f64>,
    /// Free-form provenance tags, e.g. how the point was located.
    pub attrs: Vec<(String, String)>,
}

impl Solution {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
