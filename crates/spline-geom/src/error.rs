use spline_basis::KnotError;
use thiserror::Error;

/// Errors raised by the curve/surface layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeomError {
    #[error(transparent)]
    Knot(#[from] KnotError),

    #[error("operation requires {expected:?} basis, representation uses {found:?}")]
    WrongBasis {
        expected: crate::BasisKind,
        found: crate::BasisKind,
    },

    #[error("control mesh holds {found} points, expected {expected}")]
    MeshSizeMismatch { expected: usize, found: usize },

    #[error("axis {axis} out of range for a {dim}-parameter representation")]
    InvalidAxis { axis: usize, dim: usize },

    #[error("point types are incompatible: {0}")]
    PointTypeMismatch(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("{got} samples cannot determine {unknowns} control points")]
    NotEnoughSamples { got: usize, unknowns: usize },

    #[error("linear solve failed: {0}")]
    SolveFailed(String),
}
