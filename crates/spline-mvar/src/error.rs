use spline_basis::KnotError;
use spline_geom::{BasisKind, GeomError};
use thiserror::Error;

/// Errors raised by the multivariate layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MvarError {
    #[error(transparent)]
    Knot(#[from] KnotError),

    #[error(transparent)]
    Geom(#[from] GeomError),

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimMismatch { expected: usize, found: usize },

    #[error("axis {axis} out of range for a {dim}-variate function")]
    InvalidAxis { axis: usize, dim: usize },

    #[error("operation requires {expected:?} basis, representation uses {found:?}")]
    WrongBasis {
        expected: BasisKind,
        found: BasisKind,
    },

    #[error("control mesh holds {found} points, expected {expected}")]
    MeshSizeMismatch { expected: usize, found: usize },

    #[error("point types are incompatible: {0}")]
    PointTypeMismatch(String),

    #[error("replacement knot vector on axis {axis} supports {found} points, expected {expected}")]
    KnotCountMismatch {
        axis: usize,
        expected: usize,
        found: usize,
    },

    #[error("operands are incompatible: {0}")]
    Incompatible(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
