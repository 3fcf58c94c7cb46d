use spline_mvar::MvarError;
use thiserror::Error;

/// Errors raised by the zero-set solver.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZeroError {
    #[error("no constraints supplied")]
    EmptyConstraints,

    #[error("constraints disagree on dimension: expected {expected}, found {found}")]
    DimMismatch { expected: usize, found: usize },

    #[error("constraint {index} is not a scalar non-rational function")]
    NotScalar { index: usize },

    #[error("constraints disagree on the domain of axis {axis}")]
    DomainMismatch { axis: usize },

    #[error(transparent)]
    Mvar(#[from] MvarError),
}
