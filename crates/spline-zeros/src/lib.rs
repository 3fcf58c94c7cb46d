//! Zero sets of multivariate spline constraint systems.
//!
//! Constraints are scalar [`Multivar`](spline_mvar::Multivar) functions over
//! a shared parameter box, each tagged as an equality (zero) or sign
//! restriction. The solver subdivides the box recursively, prunes cells by
//! the convex-hull property of the control coefficients, and polishes the
//! surviving candidates with Newton iterations.

pub mod error;
pub mod solver;
pub mod types;

pub use error::ZeroError;
pub use solver::{solve, solve_with_veto};
pub use types::{Constraint, ConstraintKind, Solution, ZeroConfig};
