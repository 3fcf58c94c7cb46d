//! Multivariate tensor-product splines.
//!
//! A [`Multivar`] is a function of `d` parameters with values in an
//! arbitrary point type, represented in a separable Bezier or B-spline
//! basis. The module layer provides knot refinement, subdivision, pointwise
//! and product algebra, differentiation (including rational quotient-rule
//! derivatives), and representation reconciliation for binary operations.

pub mod algebra;
pub mod compat;
pub mod error;
pub mod multivar;
pub mod refine;
pub mod subdivide;

pub use compat::{make_compatible, CompatOptions};
pub use error::MvarError;
pub use multivar::Multivar;
