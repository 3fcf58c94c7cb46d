//! Scalar B-spline basis engine: knot vectors, Cox-de Boor evaluation,
//! binomial tables, and Oslo-type knot-insertion (alpha) matrices.
//!
//! This crate is the leaf dependency of the geometry kernel: everything the
//! curve, surface, and multivariate layers do eventually bottoms out in a
//! knot-span search, a basis-function blend, or an alpha-matrix application
//! implemented here.

pub mod alpha;
pub mod basis;
pub mod binomial;
pub mod knots;

pub use alpha::AlphaMatrix;
pub use basis::{basis_funcs, bernstein_basis, bernstein_diff, bernstein_product, bernstein_raise};
pub use binomial::{bernstein_product_coef, binomial};
pub use knots::{knot_merge, knot_subtract, KnotError, KnotVector};

/// Knot values closer than this are treated as the same breakpoint.
pub const KNOT_EPS: f64 = 1e-10;
