//! Curve and surface layer of the spline kernel.
//!
//! Builds parametric curves and tensor-product surfaces on top of the scalar
//! basis engine: Bezier, B-spline, and power-basis representations, rational
//! (homogeneous) control points, evaluation with iso-parameter caching,
//! subdivision, refinement, and least-squares fitting.

use serde::{Deserialize, Serialize};

pub mod curve;
pub mod error;
pub mod fitting;
pub mod points;
pub mod power;
pub mod surface;

pub use curve::{make_curves_compatible, Curve};
pub use error::GeomError;
pub use fitting::{fit_bspline_curve, knot_removal_error};
pub use points::{CtlPoints, PointType};
pub use surface::{IsoCache, Surface};

/// The function basis a representation's coefficients are expressed in.
///
/// The set is closed: every representation in the kernel is one of these
/// three, and code matching on the basis handles all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasisKind {
    /// Bernstein basis over [0, 1].
    Bezier,
    /// B-spline basis over an explicit knot vector.
    Bspline,
    /// Monomial (power) basis over [0, 1]; conversion target only.
    Power,
}
