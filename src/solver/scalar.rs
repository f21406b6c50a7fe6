//! Numeric backend for the equation system.
//!
//! The equation system stores and eliminates coefficients in an opaque
//! scalar type. Device models work in `f64` and only cross into the
//! backend when stamping or reading the solution, so a wider type can be
//! plugged in without touching anything above this boundary.

use std::fmt::Debug;
use std::ops::{AddAssign, SubAssign};

use num_traits::Float;

/// Scalar type used inside [`EquationSystem`](super::EquationSystem).
pub trait Scalar: Float + Debug + Default + AddAssign + SubAssign + 'static {
    /// Convert from the double precision used by device models.
    fn from_double(value: f64) -> Self;

    /// Convert back to double precision.
    fn to_double(self) -> f64;
}

impl Scalar for f64 {
    #[inline]
    fn from_double(value: f64) -> Self {
        value
    }

    #[inline]
    fn to_double(self) -> f64 {
        self
    }
}

impl Scalar for f32 {
    #[inline]
    fn from_double(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_double(self) -> f64 {
        self as f64
    }
}
