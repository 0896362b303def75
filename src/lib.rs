//!
//! # revgrad
//!
//! ## Core API
//!
//! Define-by-run reverse-mode automatic differentiation. Computing with
//! [`Var`]s records how each value was produced, and [`Var::backward`] replays
//! that record in reverse to fill in gradients. Recording can be switched off
//! for a scope with [`no_grad`].
//!
//! Tensor backends are behind features:
//!
//! - `array` (default): n-dimensional `ndarray` arrays, see [`array`]
//! - `matrix`: `nalgebra` dense matrices, see [`matrix`]
//!
//! Each backend wraps its container in a local type (`array::NdArray`,
//! `matrix::Matrix`). The matrix backend has no zero-dimensional form, so a
//! scalar there is a 1x1 matrix of shape `[1, 1]` rather than shape `[]`.
//!
//! Plain `f32`/`f64` values work without any backend.
//!

pub use lib_revgrad_core::*;

#[cfg(feature = "array")]
pub use lib_revgrad_ndarray as array;

#[cfg(feature = "matrix")]
pub use lib_revgrad_matrix as matrix;
