//!
//! Central-difference oracle for checking backward rules.
//!
//! Nothing in the engine calls into this module, it exists so tests can
//! compare analytic gradients against numbers that were computed without any
//! of the graph machinery.
//!

use crate::config;
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use crate::var::Var;

/// Step used by [`numerical_diff`] when the caller has no better idea
pub const DEFAULT_EPS: f64 = 1e-4;

/// Approximate df/dx as (f(x + eps) - f(x - eps)) / 2eps.
///
/// The step is applied to every element at once, so the result is only the
/// gradient for elementwise `f`. `f` runs with graph recording disabled.
pub fn numerical_diff<T, F>(f: F, x: &Var<T>, eps: f64) -> Result<T>
where
  T: Tensor,
  F: Fn(&Var<T>) -> Result<Var<T>>,
{
  let _guard = config::no_grad();
  let data = x.data().ok_or(Error::UnboundInput {
    op: "numerical_diff",
    index: 0,
  })?;

  let x0 = Var::new(data.add_scalar(-eps));
  let x1 = Var::new(data.add_scalar(eps));
  let y0 = f(&x0)?.data().ok_or(Error::UnboundInput {
    op: "numerical_diff",
    index: 0,
  })?;
  let y1 = f(&x1)?.data().ok_or(Error::UnboundInput {
    op: "numerical_diff",
    index: 1,
  })?;

  Ok(y1.add(&y0.scale(-1.0)).scale(1.0 / (2.0 * eps)))
}

/// Elementwise |a - b| <= atol + rtol * |b| over tensors of equal shape
pub fn allclose<T: Tensor>(a: &T, b: &T, rtol: f64, atol: f64) -> bool {
  a.shape() == b.shape()
    && a
      .to_vec()
      .into_iter()
      .zip(b.to_vec())
      .all(|(x, y)| (x - y).abs() <= atol + rtol * y.abs())
}
