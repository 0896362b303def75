//!
//! The operation catalog: square, exp, add and mul.
//!
//! Each operation is a unit struct implementing [`Operation`] for every
//! [`Tensor`]; the free functions record one application each. `&a + &b` and
//! `&a * &b` are the same as [`add`] and [`mul`], and like them hand back a
//! `Result`.
//!

use std::ops;

use smallvec::{smallvec, SmallVec};

use crate::error::Result;
use crate::function::{Function, Operation};
use crate::tensor::{check_shapes, Tensor};
use crate::var::Var;

macro_rules! unary_op {
  ($name:ident, $label:literal, $forward:expr, $backward:expr) => {
    #[derive(Debug, Clone, Copy, Default)]
    pub struct $name;

    impl<T: Tensor> Operation<T> for $name {
      fn name(&self) -> &'static str {
        $label
      }

      fn arity(&self) -> Option<usize> {
        Some(1)
      }

      fn forward(&self, xs: &[&T]) -> Result<SmallVec<[T; 1]>> {
        Ok(smallvec![$forward(xs[0])])
      }

      fn backward(&self, xs: &[&T], gys: &[&T]) -> Result<SmallVec<[T; 2]>> {
        Ok(smallvec![$backward(xs[0], gys[0])])
      }
    }
  };
}

// d(x^2)/dx = 2x
unary_op!(
  SquareOp,
  "square",
  |x: &T| x.powi(2),
  |x: &T, gy: &T| x.scale(2.0).mul(gy)
);

// d(e^x)/dx = e^x
unary_op!(
  ExpOp,
  "exp",
  |x: &T| x.exp(),
  |x: &T, gy: &T| x.exp().mul(gy)
);

#[derive(Debug, Clone, Copy, Default)]
pub struct AddOp;

impl<T: Tensor> Operation<T> for AddOp {
  fn name(&self) -> &'static str {
    "add"
  }

  fn arity(&self) -> Option<usize> {
    Some(2)
  }

  fn forward(&self, xs: &[&T]) -> Result<SmallVec<[T; 1]>> {
    check_shapes("add", xs[0], xs[1])?;
    Ok(smallvec![xs[0].add(xs[1])])
  }

  fn backward(&self, _xs: &[&T], gys: &[&T]) -> Result<SmallVec<[T; 2]>> {
    Ok(smallvec![gys[0].clone(), gys[0].clone()])
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MulOp;

impl<T: Tensor> Operation<T> for MulOp {
  fn name(&self) -> &'static str {
    "mul"
  }

  fn arity(&self) -> Option<usize> {
    Some(2)
  }

  fn forward(&self, xs: &[&T]) -> Result<SmallVec<[T; 1]>> {
    check_shapes("mul", xs[0], xs[1])?;
    Ok(smallvec![xs[0].mul(xs[1])])
  }

  fn backward(&self, xs: &[&T], gys: &[&T]) -> Result<SmallVec<[T; 2]>> {
    let (x0, x1, gy) = (xs[0], xs[1], gys[0]);
    Ok(smallvec![gy.mul(x1), gy.mul(x0)])
  }
}

/// Elementwise x^2
pub fn square<T: Tensor>(x: &Var<T>) -> Result<Var<T>> {
  Function::apply_single(SquareOp, &[x])
}

/// Elementwise e^x
pub fn exp<T: Tensor>(x: &Var<T>) -> Result<Var<T>> {
  Function::apply_single(ExpOp, &[x])
}

/// Elementwise x0 + x1
pub fn add<T: Tensor>(x0: &Var<T>, x1: &Var<T>) -> Result<Var<T>> {
  Function::apply_single(AddOp, &[x0, x1])
}

/// Elementwise x0 * x1
pub fn mul<T: Tensor>(x0: &Var<T>, x1: &Var<T>) -> Result<Var<T>> {
  Function::apply_single(MulOp, &[x0, x1])
}

impl<T: Tensor> ops::Add for &Var<T> {
  type Output = Result<Var<T>>;

  #[inline]
  fn add(self, other: Self) -> Self::Output {
    add(self, other)
  }
}

impl<T: Tensor> ops::Add<Var<T>> for &Var<T> {
  type Output = Result<Var<T>>;

  #[inline(always)]
  fn add(self, other: Var<T>) -> Self::Output {
    add(self, &other)
  }
}

impl<T: Tensor> ops::Add for Var<T> {
  type Output = Result<Var<T>>;

  #[inline(always)]
  fn add(self, other: Self) -> Self::Output {
    add(&self, &other)
  }
}

impl<T: Tensor> ops::Add<&Var<T>> for Var<T> {
  type Output = Result<Var<T>>;

  #[inline(always)]
  fn add(self, other: &Var<T>) -> Self::Output {
    add(&self, other)
  }
}

impl<T: Tensor> ops::Mul for &Var<T> {
  type Output = Result<Var<T>>;

  #[inline]
  fn mul(self, other: Self) -> Self::Output {
    mul(self, other)
  }
}

impl<T: Tensor> ops::Mul<Var<T>> for &Var<T> {
  type Output = Result<Var<T>>;

  #[inline(always)]
  fn mul(self, other: Var<T>) -> Self::Output {
    mul(self, &other)
  }
}

impl<T: Tensor> ops::Mul for Var<T> {
  type Output = Result<Var<T>>;

  #[inline(always)]
  fn mul(self, other: Self) -> Self::Output {
    mul(&self, &other)
  }
}

impl<T: Tensor> ops::Mul<&Var<T>> for Var<T> {
  type Output = Result<Var<T>>;

  #[inline(always)]
  fn mul(self, other: &Var<T>) -> Self::Output {
    mul(&self, other)
  }
}
