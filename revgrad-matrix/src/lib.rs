//!
//! # revgrad-matrix
//!
//! Dense matrices for the engine, using nalgebra's dynamically sized
//! `DMatrix`. Every operation in the catalog is elementwise here, so `mul` is
//! the Hadamard product and not a matrix product.
//!
//! A matrix has no zero-dimensional form: scalars, seeds built from scalars
//! included, come out as 1x1 matrices with shape `[1, 1]`.
//!

use std::ops::Deref;

use nalgebra::DMatrix;

use lib_revgrad_core::{self as core, DType, Shape, Tensor};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix(pub DMatrix<f64>);

pub type Var = core::Var<Matrix>;

impl Matrix {
  pub fn into_inner(self) -> DMatrix<f64> {
    self.0
  }
}

impl From<DMatrix<f64>> for Matrix {
  fn from(matrix: DMatrix<f64>) -> Self {
    Matrix(matrix)
  }
}

impl Deref for Matrix {
  type Target = DMatrix<f64>;

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl Tensor for Matrix {
  /// Always two-dimensional, `[nrows, ncols]`
  fn shape(&self) -> Shape {
    Shape::from_slice(&[self.0.nrows(), self.0.ncols()])
  }

  fn dtype(&self) -> DType {
    DType::F64
  }

  fn from_scalar(value: f64) -> Self {
    Matrix(DMatrix::from_element(1, 1, value))
  }

  fn ones_like(&self) -> Self {
    Matrix(DMatrix::from_element(self.0.nrows(), self.0.ncols(), 1.0))
  }

  fn add(&self, other: &Self) -> Self {
    Matrix(&self.0 + &other.0)
  }

  fn mul(&self, other: &Self) -> Self {
    Matrix(self.0.component_mul(&other.0))
  }

  fn powi(&self, n: i32) -> Self {
    Matrix(self.0.map(|v| v.powi(n)))
  }

  fn exp(&self) -> Self {
    Matrix(self.0.map(f64::exp))
  }

  fn scale(&self, k: f64) -> Self {
    Matrix(&self.0 * k)
  }

  fn add_scalar(&self, k: f64) -> Self {
    Matrix(self.0.map(|v| v + k))
  }

  fn to_vec(&self) -> Vec<f64> {
    // storage is column-major
    self.0.transpose().iter().copied().collect()
  }
}

/// Leaf variable holding a matrix
pub fn var(data: DMatrix<f64>) -> Var {
  Var::new(Matrix(data))
}
