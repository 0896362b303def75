//!
//! # revgrad-ndarray
//!
//! N-dimensional tensors for the engine, backed by ndarray's dynamic-rank
//! arrays. Scalars normalize to zero-dimensional arrays.
//!
//! [`NdArray`] wraps an `ArrayD` so it can carry the engine's `Tensor`
//! impl; it derefs to the array for everything else.
//!

use std::ops::Deref;

use ndarray::{Array, ArrayD, Dimension, IxDyn};

use lib_revgrad_core::{self as core, DType, Shape, Tensor};

/// A dynamic-rank array the engine can differentiate through
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray<E = f64>(pub ArrayD<E>);

pub type Var = core::Var<NdArray<f64>>;

pub type Var32 = core::Var<NdArray<f32>>;

impl<E> NdArray<E> {
  pub fn into_inner(self) -> ArrayD<E> {
    self.0
  }
}

impl<E, D: Dimension> From<Array<E, D>> for NdArray<E> {
  fn from(array: Array<E, D>) -> Self {
    NdArray(array.into_dyn())
  }
}

impl<E> Deref for NdArray<E> {
  type Target = ArrayD<E>;

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

macro_rules! array_tensor {
  ($elem:ty, $dtype:ident) => {
    impl Tensor for NdArray<$elem> {
      fn shape(&self) -> Shape {
        Shape::from_slice(self.0.shape())
      }

      fn dtype(&self) -> DType {
        DType::$dtype
      }

      fn from_scalar(value: f64) -> Self {
        NdArray(ArrayD::from_elem(IxDyn(&[]), value as $elem))
      }

      fn ones_like(&self) -> Self {
        NdArray(ArrayD::ones(self.0.raw_dim()))
      }

      fn add(&self, other: &Self) -> Self {
        NdArray(&self.0 + &other.0)
      }

      fn mul(&self, other: &Self) -> Self {
        NdArray(&self.0 * &other.0)
      }

      fn powi(&self, n: i32) -> Self {
        NdArray(self.0.mapv(|v| v.powi(n)))
      }

      fn exp(&self) -> Self {
        NdArray(self.0.mapv(<$elem>::exp))
      }

      fn scale(&self, k: f64) -> Self {
        let k = k as $elem;
        NdArray(self.0.mapv(|v| v * k))
      }

      fn add_scalar(&self, k: f64) -> Self {
        let k = k as $elem;
        NdArray(self.0.mapv(|v| v + k))
      }

      fn to_vec(&self) -> Vec<f64> {
        self.0.iter().map(|&v| v as f64).collect()
      }
    }
  };
}

array_tensor!(f64, F64);
array_tensor!(f32, F32);

/// Leaf variable from an array of any static rank
pub fn var<D: Dimension>(data: Array<f64, D>) -> Var {
  Var::new(NdArray::from(data))
}

/// Leaf variable from a bare scalar, as a zero-dimensional array
pub fn scalar<S: core::Scalar>(value: S) -> Var {
  Var::scalar(value)
}
