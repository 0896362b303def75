use std::any::Any;
use std::fmt;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Dimensions of a tensor, outermost axis first; empty for zero-dimensional data
pub type Shape = SmallVec<[usize; 4]>;

/// Element type reported by a tensor backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
  F32,
  F64,
}

impl DType {
  pub fn name(&self) -> &'static str {
    match self {
      DType::F32 => "f32",
      DType::F64 => "f64",
    }
  }
}

impl fmt::Display for DType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// The numeric payload of a variable.
///
/// The engine never looks inside a tensor, it only needs the handful of
/// elementwise operations below plus some introspection. Backends implement
/// this for their array type (see `revgrad-ndarray` and `revgrad-matrix`); the
/// plain float types implement it too, as zero-dimensional tensors.
///
/// Binary operations are only ever called on operands of equal shape, the
/// operation catalog checks that before dispatching here...
pub trait Tensor: Clone + fmt::Debug + 'static {
  fn shape(&self) -> Shape;

  fn ndim(&self) -> usize {
    self.shape().len()
  }

  /// Number of elements; 1 for zero-dimensional tensors
  fn size(&self) -> usize {
    self.shape().iter().product()
  }

  fn dtype(&self) -> DType;

  /// Smallest tensor holding a single value (zero-dimensional if the backend
  /// has such a thing)
  fn from_scalar(value: f64) -> Self;

  fn ones_like(&self) -> Self;

  /// Elementwise sum
  fn add(&self, other: &Self) -> Self;

  /// Elementwise product
  fn mul(&self, other: &Self) -> Self;

  fn powi(&self, n: i32) -> Self;

  fn exp(&self) -> Self;

  /// Multiply every element by `k`
  fn scale(&self, k: f64) -> Self;

  /// Add `k` to every element
  fn add_scalar(&self, k: f64) -> Self;

  /// Flattened values in row-major order, widened to f64
  fn to_vec(&self) -> Vec<f64>;
}

macro_rules! float_tensor {
  ($ty:ty, $dtype:ident) => {
    impl Tensor for $ty {
      fn shape(&self) -> Shape {
        Shape::new()
      }

      fn dtype(&self) -> DType {
        DType::$dtype
      }

      fn from_scalar(value: f64) -> Self {
        value as $ty
      }

      fn ones_like(&self) -> Self {
        1.0
      }

      fn add(&self, other: &Self) -> Self {
        self + other
      }

      fn mul(&self, other: &Self) -> Self {
        self * other
      }

      fn powi(&self, n: i32) -> Self {
        <$ty>::powi(*self, n)
      }

      fn exp(&self) -> Self {
        <$ty>::exp(*self)
      }

      fn scale(&self, k: f64) -> Self {
        self * k as $ty
      }

      fn add_scalar(&self, k: f64) -> Self {
        self + k as $ty
      }

      fn to_vec(&self) -> Vec<f64> {
        vec![*self as f64]
      }
    }
  };
}

float_tensor!(f32, F32);
float_tensor!(f64, F64);

/// A bare number that can be normalized into a tensor
pub trait Scalar: Copy + 'static {
  fn to_f64(self) -> f64;
}

macro_rules! scalar {
  ($($ty:ty),*) => {
    $(
      impl Scalar for $ty {
        #[inline(always)]
        fn to_f64(self) -> f64 {
          self as f64
        }
      }
    )*
  };
}

scalar!(f32, f64, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// Normalize a bare scalar into the backend's single-value tensor, so that
/// every variable holds the same kind of data...
pub fn as_tensor<T: Tensor, S: Scalar>(value: S) -> T {
  T::from_scalar(value.to_f64())
}

/// Elementwise operations need equal shapes, there is no broadcasting
pub(crate) fn check_shapes<T: Tensor>(op: &'static str, lhs: &T, rhs: &T) -> Result<()> {
  let (lhs, rhs) = (lhs.shape(), rhs.shape());
  if lhs == rhs {
    Ok(())
  } else {
    Err(Error::ShapeMismatch { op, lhs, rhs })
  }
}

/// Dynamic counterpart of [`Scalar`], for values that only arrive as `dyn Any`
pub(crate) fn scalar_from_any(value: &dyn Any) -> Option<f64> {
  macro_rules! try_scalar {
    ($($ty:ty),*) => {
      $(
        if let Some(v) = value.downcast_ref::<$ty>() {
          return Some(v.to_f64());
        }
      )*
    };
  }

  try_scalar!(f32, f64, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
  None
}
