use thiserror::Error;

use crate::tensor::Shape;

/// Everything that can go wrong while building or replaying a graph.
///
/// None of these are transient, each one is a usage error or a broken
/// invariant, so nothing in the crate retries...
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// A variable was built from something that is neither a tensor nor a scalar
  #[error("unsupported variable data, expected `{expected}` or a bare scalar")]
  TypeConstraint { expected: &'static str },

  /// An operation (or the backward seed) was handed a variable with no data
  #[error("input {index} of `{op}` holds no data")]
  UnboundInput { op: &'static str, index: usize },

  /// The scheduler reached a function whose output gradient was never set;
  /// this is a scheduling bug, not something a caller can fix
  #[error("gradient of output {index} of `{op}` was never populated")]
  MissingGradient { op: &'static str, index: usize },

  #[error("`{op}` does not implement a {rule} rule")]
  Unimplemented {
    op: &'static str,
    rule: &'static str,
  },

  #[error("`{op}` takes {expected} inputs, got {actual}")]
  Arity {
    op: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("`{op}` produced {actual} outputs, expected {expected}")]
  OutputCount {
    op: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("backward rule of `{op}` returned {actual} gradients for {expected} inputs")]
  GradientCount {
    op: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("`{op}` got mismatched shapes {lhs:?} and {rhs:?}")]
  ShapeMismatch {
    op: &'static str,
    lhs: Shape,
    rhs: Shape,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
