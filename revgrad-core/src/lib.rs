//!
//! # revgrad-core
//!
//! Define-by-run reverse-mode automatic differentiation: running a computation
//! on [`Var`]s records the graph as a side effect, and [`Var::backward`] walks it
//! back to fill in gradients.
//!
//! ## Ownership Invariants
//!
//! The graph is a DAG of `Rc`s and nothing else, no arena and no tape:
//!
//! 1. A variable owns the [`Function`] that created it (strong)
//! 2. A function owns its inputs (strong), its backward rule reads their data
//! 3. A function only observes its outputs (weak), so there is never a cycle
//!
//! Whatever the caller stops holding is freed, including the graph behind a
//! result once the result itself is dropped.
//!
//! ## Example
//!
//! ```
//! use lib_revgrad_core::{ops, Var};
//!
//! let a = Var::new(3.0f64);
//! let b = Var::new(2.0f64);
//! let c = Var::new(1.0f64);
//! let y = ops::add(&ops::mul(&a, &b)?, &c)?;
//! y.backward(false)?;
//! assert_eq!(a.grad(), Some(2.0));
//! assert_eq!(b.grad(), Some(3.0));
//! assert_eq!(c.grad(), Some(1.0));
//! # Ok::<(), lib_revgrad_core::Error>(())
//! ```
//!

mod backward;
pub mod check;
pub mod config;
mod error;
mod function;
pub mod ops;
mod tensor;
mod var;

pub use config::{no_grad, using_config, ConfigGuard};
pub use error::{Error, Result};
pub use function::{Function, Operation, Outputs};
pub use ops::{add, exp, mul, square};
pub use tensor::{as_tensor, DType, Scalar, Shape, Tensor};
pub use var::Var;
