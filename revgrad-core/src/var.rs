use std::any::{self, Any};
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::backward;
use crate::error::{Error, Result};
use crate::function::Function;
use crate::tensor::{as_tensor, check_shapes, scalar_from_any, DType, Scalar, Shape, Tensor};

pub(crate) struct VarNode<T: Tensor> {
  data: RefCell<Option<T>>,
  grad: RefCell<Option<T>>,
  creator: RefCell<Option<Rc<Function<T>>>>,
  generation: Cell<usize>,
  name: RefCell<Option<String>>,
}

/// A variable in the computational graph.
///
/// `Var` is a shared handle, cloning it gives another handle to the same node.
/// A node keeps the function that produced it (its creator) alive, while a
/// function only refers back to its outputs weakly, so dropping the last handle
/// to the final result of a computation frees the whole graph behind it...
pub struct Var<T: Tensor> {
  node: Rc<VarNode<T>>,
}

impl<T: Tensor> Var<T> {
  /// Construct a leaf variable
  pub fn new(data: T) -> Self {
    Self::with_parts(Some(data), None)
  }

  /// Construct a leaf variable that has no data yet; it cannot be used as an
  /// operation input until [`Var::set_data`] gives it some
  pub fn empty() -> Self {
    Self::with_parts(None, None)
  }

  pub fn named(data: T, name: impl Into<String>) -> Self {
    Self::with_parts(Some(data), Some(name.into()))
  }

  /// Construct a leaf variable from a bare scalar, normalized into the
  /// backend's single-value tensor
  pub fn scalar<S: Scalar>(value: S) -> Self {
    Self::new(as_tensor(value))
  }

  /// Construct a leaf variable from a dynamically typed value, which must be
  /// either a `T` or a bare scalar
  pub fn from_dyn(value: &dyn Any) -> Result<Self> {
    if let Some(data) = value.downcast_ref::<T>() {
      return Ok(Self::new(data.clone()));
    }
    match scalar_from_any(value) {
      Some(v) => Ok(Self::new(T::from_scalar(v))),
      None => Err(Error::TypeConstraint {
        expected: any::type_name::<T>(),
      }),
    }
  }

  fn with_parts(data: Option<T>, name: Option<String>) -> Self {
    Self {
      node: Rc::new(VarNode {
        data: RefCell::new(data),
        grad: RefCell::new(None),
        creator: RefCell::new(None),
        generation: Cell::new(0),
        name: RefCell::new(name),
      }),
    }
  }

  pub(crate) fn from_node(node: Rc<VarNode<T>>) -> Self {
    Self { node }
  }

  pub(crate) fn downgrade(&self) -> Weak<VarNode<T>> {
    Rc::downgrade(&self.node)
  }

  pub(crate) fn borrow_data(&self) -> Ref<'_, Option<T>> {
    self.node.data.borrow()
  }

  /// Get a copy of the data
  pub fn data(&self) -> Option<T> {
    self.node.data.borrow().clone()
  }

  /// Read the data without copying it
  pub fn with_data<R, F>(&self, f: F) -> R
  where
    F: FnOnce(Option<&T>) -> R,
  {
    f(self.node.data.borrow().as_ref())
  }

  /// Replace the data; the variable keeps its creator and gradient.
  ///
  /// Recorded functions read their inputs again during backward, so once a
  /// variable holds data the replacement must have the same shape.
  pub fn set_data(&self, data: T) -> Result<()> {
    let mut current = self.node.data.borrow_mut();
    if let Some(existing) = current.as_ref() {
      check_shapes("set_data", existing, &data)?;
    }
    *current = Some(data);
    Ok(())
  }

  pub fn grad(&self) -> Option<T> {
    self.node.grad.borrow().clone()
  }

  /// Set the gradient, which must be shaped like the data
  pub fn set_grad(&self, grad: T) -> Result<()> {
    if let Some(data) = self.node.data.borrow().as_ref() {
      check_shapes("set_grad", data, &grad)?;
    }
    *self.node.grad.borrow_mut() = Some(grad);
    Ok(())
  }

  /// Forget the gradient; needed before reusing a variable in a second
  /// backward pass, which would otherwise accumulate onto the old one
  pub fn clear_grad(&self) {
    *self.node.grad.borrow_mut() = None;
  }

  /// Sum `grad` into the current gradient, or take it as is when there is none
  pub(crate) fn accumulate_grad(&self, grad: T) {
    let mut current = self.node.grad.borrow_mut();
    *current = Some(match current.take() {
      Some(existing) => existing.add(&grad),
      None => grad,
    });
  }

  /// The function that produced this variable, `None` for leaves and for
  /// anything built while recording was disabled
  pub fn creator(&self) -> Option<Rc<Function<T>>> {
    self.node.creator.borrow().clone()
  }

  /// Detach the creator, but only when this is the last handle to the node;
  /// graph teardown uses it to unlink chains one step at a time
  pub(crate) fn take_creator_if_unique(&self) -> Option<Rc<Function<T>>> {
    if Rc::strong_count(&self.node) == 1 {
      self.node.creator.borrow_mut().take()
    } else {
      None
    }
  }

  pub(crate) fn set_creator(&self, function: &Rc<Function<T>>) {
    self.node.generation.set(function.generation() + 1);
    *self.node.creator.borrow_mut() = Some(Rc::clone(function));
  }

  pub fn generation(&self) -> usize {
    self.node.generation.get()
  }

  pub fn name(&self) -> Option<String> {
    self.node.name.borrow().clone()
  }

  pub fn set_name(&self, name: impl Into<String>) {
    *self.node.name.borrow_mut() = Some(name.into());
  }

  pub fn shape(&self) -> Option<Shape> {
    self.with_data(|data| data.map(Tensor::shape))
  }

  pub fn ndim(&self) -> Option<usize> {
    self.with_data(|data| data.map(Tensor::ndim))
  }

  pub fn size(&self) -> Option<usize> {
    self.with_data(|data| data.map(Tensor::size))
  }

  pub fn dtype(&self) -> Option<DType> {
    self.with_data(|data| data.map(Tensor::dtype))
  }

  /// Length of the outermost axis, 0 for zero-dimensional data
  pub fn len(&self) -> Option<usize> {
    self.shape().map(|shape| shape.first().copied().unwrap_or(0))
  }

  /// Whether two handles point at the same node
  pub fn ptr_eq(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.node, &other.node)
  }

  /// Backpropagate from this variable.
  ///
  /// Seeds the gradient with ones if it has none, then fills in the gradient
  /// of every variable this one depends on. Unless `retain_grad` is set, only
  /// this variable and the leaves keep their gradients afterwards; the
  /// intermediate ones are dropped as soon as they have been consumed...
  pub fn backward(&self, retain_grad: bool) -> Result<()> {
    backward::run(self, retain_grad)
  }
}

impl<T: Tensor> Clone for Var<T> {
  fn clone(&self) -> Self {
    Self {
      node: Rc::clone(&self.node),
    }
  }
}

impl<T: Tensor> From<T> for Var<T> {
  fn from(data: T) -> Self {
    Self::new(data)
  }
}

impl<T: Tensor> fmt::Debug for Var<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Var")
      .field("name", &self.node.name.borrow())
      .field("data", &self.node.data.borrow())
      .field("grad", &self.node.grad.borrow())
      .field("generation", &self.generation())
      .field(
        "creator",
        &self.node.creator.borrow().as_ref().map(|function| function.name()),
      )
      .finish()
  }
}
