use std::cell::Ref;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::config;
use crate::error::{Error, Result};
use crate::tensor::{check_shapes, Tensor};
use crate::var::{Var, VarNode};

/// Operation trait for defining forward and backward computations.
///
/// Each concrete operation (square, add, ...) implements this trait. An
/// operation is just the numeric rules; recording it in the graph is the job of
/// [`Function::apply`], which also guarantees that `forward` only ever sees as
/// many inputs as [`Operation::arity`] declares, and that `backward` gets the
/// very inputs `forward` saw plus one gradient per output.
pub trait Operation<T: Tensor>: fmt::Debug {
  fn name(&self) -> &'static str;

  /// Number of inputs, `None` if the operation takes any number
  fn arity(&self) -> Option<usize> {
    None
  }

  /// Forward computation, producing one or more outputs
  fn forward(&self, xs: &[&T]) -> Result<SmallVec<[T; 1]>>;

  /// Vector-Jacobian product: map the output gradients `gys` to one gradient
  /// per input, given the inputs `xs` of the forward call
  fn backward(&self, xs: &[&T], gys: &[&T]) -> Result<SmallVec<[T; 2]>> {
    let _ = (xs, gys);
    Err(Error::Unimplemented {
      op: self.name(),
      rule: "backward",
    })
  }
}

/// A recorded application of an [`Operation`].
///
/// Inputs are held strongly, the backward rule needs their data. Outputs are
/// held weakly: each output already owns this record through its creator link,
/// and a strong reference back would make a cycle...
pub struct Function<T: Tensor> {
  op: Box<dyn Operation<T>>,
  generation: usize,
  inputs: SmallVec<[Var<T>; 2]>,
  outputs: SmallVec<[Weak<VarNode<T>>; 1]>,
}

/// What an operation hands back: a single variable, or several in the order
/// the operation declares them
#[derive(Debug)]
pub enum Outputs<T: Tensor> {
  Single(Var<T>),
  Multiple(Vec<Var<T>>),
}

impl<T: Tensor> Outputs<T> {
  pub fn len(&self) -> usize {
    match self {
      Outputs::Single(_) => 1,
      Outputs::Multiple(vars) => vars.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn single(self) -> Option<Var<T>> {
    match self {
      Outputs::Single(var) => Some(var),
      Outputs::Multiple(_) => None,
    }
  }

  pub fn into_vec(self) -> Vec<Var<T>> {
    match self {
      Outputs::Single(var) => vec![var],
      Outputs::Multiple(vars) => vars,
    }
  }
}

impl<T: Tensor> From<SmallVec<[Var<T>; 1]>> for Outputs<T> {
  fn from(mut vars: SmallVec<[Var<T>; 1]>) -> Self {
    if vars.len() == 1 {
      if let Some(var) = vars.pop() {
        return Outputs::Single(var);
      }
    }
    Outputs::Multiple(vars.into_vec())
  }
}

/// Borrow the data of every variable, failing on the first one without any
fn borrow_all<'a, T: Tensor>(
  op: &'static str,
  vars: impl Iterator<Item = &'a Var<T>>,
) -> Result<SmallVec<[Ref<'a, T>; 2]>> {
  vars
    .enumerate()
    .map(|(index, var)| {
      Ref::filter_map(var.borrow_data(), Option::as_ref)
        .map_err(|_| Error::UnboundInput { op, index })
    })
    .collect()
}

impl<T: Tensor> Function<T> {
  /// Run `op` on `inputs` and wrap the results as new variables.
  ///
  /// With recording enabled (see [`config`]), the outputs get this application
  /// as their creator and a generation one past the youngest input. With it
  /// disabled, the outputs are plain leaves and `op` is dropped on return.
  pub fn apply<O>(op: O, inputs: &[&Var<T>]) -> Result<Outputs<T>>
  where
    O: Operation<T> + 'static,
  {
    let name = op.name();
    if let Some(expected) = op.arity() {
      if expected != inputs.len() {
        return Err(Error::Arity {
          op: name,
          expected,
          actual: inputs.len(),
        });
      }
    }

    // read phase, inputs stay borrowed only for the forward call...
    let ys = {
      let data = borrow_all(name, inputs.iter().copied())?;
      let xs: SmallVec<[&T; 2]> = data.iter().map(|x| &**x).collect();
      op.forward(&xs)?
    };

    let outputs: SmallVec<[Var<T>; 1]> = ys.into_iter().map(Var::new).collect();

    if config::enable_backprop() {
      let generation = inputs
        .iter()
        .map(|x| x.generation())
        .max()
        .unwrap_or(0);
      let function = Rc::new(Function {
        op: Box::new(op),
        generation,
        inputs: inputs.iter().map(|&x| x.clone()).collect(),
        outputs: outputs.iter().map(Var::downgrade).collect(),
      });
      for output in &outputs {
        output.set_creator(&function);
      }
      tracing::trace!(
        op = name,
        generation,
        outputs = outputs.len(),
        "recorded function"
      );
    }

    Ok(Outputs::from(outputs))
  }

  /// Like [`Function::apply`], for operations declaring exactly one output
  pub fn apply_single<O>(op: O, inputs: &[&Var<T>]) -> Result<Var<T>>
  where
    O: Operation<T> + 'static,
  {
    let name = op.name();
    match Self::apply(op, inputs)? {
      Outputs::Single(var) => Ok(var),
      Outputs::Multiple(vars) => Err(Error::OutputCount {
        op: name,
        expected: 1,
        actual: vars.len(),
      }),
    }
  }

  pub fn name(&self) -> &'static str {
    self.op.name()
  }

  /// Generation of the youngest input; backward visits functions from the
  /// highest generation down
  pub fn generation(&self) -> usize {
    self.generation
  }

  pub fn inputs(&self) -> &[Var<T>] {
    &self.inputs
  }

  /// The outputs still alive, `None` in place of any that were dropped
  pub fn outputs(&self) -> SmallVec<[Option<Var<T>>; 1]> {
    self
      .outputs
      .iter()
      .map(|output| output.upgrade().map(Var::from_node))
      .collect()
  }

  /// Gradient of every output, in output order
  pub(crate) fn output_grads(&self) -> Result<SmallVec<[T; 1]>> {
    self
      .outputs
      .iter()
      .enumerate()
      .map(|(index, output)| {
        output
          .upgrade()
          .and_then(|node| Var::from_node(node).grad())
          .ok_or(Error::MissingGradient {
            op: self.name(),
            index,
          })
      })
      .collect()
  }

  /// Run the backward rule, producing exactly one gradient per input, each
  /// shaped like its input
  pub(crate) fn input_grads(&self, gys: &[T]) -> Result<SmallVec<[T; 2]>> {
    let data = borrow_all(self.name(), self.inputs.iter())?;
    let xs: SmallVec<[&T; 2]> = data.iter().map(|x| &**x).collect();
    let gys: SmallVec<[&T; 1]> = gys.iter().collect();
    let gxs = self.op.backward(&xs, &gys)?;
    if gxs.len() != self.inputs.len() {
      return Err(Error::GradientCount {
        op: self.name(),
        expected: self.inputs.len(),
        actual: gxs.len(),
      });
    }
    for (x, gx) in xs.iter().zip(&gxs) {
      check_shapes(self.name(), *x, gx)?;
    }
    Ok(gxs)
  }

  /// Drop the gradients of all outputs except `keep`
  pub(crate) fn clear_output_grads(&self, keep: &Var<T>) {
    for output in self.outputs.iter().filter_map(Weak::upgrade) {
      let output = Var::from_node(output);
      if !output.ptr_eq(keep) {
        output.clear_grad();
      }
    }
  }
}

/// Unlink the graph behind this record without recursing.
///
/// Plain field drops would go input, creator, input, ... with one stack frame
/// per step along the longest chain. Here every input nobody else holds gives
/// up its creator, and that creator's inputs join the worklist...
impl<T: Tensor> Drop for Function<T> {
  fn drop(&mut self) {
    let mut pending: Vec<Var<T>> = self.inputs.drain(..).collect();
    while let Some(var) = pending.pop() {
      let Some(creator) = var.take_creator_if_unique() else {
        continue;
      };
      drop(var);
      // a creator shared with a live sibling output stays where it is
      if let Ok(mut function) = Rc::try_unwrap(creator) {
        pending.extend(function.inputs.drain(..));
      }
    }
  }
}

impl<T: Tensor> fmt::Debug for Function<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Function")
      .field("op", &self.op)
      .field("generation", &self.generation)
      .field("inputs", &self.inputs.len())
      .field("outputs", &self.outputs.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use smallvec::smallvec;

  use crate::ops::mul;
  use crate::tensor::testing::Vec64;

  /// Splits x into (x, 2x); exercises multi-output bookkeeping
  #[derive(Debug)]
  struct Fork;

  impl Operation<f64> for Fork {
    fn name(&self) -> &'static str {
      "fork"
    }

    fn arity(&self) -> Option<usize> {
      Some(1)
    }

    fn forward(&self, xs: &[&f64]) -> Result<SmallVec<[f64; 1]>> {
      Ok(smallvec![*xs[0], 2.0 * xs[0]])
    }

    fn backward(&self, _xs: &[&f64], gys: &[&f64]) -> Result<SmallVec<[f64; 2]>> {
      Ok(smallvec![gys[0] + 2.0 * gys[1]])
    }
  }

  /// Forward only, no backward rule
  #[derive(Debug)]
  struct Frozen;

  impl Operation<f64> for Frozen {
    fn name(&self) -> &'static str {
      "frozen"
    }

    fn forward(&self, xs: &[&f64]) -> Result<SmallVec<[f64; 1]>> {
      Ok(smallvec![xs.iter().copied().sum::<f64>()])
    }
  }

  /// Backward rule that forgets an input
  #[derive(Debug)]
  struct Lossy;

  impl Operation<f64> for Lossy {
    fn name(&self) -> &'static str {
      "lossy"
    }

    fn forward(&self, xs: &[&f64]) -> Result<SmallVec<[f64; 1]>> {
      Ok(smallvec![xs[0] + xs[1]])
    }

    fn backward(&self, _xs: &[&f64], gys: &[&f64]) -> Result<SmallVec<[f64; 2]>> {
      Ok(smallvec![*gys[0]])
    }
  }

  #[test]
  fn records_creator_and_generation() {
    let x = Var::new(1.0);
    let y = Function::apply_single(Frozen, &[&x]).unwrap();
    let z = Function::apply_single(Frozen, &[&y, &x]).unwrap();

    let f = z.creator().unwrap();
    assert_eq!(f.name(), "frozen");
    assert_eq!(f.generation(), 1);
    assert_eq!(z.generation(), 2);
    assert_eq!(y.generation(), 1);
    assert_eq!(f.inputs().len(), 2);
    assert!(f.inputs()[0].ptr_eq(&y));

    // the creator lists the variable among its outputs
    let outputs = f.outputs();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].as_ref().unwrap().ptr_eq(&z));
  }

  #[test]
  fn multiple_outputs() {
    let x = Var::new(3.0);
    let outputs = Function::apply(Fork, &[&x]).unwrap();
    assert_eq!(outputs.len(), 2);
    let vars = outputs.into_vec();
    assert_eq!(vars[0].data(), Some(3.0));
    assert_eq!(vars[1].data(), Some(6.0));
    let f = vars[0].creator().unwrap();
    assert!(Rc::ptr_eq(&f, &vars[1].creator().unwrap()));
  }

  #[test]
  fn single_output_is_not_a_list() {
    let x = Var::new(3.0);
    let outputs = Function::apply(Frozen, &[&x]).unwrap();
    assert!(matches!(outputs, Outputs::Single(_)));

    let err = Function::apply_single(Fork, &[&x]).unwrap_err();
    assert_eq!(
      err,
      Error::OutputCount {
        op: "fork",
        expected: 1,
        actual: 2
      }
    );
  }

  #[test]
  fn unbound_input() {
    let x = Var::new(1.0);
    let empty: Var<f64> = Var::empty();
    let err = Function::apply(Frozen, &[&x, &empty]).unwrap_err();
    assert_eq!(err, Error::UnboundInput { op: "frozen", index: 1 });
  }

  #[test]
  fn arity_is_checked() {
    let x = Var::new(1.0);
    let err = Function::apply(Fork, &[&x, &x]).unwrap_err();
    assert_eq!(
      err,
      Error::Arity {
        op: "fork",
        expected: 1,
        actual: 2
      }
    );
  }

  #[test]
  fn no_grad_skips_recording() {
    let x = Var::new(1.0);
    let y = {
      let _guard = config::no_grad();
      Function::apply_single(Frozen, &[&x]).unwrap()
    };
    assert!(y.creator().is_none());
    assert_eq!(y.generation(), 0);

    let z = Function::apply_single(Frozen, &[&x]).unwrap();
    assert!(z.creator().is_some());
  }

  #[test]
  fn missing_backward_rule() {
    let x = Var::new(1.0);
    let y = Function::apply_single(Frozen, &[&x]).unwrap();
    let err = y.backward(false).unwrap_err();
    assert_eq!(
      err,
      Error::Unimplemented {
        op: "frozen",
        rule: "backward"
      }
    );
  }

  #[test]
  fn gradient_count_is_checked() {
    let a = Var::new(1.0);
    let b = Var::new(2.0);
    let y = Function::apply_single(Lossy, &[&a, &b]).unwrap();
    let err = y.backward(false).unwrap_err();
    assert_eq!(
      err,
      Error::GradientCount {
        op: "lossy",
        expected: 2,
        actual: 1
      }
    );
  }

  #[test]
  fn multi_output_backward() {
    let x = Var::new(3.0);
    let vars = Function::apply(Fork, &[&x]).unwrap().into_vec();
    // both outputs need a gradient before the fork can run
    vars[0].set_grad(1.0).unwrap();
    vars[1].set_grad(1.0).unwrap();
    let f = vars[0].creator().unwrap();
    let gxs = f.input_grads(&f.output_grads().unwrap()).unwrap();
    assert_eq!(gxs.as_slice(), &[3.0]);
  }

  #[test]
  fn deep_chain_drops_without_recursion() {
    let k = Var::new(1.0);
    let mut y = Var::new(2.0);
    for _ in 0..200_000 {
      y = Function::apply_single(Frozen, &[&y, &k]).unwrap();
    }
    assert_eq!(y.generation(), 200_000);
    drop(y);
    // the constant survives, only the chain went away
    assert_eq!(k.data(), Some(1.0));
    assert!(k.creator().is_none());
  }

  #[test]
  fn deep_chain_backward_then_drop() {
    let k = Var::new(1.0);
    let x = Var::new(2.0);
    let mut y = x.clone();
    for _ in 0..100_000 {
      y = mul(&y, &k).unwrap();
    }
    y.backward(false).unwrap();
    assert_eq!(x.grad(), Some(1.0));
    // y = x * k^n, dy/dk = n x k^(n-1)
    assert_eq!(k.grad(), Some(200_000.0));
    drop(y);
    assert_eq!(x.data(), Some(2.0));
  }

  #[test]
  fn teardown_keeps_shared_subgraphs() {
    let x = Var::new(1.0);
    let mut mid = x.clone();
    for _ in 0..1_000 {
      mid = Function::apply_single(Frozen, &[&mid]).unwrap();
    }
    let mut y = mid.clone();
    for _ in 0..1_000 {
      y = Function::apply_single(Frozen, &[&y]).unwrap();
    }
    let upper = Rc::downgrade(&y.creator().unwrap());
    drop(y);
    assert!(upper.upgrade().is_none());

    // everything below mid is still recorded
    let mut depth = 0;
    let mut cursor = mid.creator();
    while let Some(f) = cursor {
      depth += 1;
      cursor = f.inputs()[0].creator();
    }
    assert_eq!(depth, 1_000);
  }

  #[test]
  fn gradients_must_match_input_shapes() {
    /// Returns a gradient for x that has one element too many
    #[derive(Debug)]
    struct Widen;

    impl Operation<Vec64> for Widen {
      fn name(&self) -> &'static str {
        "widen"
      }

      fn forward(&self, xs: &[&Vec64]) -> Result<SmallVec<[Vec64; 1]>> {
        Ok(smallvec![xs[0].clone()])
      }

      fn backward(&self, xs: &[&Vec64], _gys: &[&Vec64]) -> Result<SmallVec<[Vec64; 2]>> {
        let mut wide = xs[0].0.clone();
        wide.push(0.0);
        Ok(smallvec![Vec64(wide)])
      }
    }

    let x = Var::new(Vec64(vec![1.0, 2.0]));
    let y = Function::apply_single(Widen, &[&x]).unwrap();
    let err = y.backward(false).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { op: "widen", .. }));
    assert_eq!(x.grad(), None);
  }

  #[test]
  fn missing_output_gradient() {
    let x = Var::new(3.0);
    let vars = Function::apply(Fork, &[&x]).unwrap().into_vec();
    vars[0].set_grad(1.0).unwrap();
    let f = vars[0].creator().unwrap();
    let err = f.output_grads().unwrap_err();
    assert_eq!(err, Error::MissingGradient { op: "fork", index: 1 });
  }
}
