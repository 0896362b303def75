//!
//! Backward scheduler.
//!
//! The walk is over functions, not variables: a function's backward rule needs
//! the gradients of all its outputs at once, so it may only run after every
//! function that feeds one of those outputs has run. Functions are popped in
//! descending generation order, which guarantees exactly that; a contributor to
//! an output of `f` consumed that output, so it was created later and carries a
//! generation at least as high as the output's...
//!

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::hash::{BuildHasher, Hash};
use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::function::Function;
use crate::tensor::Tensor;
use crate::var::Var;

/// We know roughly how many functions we will see, but we cant create a set
/// with a given capacity without also supplying the hasher...
trait HashSetExt {
  fn with_capacity(x: usize) -> Self;
}

impl<K, S> HashSetExt for HashSet<K, S>
where
  K: Hash + Eq,
  S: BuildHasher + Default,
{
  fn with_capacity(capacity: usize) -> Self {
    HashSet::with_capacity_and_hasher(capacity, S::default())
  }
}

struct Pending<T: Tensor> {
  generation: usize,
  /// insertion counter, breaks generation ties in favour of the latest push
  order: usize,
  function: Rc<Function<T>>,
}

impl<T: Tensor> Pending<T> {
  #[inline(always)]
  fn key(&self) -> (usize, usize) {
    (self.generation, self.order)
  }
}

impl<T: Tensor> PartialEq for Pending<T> {
  fn eq(&self, other: &Self) -> bool {
    self.key() == other.key()
  }
}

impl<T: Tensor> Eq for Pending<T> {}

impl<T: Tensor> PartialOrd for Pending<T> {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl<T: Tensor> Ord for Pending<T> {
  fn cmp(&self, other: &Self) -> Ordering {
    self.key().cmp(&other.key())
  }
}

/// Functions waiting for their backward rule to run, highest generation first.
///
/// A function enters at most once, however many paths lead to it; identity is
/// the address of the shared record...
struct ReadyQueue<T: Tensor> {
  heap: BinaryHeap<Pending<T>>,
  seen: FxHashSet<*const Function<T>>,
  pushed: usize,
}

impl<T: Tensor> ReadyQueue<T> {
  fn new() -> Self {
    // preallocating a little bit of room, graphs are rarely tiny...
    Self {
      heap: BinaryHeap::with_capacity(64),
      seen: FxHashSet::with_capacity(64),
      pushed: 0,
    }
  }

  fn push(&mut self, function: Rc<Function<T>>) {
    if self.seen.insert(Rc::as_ptr(&function)) {
      self.heap.push(Pending {
        generation: function.generation(),
        order: self.pushed,
        function,
      });
      self.pushed += 1;
    }
  }

  fn pop(&mut self) -> Option<Rc<Function<T>>> {
    self.heap.pop().map(|pending| pending.function)
  }
}

/// Backpropagate from `seed`, see [`Var::backward`]
pub(crate) fn run<T: Tensor>(seed: &Var<T>, retain_grad: bool) -> Result<()> {
  if seed.grad().is_none() {
    // seed dv/dv with ones shaped like v
    let ones = seed
      .with_data(|data| data.map(Tensor::ones_like))
      .ok_or(Error::UnboundInput {
        op: "backward",
        index: 0,
      })?;
    seed.set_grad(ones)?;
  }

  let Some(creator) = seed.creator() else {
    return Ok(());
  };

  tracing::debug!(
    generation = seed.generation(),
    retain_grad,
    "backward pass started"
  );

  let mut queue = ReadyQueue::new();
  queue.push(creator);
  let mut processed = 0usize;

  while let Some(function) = queue.pop() {
    tracing::trace!(
      op = function.name(),
      generation = function.generation(),
      "running backward rule"
    );

    // read phase, every output gradient must be final by now...
    let gys = function.output_grads()?;

    // compute phase
    let gxs = function.input_grads(&gys)?;

    // write phase, sum into inputs reached by more than one path
    for (x, gx) in function.inputs().iter().zip(gxs) {
      x.accumulate_grad(gx);
      if let Some(creator) = x.creator() {
        queue.push(creator);
      }
    }

    if !retain_grad {
      function.clear_output_grads(seed);
    }
    processed += 1;
  }

  tracing::debug!(processed, "backward pass finished");
  Ok(())
}
