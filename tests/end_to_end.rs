use std::panic;
use std::rc::Rc;

use ndarray::arr0;

use lib_revgrad::array::{self, NdArray};
use lib_revgrad::{add, config, exp, mul, no_grad, square, Error, Var};

#[test]
fn affine_with_operators() {
  let a = Var::new(3.0f64);
  let b = Var::new(2.0f64);
  let c = Var::new(1.0f64);
  let y = ((&a * &b).unwrap() + &c).unwrap();
  y.backward(false).unwrap();

  assert_eq!(y.data(), Some(7.0));
  assert_eq!(a.grad(), Some(2.0));
  assert_eq!(b.grad(), Some(3.0));
  assert_eq!(c.grad(), Some(1.0));
}

#[test]
fn affine_on_arrays() {
  let a = array::scalar(3);
  let b = array::scalar(2);
  let c = array::scalar(1);
  let y = add(&mul(&a, &b).unwrap(), &c).unwrap();
  y.backward(false).unwrap();

  assert_eq!(y.data(), Some(NdArray::from(arr0(7.0))));
  assert_eq!(a.grad(), Some(NdArray::from(arr0(2.0))));
  assert_eq!(b.grad(), Some(NdArray::from(arr0(3.0))));
  assert_eq!(c.grad(), Some(NdArray::from(arr0(1.0))));
}

#[test]
fn gradients_sum_over_paths() {
  let x = Var::new(3.0f64);
  let y = ((&x * &x).unwrap() + (&x * &x).unwrap()).unwrap();
  y.backward(false).unwrap();
  assert_eq!(x.grad(), Some(12.0));

  let x = Var::new(3.0f64);
  add(&x, &x).unwrap().backward(false).unwrap();
  assert_eq!(x.grad(), Some(2.0));
}

#[test]
fn diamond() {
  // y = (x^2)^2 + (x^2)^2 = 2x^4, dy/dx = 8x^3
  let x = Var::new(2.0f64);
  let a = square(&x).unwrap();
  let y = add(&square(&a).unwrap(), &square(&a).unwrap()).unwrap();
  y.backward(false).unwrap();
  assert_eq!(y.data(), Some(32.0));
  assert_eq!(x.grad(), Some(64.0));
  assert_eq!(a.grad(), None);
}

#[test]
fn retain_grad_keeps_intermediates() {
  let x = Var::new(0.5f64);
  let a = square(&x).unwrap();
  let b = exp(&a).unwrap();
  let y = square(&b).unwrap();
  y.backward(true).unwrap();

  // dy/db = 2b, dy/da = 2b * e^a
  let b_ = b.data().unwrap();
  assert_eq!(y.grad(), Some(1.0));
  assert_eq!(b.grad(), Some(2.0 * b_));
  assert_eq!(a.grad(), Some(2.0 * b_ * 0.25f64.exp()));
  assert!(x.grad().is_some());
}

#[test]
fn repeated_passes_accumulate_until_cleared() {
  let x = Var::new(3.0f64);
  let y = square(&x).unwrap();
  y.backward(false).unwrap();
  y.backward(false).unwrap();
  assert_eq!(x.grad(), Some(12.0));

  x.clear_grad();
  y.clear_grad();
  y.backward(false).unwrap();
  assert_eq!(x.grad(), Some(6.0));
}

#[test]
fn no_grad_records_nothing() {
  let x = Var::new(2.0f64);
  {
    let _guard = no_grad();
    let y = square(&x).unwrap();
    assert!(y.creator().is_none());
    assert_eq!(y.generation(), 0);
  }
  let y = square(&x).unwrap();
  assert!(y.creator().is_some());
  assert_eq!(y.generation(), 1);
}

#[test]
fn no_grad_is_restored_after_a_panic() {
  let result = panic::catch_unwind(|| {
    let _guard = no_grad();
    assert!(!config::enable_backprop());
    panic!("inside no_grad");
  });
  assert!(result.is_err());
  assert!(config::enable_backprop());
}

#[test]
fn dropping_the_result_frees_the_graph() {
  let x = Var::new(1.5f64);
  let y = exp(&square(&x).unwrap()).unwrap();

  let creator = y.creator().unwrap();
  let inner = Rc::downgrade(&creator.inputs()[0].creator().unwrap());
  let outer = Rc::downgrade(&creator);
  drop(creator);

  assert!(outer.upgrade().is_some());
  drop(y);
  assert!(outer.upgrade().is_none());
  assert!(inner.upgrade().is_none());
  // the leaf is still ours
  assert_eq!(x.data(), Some(1.5));
}

#[test]
fn long_chains_are_freed() {
  let x = Var::new(1.0f64);
  let k = Var::new(1.0f64);
  let mut y = mul(&x, &k).unwrap();
  for _ in 1..150_000 {
    y = mul(&y, &k).unwrap();
  }
  let outer = Rc::downgrade(&y.creator().unwrap());
  y.backward(false).unwrap();
  assert_eq!(x.grad(), Some(1.0));

  drop(y);
  assert!(outer.upgrade().is_none());
  assert_eq!(k.grad(), Some(150_000.0));
}

#[test]
fn functions_do_not_keep_outputs_alive() {
  let x = Var::new(1.0f64);
  let a = square(&x).unwrap();
  let creator = a.creator().unwrap();
  assert!(creator.outputs()[0].as_ref().unwrap().ptr_eq(&a));

  drop(a);
  assert!(creator.outputs()[0].is_none());
}

#[test]
fn dynamic_construction() {
  let x = array::Var::from_dyn(&NdArray::from(ndarray::array![1.0, 2.0])).unwrap();
  assert_eq!(x.shape().unwrap().as_slice(), &[2]);

  let err = array::Var::from_dyn(&"not a tensor").unwrap_err();
  assert!(matches!(err, Error::TypeConstraint { .. }));
}

#[test]
fn errors_surface_as_results() {
  let x = array::var(ndarray::array![1.0, 2.0]);
  let y = array::var(ndarray::array![1.0, 2.0, 3.0]);
  assert!(matches!(
    add(&x, &y).unwrap_err(),
    Error::ShapeMismatch { op: "add", .. }
  ));

  assert!(matches!(
    x.set_grad(NdArray::from(ndarray::array![1.0])).unwrap_err(),
    Error::ShapeMismatch { op: "set_grad", .. }
  ));
  assert_eq!(x.grad(), None);

  let empty = array::Var::empty();
  assert_eq!(
    exp(&empty).unwrap_err(),
    Error::UnboundInput { op: "exp", index: 0 }
  );
  assert_eq!(
    empty.backward(false).unwrap_err(),
    Error::UnboundInput {
      op: "backward",
      index: 0
    }
  );
}
