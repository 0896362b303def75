//!
//! Graph recording switch.
//!
//! Every operation checks [`enable_backprop`] before it records itself on its
//! outputs. Turning it off gives the inference path: outputs come back without
//! a creator, and the operation along with its inputs is dropped right away.
//!
//! The flag is only ever changed through a [`ConfigGuard`], which puts the old
//! value back when it goes out of scope, unwinding included. It lives in a
//! thread local; graphs are `!Send` anyway, so a graph and the flag that governs
//! it always sit on the same thread.
//!

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
  static ENABLE_BACKPROP: Cell<bool> = const { Cell::new(true) };
}

/// Whether operations currently record themselves for backpropagation
#[inline]
pub fn enable_backprop() -> bool {
  ENABLE_BACKPROP.with(Cell::get)
}

/// Restores the previous `enable_backprop` value on drop.
///
/// Guards nest: dropping an inner guard restores whatever the outer one
/// installed, not the default.
#[must_use = "the previous setting is restored as soon as the guard is dropped"]
pub struct ConfigGuard {
  previous: bool,
  // the guard touches a thread local, keep it on the thread that made it
  phantom: PhantomData<*const ()>,
}

impl ConfigGuard {
  /// The value that will be restored
  pub fn previous(&self) -> bool {
    self.previous
  }
}

impl Drop for ConfigGuard {
  fn drop(&mut self) {
    ENABLE_BACKPROP.with(|flag| flag.set(self.previous));
  }
}

/// Install `enable` until the returned guard is dropped
pub fn using_config(enable: bool) -> ConfigGuard {
  let previous = ENABLE_BACKPROP.with(|flag| flag.replace(enable));
  tracing::trace!(enable, previous, "config override installed");
  ConfigGuard {
    previous,
    phantom: PhantomData,
  }
}

/// Disable graph recording until the returned guard is dropped
pub fn no_grad() -> ConfigGuard {
  using_config(false)
}

/// Run `f` with `enable_backprop` set to `enable`
pub fn with_config<R, F>(enable: bool, f: F) -> R
where
  F: FnOnce() -> R,
{
  let _guard = using_config(enable);
  f()
}

/// Run `f` without recording a graph
pub fn with_no_grad<R, F>(f: F) -> R
where
  F: FnOnce() -> R,
{
  with_config(false, f)
}
