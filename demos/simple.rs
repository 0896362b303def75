use lib_revgrad::{mul, Error, Var};

fn main() -> Result<(), Error> {
  // Leaves are plain values, every operation on them records itself
  let x = Var::new(1.0f64);
  let y = mul(&x, &x)?;
  // Walking back from y fills in the gradient of everything it depends on
  y.backward(false)?;
  println!("Value: {:?}, dy/dx: {:?}", y.data(), x.grad());
  Ok(())
}
