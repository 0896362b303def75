use lib_revgrad::{add, mul, no_grad, square, Error, Var};

fn main() -> Result<(), Error> {
  let x1_data = [1.0, 2.0, 3.0, 4.0, 5.0];
  let x2_data = [2.0, 1.0, 0.0, -1.0, 2.0];
  // y = 5.4*x1 - 2.3*x2 - 1.4 for each sample
  let y_data: Vec<f64> = x1_data
    .iter()
    .zip(&x2_data)
    .map(|(x1, x2)| 5.4 * x1 - 2.3 * x2 - 1.4)
    .collect();

  let learning_rate = 0.02;
  let epochs = 20000;

  let w1 = Var::named(0.0f64, "w1");
  let w2 = Var::named(0.0f64, "w2");
  let b = Var::named(0.0f64, "b");
  let params = [&w1, &w2, &b];
  let inv_n = Var::new(1.0 / x1_data.len() as f64);

  for epoch in 0..epochs {
    let mut sse = Var::new(0.0);
    for i in 0..x1_data.len() {
      // y_pred = w1*x1 + w2*x2 + b
      let y_pred = add(
        &add(
          &mul(&w1, &Var::new(x1_data[i]))?,
          &mul(&w2, &Var::new(x2_data[i]))?,
        )?,
        &b,
      )?;
      let err = add(&y_pred, &Var::new(-y_data[i]))?;
      sse = add(&sse, &square(&err)?)?;
    }
    let mse = mul(&sse, &inv_n)?;

    for param in params {
      param.clear_grad();
    }
    mse.backward(false)?;

    {
      let _guard = no_grad();
      for param in params {
        if let (Some(value), Some(grad)) = (param.data(), param.grad()) {
          param.set_data(value - learning_rate * grad)?;
        }
      }
    }

    if epoch % 2000 == 0 {
      println!(
        "epoch {} | MSE = {:.4} | w1 = {:.4} | w2 = {:.4} | b = {:.4}",
        epoch,
        mse.data().unwrap_or(f64::NAN),
        w1.data().unwrap_or(f64::NAN),
        w2.data().unwrap_or(f64::NAN),
        b.data().unwrap_or(f64::NAN),
      );
    }
  }

  println!("trained parameters:");
  println!("w1 = {w1:?}");
  println!("w2 = {w2:?}");
  println!("b  = {b:?}");
  Ok(())
}
