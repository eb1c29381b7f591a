use ndarray::{Array, ArrayBase, Data, Dimension};

/// Logistic function, split on sign so neither branch overflows `exp`.
pub fn sigmoid_scalar(v: f32) -> f32 {
    if v >= 0.0 {
        1.0 / (1.0 + (-v).exp())
    } else {
        let e = v.exp();
        e / (1.0 + e)
    }
}

/// Apply the sigmoid elementwise, returning a new array
pub fn sigmoid<S, D>(input: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    input.mapv(sigmoid_scalar)
}

/// Derivative expressed through the already-activated values: `s * (1 - s)`
pub fn sigmoid_derivative<S, D>(activated: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    activated.mapv(|s| s * (1.0 - s))
}
