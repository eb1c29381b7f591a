pub mod gradient_check;
pub mod numerical_check;

pub use gradient_check::{input_gradient_check, GradientReport};
pub use numerical_check::{scan_values, NumericalIssue};
