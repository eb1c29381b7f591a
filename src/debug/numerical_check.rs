use ndarray::{ArrayBase, Data, Dimension};

/// Types of numerical issues
#[derive(Debug, Clone, PartialEq)]
pub enum NumericalIssue {
    NaN { count: usize },
    Infinity { count: usize },
}

/// Count non-finite entries of an array of any dimension
pub fn scan_values<S, D>(values: &ArrayBase<S, D>) -> Vec<NumericalIssue>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let mut nan_count = 0;
    let mut inf_count = 0;

    for &value in values.iter() {
        if value.is_nan() {
            nan_count += 1;
        } else if value.is_infinite() {
            inf_count += 1;
        }
    }

    let mut issues = Vec::new();
    if nan_count > 0 {
        issues.push(NumericalIssue::NaN { count: nan_count });
    }
    if inf_count > 0 {
        issues.push(NumericalIssue::Infinity { count: inf_count });
    }
    issues
}
