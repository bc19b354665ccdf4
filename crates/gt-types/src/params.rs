use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places every parameter is rounded to before use.
///
/// Directory and file names are derived from the rounded values, so two
/// proposals that round to the same vector share artifacts.
pub const PARAMETER_PRECISION: usize = 2;

/// Round a raw value to [`PARAMETER_PRECISION`] decimal places.
pub fn round_to_precision(value: f64) -> f64 {
    let scale = 10f64.powi(PARAMETER_PRECISION as i32);
    let rounded = (value * scale).round() / scale;
    // Normalize negative zero so "-0.00" never appears in a signature.
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// An ordered set of named parameters proposed for one trial.
///
/// Values are rounded on construction and the vector is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    values: Vec<(String, f64)>,
}

impl ParameterVector {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(name, value)| (name.into(), round_to_precision(value)))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Deterministic name fragment used for job directories and files,
    /// e.g. `a1_0.50_b1_-0.23`.
    pub fn signature(&self) -> String {
        self.values
            .iter()
            .map(|(name, value)| format!("{name}_{value:.prec$}", prec = PARAMETER_PRECISION))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .values
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        write!(f, "{}", rendered.join(", "))
    }
}
