//! Comparison of returned tensors against expected values.
//!
//! Validators never fail: they return a `Validation` whose report shows the
//! actual and expected values, and the caller decides what a mismatch means.

use crate::InferResult;
use infer_base::{DType, Tensor};
use std::fmt;

// Mismatching indices kept in the report.
const MAX_REPORTED_INDICES: usize = 10;
// Values printed per side in the report.
const MAX_REPORTED_VALUES: usize = 32;

/// Closeness bound `|actual - expected| <= atol + rtol * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 1e-8,
        }
    }
}

impl Tolerance {
    pub fn new(rtol: f64, atol: f64) -> Self {
        Self { rtol, atol }
    }

    /// NaN is never close to anything; equal infinities are.
    pub fn is_close(&self, actual: f64, expected: f64) -> bool {
        if actual.is_nan() || expected.is_nan() {
            return false;
        }
        if actual == expected {
            return true;
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    MissingOutput(String),
    Dtype { actual: DType, expected: DType },
    Shape { actual: Vec<usize>, expected: Vec<usize> },
    /// `count` elements differ; `indices` holds the first few of them.
    Values { count: usize, indices: Vec<usize> },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::MissingOutput(name) => write!(f, "output \"{name}\" missing from result"),
            Mismatch::Dtype { actual, expected } => {
                write!(f, "dtype {actual}, expected {expected}")
            }
            Mismatch::Shape { actual, expected } => {
                write!(f, "shape {actual:?}, expected {expected:?}")
            }
            Mismatch::Values { count, indices } => {
                write!(f, "{count} elements differ, first at {indices:?}")
            }
        }
    }
}

/// Outcome of one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    name: String,
    mismatch: Option<Mismatch>,
    report: String,
}

impl Validation {
    fn new(name: &str, mismatch: Option<Mismatch>, actual: Option<&Tensor>, expected: &Tensor) -> Self {
        let mut report = match &mismatch {
            None => format!("{name}: match ({} elements)", expected.element_count()),
            Some(mismatch) => format!("{name}: {mismatch}"),
        };
        if mismatch.is_some() {
            if let Some(actual) = actual {
                report.push_str(&format!("\n  actual:   {}", preview(actual)));
            }
            report.push_str(&format!("\n  expected: {}", preview(expected)));
        }
        Self {
            name: name.to_string(),
            mismatch,
            report,
        }
    }

    pub fn passed(&self) -> bool {
        self.mismatch.is_none()
    }

    /// Name of the compared output.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mismatch(&self) -> Option<&Mismatch> {
        self.mismatch.as_ref()
    }

    pub fn report(&self) -> &str {
        &self.report
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.report)
    }
}

/// Same dtype, same shape, bit-identical elements.
pub fn validate_exact(actual: &Tensor, expected: &Tensor) -> Validation {
    let mismatch = if actual.dtype() != expected.dtype() {
        Some(Mismatch::Dtype {
            actual: actual.dtype(),
            expected: expected.dtype(),
        })
    } else if actual.shape() != expected.shape() {
        Some(shape_mismatch(actual, expected))
    } else {
        let width = actual.dtype().byte_size();
        let differing = actual
            .data()
            .chunks_exact(width)
            .zip(expected.data().chunks_exact(width))
            .enumerate()
            .filter(|(_, (a, e))| a != e)
            .map(|(i, _)| i);
        values_mismatch(differing)
    };
    Validation::new(actual.name(), mismatch, Some(actual), expected)
}

/// Same shape and every element within `tolerance`. Elements are compared
/// as `f64`, so the dtypes may differ.
pub fn validate_approx(actual: &Tensor, expected: &Tensor, tolerance: Tolerance) -> Validation {
    let mismatch = if actual.shape() != expected.shape() {
        Some(shape_mismatch(actual, expected))
    } else {
        let expected_values = expected.to_f64_vec();
        let actual_values = actual.to_f64_vec();
        let differing = actual_values
            .iter()
            .zip(&expected_values)
            .enumerate()
            .filter(|(_, (a, e))| !tolerance.is_close(**a, **e))
            .map(|(i, _)| i);
        values_mismatch(differing)
    };
    Validation::new(actual.name(), mismatch, Some(actual), expected)
}

/// `validate_exact` on output `name`; an absent output fails the validation.
pub fn validate_output_exact(result: &InferResult, name: &str, expected: &Tensor) -> Validation {
    match result.output(name) {
        Ok(actual) => validate_exact(actual, expected),
        Err(_) => missing(name, expected),
    }
}

/// `validate_approx` on output `name`; an absent output fails the validation.
pub fn validate_output_approx(
    result: &InferResult,
    name: &str,
    expected: &Tensor,
    tolerance: Tolerance,
) -> Validation {
    match result.output(name) {
        Ok(actual) => validate_approx(actual, expected, tolerance),
        Err(_) => missing(name, expected),
    }
}

fn missing(name: &str, expected: &Tensor) -> Validation {
    Validation::new(
        name,
        Some(Mismatch::MissingOutput(name.to_string())),
        None,
        expected,
    )
}

fn shape_mismatch(actual: &Tensor, expected: &Tensor) -> Mismatch {
    Mismatch::Shape {
        actual: actual.shape().to_vec(),
        expected: expected.shape().to_vec(),
    }
}

fn values_mismatch(differing: impl Iterator<Item = usize>) -> Option<Mismatch> {
    let mut count = 0;
    let mut indices = Vec::new();
    for index in differing {
        count += 1;
        if indices.len() < MAX_REPORTED_INDICES {
            indices.push(index);
        }
    }
    (count > 0).then_some(Mismatch::Values { count, indices })
}

fn preview(tensor: &Tensor) -> String {
    let elements = tensor.format_elements();
    let shown = elements.len().min(MAX_REPORTED_VALUES);
    let mut out = format!("{} {:?} [{}", tensor.dtype(), tensor.shape(), elements[..shown].join(", "));
    if elements.len() > shown {
        out.push_str(&format!(", ... {} more", elements.len() - shown));
    }
    out.push(']');
    out
}
