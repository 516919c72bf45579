//! Numeric foundations of derivata.
//!
//! This crate owns the dense value type every variable wraps, the forward kernels operations are
//! computed with, and the shape helpers gradient formulas use to undo broadcasting, narrowing and
//! permuting.

mod error;

pub mod kernels;
pub mod shape;

pub use error::ShapeError;

/// Dense n-dimensional value held by every variable.
pub type Value = ndarray::ArrayD<f64>;

/// Tolerance used when comparing values in tests.
#[cfg(test)]
pub(crate) const EPSILON: f64 = 1e-9;

#[cfg(test)]
pub(crate) fn are_similar(
    result: &Value,
    expected: &Value,
) -> Result<(), Box<dyn std::error::Error>> {
    use approx::AbsDiffEq;

    if result.shape() != expected.shape() || !AbsDiffEq::abs_diff_eq(result, expected, EPSILON) {
        return Err(format!("Result: {} | Expected: {}", result, expected).into());
    }

    Ok(())
}
