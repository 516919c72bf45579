use derivata_core::kernels;

use super::{record, record_one, to_i64};
use crate::{saved::SavedState, AutogradError, Result, Variable};

impl Variable {
    /// Returns the sum of all elements in `self`.
    pub fn sum(&self) -> Result<Variable> {
        record_one("sum", &[self], kernels::sum_all(self.value()), SavedState::new())
    }

    /// Sums along `dims`.
    ///
    /// # Arguments
    ///
    /// * `dims` - dimensions to reduce. An empty list reduces every dimension.
    ///
    /// * `keepdim` - keeps the reduced dimensions with size 1.
    pub fn sum_dim(&self, dims: &[usize], keepdim: bool) -> Result<Variable> {
        let value = kernels::sum_dims(self.value(), dims, keepdim)?;
        record_one(
            "sum.dim",
            &[self],
            value,
            SavedState::new().ints("dim", dims).bool("keepdim", keepdim),
        )
    }

    /// Returns the mean of all elements in `self`.
    pub fn mean(&self) -> Result<Variable> {
        let value = kernels::mean_dims(self.value(), &[], false)?;
        record_one("mean", &[self], value, SavedState::new())
    }

    /// Averages along `dims`. An empty list reduces every dimension.
    pub fn mean_dim(&self, dims: &[usize], keepdim: bool) -> Result<Variable> {
        let value = kernels::mean_dims(self.value(), dims, keepdim)?;
        record_one(
            "mean.dim",
            &[self],
            value,
            SavedState::new().ints("dim", dims).bool("keepdim", keepdim),
        )
    }

    /// Maximum along `dim`, returning the values and their indices.
    ///
    /// The indices are never differentiable.
    pub fn max_dim(&self, dim: usize, keepdim: bool) -> Result<(Variable, Variable)> {
        let (values, indices) = kernels::max_dim(self.value(), dim, keepdim)?;
        let saved = SavedState::new()
            .int("dim", to_i64(dim))
            .bool("keepdim", keepdim)
            .output("indices", 1);

        let mut outputs = record("max.dim", &[self], vec![values, indices], saved)?.into_iter();
        match (outputs.next(), outputs.next()) {
            (Some(values), Some(indices)) => Ok((values, indices)),
            _ => Err(AutogradError::ArityMismatch {
                op: String::from("max.dim"),
                what: "outputs",
                expected: 2,
                actual: 0,
            }),
        }
    }

    /// Indices of the maxima along `dim`. Never differentiable.
    pub fn argmax(&self, dim: usize, keepdim: bool) -> Result<Variable> {
        let (_, indices) = kernels::max_dim(self.value(), dim, keepdim)?;
        record_one("argmax", &[self], indices, SavedState::new())
    }

    /// Histogram of the elements into `bins` bins spanning `[min, max]`.
    pub fn histc(&self, bins: usize, min: f64, max: f64) -> Result<Variable> {
        let value = kernels::histc(self.value(), bins, min, max);
        record_one("histc", &[self], value, SavedState::new())
    }
}
