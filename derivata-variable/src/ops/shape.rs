use derivata_core::{kernels, shape};

use super::{record, record_one, to_i64};
use crate::{saved::SavedState, Result, Variable};

impl Variable {
    /// Reshapes `self` to `shape`, reading the elements in row-major order.
    pub fn reshape(&self, shape: &[usize]) -> Result<Variable> {
        let value = kernels::reshape(self.value(), shape)?;
        record_one("reshape", &[self], value, SavedState::new())
    }

    /// Broadcasts `self` to `shape`.
    pub fn expand(&self, shape: &[usize]) -> Result<Variable> {
        if self.shape() == shape {
            return Ok(self.clone());
        }

        let value = kernels::expand(self.value(), shape)?;
        record_one("expand", &[self], value, SavedState::new())
    }

    /// Sums `self` down to `sizes`, undoing a broadcast to the shape of `self`.
    pub fn sum_to_size(&self, sizes: &[usize]) -> Result<Variable> {
        if self.shape() == sizes {
            return Ok(self.clone());
        }

        let value = shape::sum_to(self.value(), sizes)?;
        record_one("sum_to_size", &[self], value, SavedState::new())
    }

    /// Removes dimension `dim` if its size is 1.
    pub fn squeeze_dim(&self, dim: usize) -> Result<Variable> {
        let value = kernels::squeeze_dim(self.value(), dim)?;
        record_one(
            "squeeze.dim",
            &[self],
            value,
            SavedState::new().int("dim", to_i64(dim)),
        )
    }

    /// Inserts a dimension of size 1 at position `dim`.
    pub fn unsqueeze(&self, dim: usize) -> Result<Variable> {
        let value = kernels::unsqueeze(self.value(), dim)?;
        record_one(
            "unsqueeze",
            &[self],
            value,
            SavedState::new().int("dim", to_i64(dim)),
        )
    }

    /// Restricts dimension `dim` to the window `start..start + length`.
    pub fn narrow(&self, dim: usize, start: usize, length: usize) -> Result<Variable> {
        let value = kernels::narrow(self.value(), dim, start, length)?;
        record_one(
            "narrow",
            &[self],
            value,
            SavedState::new()
                .int("dim", to_i64(dim))
                .int("start", to_i64(start)),
        )
    }

    /// Places `self` at offset `start` of a zero variable whose dimension `dim` has length
    /// `full_len`. This is the inverse of [`narrow`](Variable::narrow()).
    pub fn un_narrow(&self, dim: usize, start: usize, full_len: usize) -> Result<Variable> {
        let value = shape::un_narrow(self.value(), dim, start, full_len)?;
        record_one(
            "un_narrow",
            &[self],
            value,
            SavedState::new()
                .int("dim", to_i64(dim))
                .int("start", to_i64(start)),
        )
    }

    /// Swaps dimensions `dim0` and `dim1`.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Variable> {
        let value = kernels::transpose(self.value(), dim0, dim1)?;
        record_one(
            "transpose",
            &[self],
            value,
            SavedState::new()
                .int("dim0", to_i64(dim0))
                .int("dim1", to_i64(dim1)),
        )
    }

    /// Transposes a matrix.
    pub fn t(&self) -> Result<Variable> {
        self.transpose(0, 1)
    }

    /// Reorders the dimensions of `self`.
    ///
    /// Dimension `i` of the result is dimension `dims[i]` of `self`.
    pub fn permute(&self, dims: &[usize]) -> Result<Variable> {
        let value = kernels::permute(self.value(), dims)?;
        record_one(
            "permute",
            &[self],
            value,
            SavedState::new().ints("dims", dims),
        )
    }

    /// Splits dimension `dim` into `chunks` pieces.
    ///
    /// Every piece has the same length except possibly the last; fewer pieces are returned when
    /// the dimension is too short.
    pub fn chunk(&self, chunks: usize, dim: usize) -> Result<Vec<Variable>> {
        let values = kernels::chunk(self.value(), chunks, dim)?;
        record(
            "chunk",
            &[self],
            values,
            SavedState::new().int("dim", to_i64(dim)),
        )
    }
}
