use derivata_core::kernels;

use super::record_one;
use crate::{saved::SavedState, Result, Variable};

impl Variable {
    /// Performs a matrix multiplication between the matrix variables `self` and `mat2`. If `self`
    /// is *(n, m)* and `mat2` is *(m, o)* the output will be *(n, o)*.
    pub fn mm(&self, mat2: &Variable) -> Result<Variable> {
        let value = kernels::matmul(self.value(), mat2.value())?;
        record_one(
            "mm",
            &[self, mat2],
            value,
            SavedState::new().input("self", self).input("mat2", mat2),
        )
    }
}
