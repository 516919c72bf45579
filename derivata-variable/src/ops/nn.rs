use derivata_core::kernels;

use super::{record_one, to_i64};
use crate::{saved::SavedState, Result, Variable};

impl Variable {
    /// Applies the *softmax* to `self`.
    ///
    /// The *softmax* is applied to all slices along `dim`, and will re-scale them so that the
    /// elements lie in the range *[0, 1]* and sum to 1.0.
    ///
    /// # Arguments
    ///
    /// * `dim` - dimension along which softmax will be computed.
    pub fn softmax(&self, dim: usize) -> Result<Variable> {
        let value = kernels::softmax(self.value(), dim)?;
        record_one(
            "softmax",
            &[self],
            value,
            SavedState::new()
                .output("result", 0)
                .int("dim", to_i64(dim)),
        )
    }

    /// Applies the *log-softmax* to `self`.
    ///
    /// # Arguments
    ///
    /// * `dim` - dimension along which log-softmax will be computed.
    pub fn log_softmax(&self, dim: usize) -> Result<Variable> {
        let value = kernels::log_softmax(self.value(), dim)?;
        record_one(
            "log_softmax",
            &[self],
            value,
            SavedState::new()
                .output("result", 0)
                .int("dim", to_i64(dim)),
        )
    }

    /// Gradient of softmax, with `self` as the upstream gradient and `output` the softmax
    /// result.
    pub fn softmax_backward_data(&self, output: &Variable, dim: usize) -> Result<Variable> {
        let value = kernels::softmax_backward_data(self.value(), output.value(), dim)?;
        record_one(
            "_softmax_backward_data",
            &[self, output],
            value,
            SavedState::new()
                .input("grad_output", self)
                .input("output", output)
                .int("dim", to_i64(dim)),
        )
    }

    /// Gradient of log-softmax, with `self` as the upstream gradient and `output` the
    /// log-softmax result.
    pub fn log_softmax_backward_data(&self, output: &Variable, dim: usize) -> Result<Variable> {
        let value = kernels::log_softmax_backward_data(self.value(), output.value(), dim)?;
        record_one(
            "_log_softmax_backward_data",
            &[self, output],
            value,
            SavedState::new()
                .input("grad_output", self)
                .input("output", output)
                .int("dim", to_i64(dim)),
        )
    }

    /// Gradient of the sigmoid, with `self` as the upstream gradient and `output` the sigmoid
    /// result.
    pub fn sigmoid_backward(&self, output: &Variable) -> Result<Variable> {
        let value = kernels::sigmoid_backward(self.value(), output.value())?;
        record_one(
            "sigmoid_backward",
            &[self, output],
            value,
            SavedState::new()
                .input("grad_output", self)
                .input("output", output),
        )
    }

    /// Gradient of the tanh, with `self` as the upstream gradient and `output` the tanh result.
    pub fn tanh_backward(&self, output: &Variable) -> Result<Variable> {
        let value = kernels::tanh_backward(self.value(), output.value())?;
        record_one(
            "tanh_backward",
            &[self, output],
            value,
            SavedState::new()
                .input("grad_output", self)
                .input("output", output),
        )
    }
}
