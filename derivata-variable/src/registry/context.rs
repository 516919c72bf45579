use std::sync::Arc;

use derivata_core::Value;
use ndarray::IxDyn;

use crate::{
    node::Node,
    saved::{mismatch, Saved, SavedState},
    AutogradError, Result, Variable,
};

/// Everything a derivative rule can see while it runs.
pub struct BackwardContext<'a> {
    node: &'a Arc<Node>,
    grads: &'a [Option<Variable>],
    saved: &'a SavedState,
    covers: &'a [usize],
    mask: &'a [bool],
}

impl<'a> BackwardContext<'a> {
    pub(crate) fn new(
        node: &'a Arc<Node>,
        grads: &'a [Option<Variable>],
        saved: &'a SavedState,
        covers: &'a [usize],
        mask: &'a [bool],
    ) -> Self {
        Self {
            node,
            grads,
            saved,
            covers,
            mask,
        }
    }

    /// The operation being differentiated.
    pub fn op(&self) -> &str {
        self.node.op()
    }

    /// Gradient of the first output, zero-filled when no gradient reached it.
    pub fn grad(&self) -> Result<Variable> {
        match self.output_grad(0) {
            Some(grad) => Ok(grad.clone()),
            None => {
                let shape = self.output_shape(0)?;
                Ok(Variable::constant(Value::zeros(IxDyn(shape))))
            }
        }
    }

    /// Gradients of all the outputs, `None` where none reached the output.
    pub fn grads(&self) -> &[Option<Variable>] {
        self.grads
    }

    /// Gradient of output number `output`, if any reached it.
    pub fn output_grad(&self, output: usize) -> Option<&Variable> {
        self.grads.get(output).and_then(Option::as_ref)
    }

    pub fn output_shape(&self, output: usize) -> Result<&[usize]> {
        self.node
            .output_shapes()
            .get(output)
            .map(Vec::as_slice)
            .ok_or_else(|| AutogradError::ArityMismatch {
                op: self.op().to_string(),
                what: "outputs",
                expected: output + 1,
                actual: self.node.num_outputs(),
            })
    }

    /// Shape of the differentiable input in position `input`.
    pub fn input_shape(&self, input: usize) -> Result<&[usize]> {
        self.node
            .input_shapes()
            .get(input)
            .map(Vec::as_slice)
            .ok_or_else(|| AutogradError::ArityMismatch {
                op: self.op().to_string(),
                what: "inputs",
                expected: input + 1,
                actual: self.node.input_shapes().len(),
            })
    }

    /// Whether the `i`-th input covered by the running rule needs a gradient.
    ///
    /// Rules that do not take the mask see `true` for every covered input.
    pub fn needs(&self, i: usize) -> bool {
        self.mask.get(i).copied().unwrap_or(false)
    }

    /// The needs of every input covered by the running rule.
    pub fn mask(&self) -> &[bool] {
        self.mask
    }

    /// Positions, among the differentiable inputs, of the inputs covered by the running rule.
    pub fn covers(&self) -> &[usize] {
        self.covers
    }

    /// A saved variable, either an input or one of the operation's outputs.
    pub fn var(&self, name: &str) -> Result<Variable> {
        self.saved.variable(self.node, name)
    }

    /// The saved first output of the operation.
    pub fn result(&self) -> Result<Variable> {
        self.var("result")
    }

    pub fn shape(&self, name: &str) -> Result<&[usize]> {
        match self.saved.get(self.op(), name)? {
            Saved::Shape(shape) => Ok(shape),
            _ => Err(mismatch(self.op(), name)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        match self.saved.get(self.op(), name)? {
            Saved::Int(value) => Ok(*value),
            _ => Err(mismatch(self.op(), name)),
        }
    }

    /// A saved integer that must be non-negative, such as a dimension.
    pub fn usize(&self, name: &str) -> Result<usize> {
        usize::try_from(self.int(name)?).map_err(|_| mismatch(self.op(), name))
    }

    pub fn ints(&self, name: &str) -> Result<&[usize]> {
        match self.saved.get(self.op(), name)? {
            Saved::Ints(values) => Ok(values),
            _ => Err(mismatch(self.op(), name)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64> {
        match self.saved.get(self.op(), name)? {
            Saved::Float(value) => Ok(*value),
            _ => Err(mismatch(self.op(), name)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool> {
        match self.saved.get(self.op(), name)? {
            Saved::Bool(value) => Ok(*value),
            _ => Err(mismatch(self.op(), name)),
        }
    }
}
