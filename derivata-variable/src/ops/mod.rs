//! Differentiable operations.
//!
//! Every operation computes its forward value with a kernel from [`derivata_core::kernels`] and
//! then hands inputs, outputs and saved state to [`record`], which decides whether a graph node
//! is needed.

mod linalg;
mod nn;
mod pointwise;
mod reduction;
mod shape;

use std::sync::Arc;

use derivata_core::Value;
use log::trace;

use crate::{
    grad_mode,
    node::Node,
    registry::{self, Derivatives},
    saved::SavedState,
    AutogradError, Result, Variable,
};

/// Records the application of `op` and wraps its outputs into variables.
///
/// A node is created only when gradient recording is enabled, the operation is not fallthrough
/// and at least one input requires grad. Otherwise every output is a constant.
///
/// # Arguments
///
/// * `op` - registry key of the operation.
///
/// * `inputs` - the differentiable inputs, in signature order.
///
/// * `outputs` - the computed output values.
///
/// * `saved` - values the derivative rules need.
pub fn record(
    op: &str,
    inputs: &[&Variable],
    outputs: Vec<Value>,
    saved: SavedState,
) -> Result<Vec<Variable>> {
    let derivatives = registry::global()?.get(op)?;
    check_arity(op, derivatives, inputs.len(), outputs.len())?;

    let needs_node = grad_mode::is_enabled()
        && !derivatives.is_fallthrough()
        && inputs.iter().any(|input| input.requires_grad());
    if !needs_node {
        return Ok(outputs.into_iter().map(Variable::constant).collect());
    }

    let mut saved = saved;
    saved.bind_outputs(&outputs)?;

    let node = Arc::new(Node::new(
        op.to_string(),
        inputs.iter().map(|input| input.edge()).collect(),
        inputs.iter().map(|input| input.shape().to_vec()).collect(),
        outputs.iter().map(|output| output.shape().to_vec()).collect(),
        saved,
    ));
    trace!("recorded {}#{}", op, node.id());

    Ok(outputs
        .into_iter()
        .enumerate()
        .map(|(output, value)| {
            if derivatives.is_output_differentiable(output) {
                Variable::from_node(value, Arc::clone(&node), output)
            } else {
                Variable::constant(value)
            }
        })
        .collect())
}

/// Saved integers are signed; dimensions and offsets always fit.
pub(crate) fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn check_arity(op: &str, derivatives: &Derivatives, inputs: usize, outputs: usize) -> Result<()> {
    if inputs != derivatives.num_inputs() {
        return Err(AutogradError::ArityMismatch {
            op: op.to_string(),
            what: "inputs",
            expected: derivatives.num_inputs(),
            actual: inputs,
        });
    }

    match derivatives.signature().num_outputs() {
        Some(expected) if expected != outputs => Err(AutogradError::ArityMismatch {
            op: op.to_string(),
            what: "outputs",
            expected,
            actual: outputs,
        }),
        _ => Ok(()),
    }
}

/// Records a single-output operation.
pub(crate) fn record_one(
    op: &str,
    inputs: &[&Variable],
    output: Value,
    saved: SavedState,
) -> Result<Variable> {
    record(op, inputs, vec![output], saved)?
        .pop()
        .ok_or_else(|| AutogradError::ArityMismatch {
            op: op.to_string(),
            what: "outputs",
            expected: 1,
            actual: 0,
        })
}
