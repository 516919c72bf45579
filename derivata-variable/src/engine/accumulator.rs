use std::{collections::HashMap, sync::Arc};

use derivata_core::ShapeError;
use parking_lot::Mutex;

use crate::{node::NodeId, AutogradError, Result, Variable};

/// Gradients flowing into the outputs of one node.
struct InputBuffer {
    grads: Vec<Option<Variable>>,
    shapes: Vec<Vec<usize>>,
    /// The latch: contributions still expected before the node can run.
    pending: usize,
}

impl InputBuffer {
    fn accumulate(&mut self, node: NodeId, slot: usize, grad: Variable) -> Result<()> {
        let shape = self.shapes.get(slot).ok_or_else(|| AutogradError::ArityMismatch {
            op: format!("node {}", node),
            what: "outputs",
            expected: slot + 1,
            actual: self.shapes.len(),
        })?;
        if grad.shape() != shape.as_slice() {
            return Err(ShapeError::ShapeMismatch {
                expected: shape.clone(),
                actual: grad.shape().to_vec(),
            }
            .into());
        }

        self.grads[slot] = Some(match self.grads[slot].take() {
            Some(previous) => previous.add(&grad)?,
            None => grad,
        });

        Ok(())
    }
}

/// Running sums of the gradients reaching every node of one backward call.
///
/// Each buffer carries a latch counting the contributions it still waits for; a node may run
/// only once its latch is zero. Buffers are locked one by one, the map only while looking them up.
#[derive(Default)]
pub struct Accumulator {
    buffers: Mutex<HashMap<NodeId, Arc<Mutex<InputBuffer>>>>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the buffer of a node.
    ///
    /// # Arguments
    ///
    /// * `node` - the node.
    ///
    /// * `shapes` - the shape of every output slot.
    ///
    /// * `contributions` - how many contributions must arrive before the node is ready.
    pub fn expect(&self, node: NodeId, shapes: &[Vec<usize>], contributions: usize) {
        self.buffers.lock().insert(
            node,
            Arc::new(Mutex::new(InputBuffer {
                grads: vec![None; shapes.len()],
                shapes: shapes.to_vec(),
                pending: contributions,
            })),
        );
    }

    fn buffer(&self, node: NodeId) -> Result<Arc<Mutex<InputBuffer>>> {
        self.buffers
            .lock()
            .get(&node)
            .cloned()
            .ok_or(AutogradError::AccumulatorNotReady { node, pending: 0 })
    }

    /// Places a root gradient without touching the latch.
    pub fn seed(&self, node: NodeId, slot: usize, grad: Variable) -> Result<()> {
        self.buffer(node)?.lock().accumulate(node, slot, grad)
    }

    /// Adds one contribution to a slot and counts it as arrived.
    ///
    /// An absent contribution still counts. Returns `true` exactly when the node's latch reaches
    /// zero.
    pub fn add(&self, node: NodeId, slot: usize, grad: Option<Variable>) -> Result<bool> {
        let buffer = self.buffer(node)?;
        let mut buffer = buffer.lock();
        if let Some(grad) = grad {
            buffer.accumulate(node, slot, grad)?;
        }
        buffer.pending = buffer.pending.saturating_sub(1);

        Ok(buffer.pending == 0)
    }

    /// Removes the buffer of a node whose latch reached zero.
    pub fn take(&self, node: NodeId) -> Result<Vec<Option<Variable>>> {
        let mut buffers = self.buffers.lock();
        let pending = match buffers.get(&node) {
            Some(buffer) => buffer.lock().pending,
            None => return Err(AutogradError::AccumulatorNotReady { node, pending: 0 }),
        };
        if pending > 0 {
            return Err(AutogradError::AccumulatorNotReady { node, pending });
        }

        Ok(buffers
            .remove(&node)
            .map(|buffer| std::mem::take(&mut buffer.lock().grads))
            .unwrap_or_default())
    }

    /// Number of contributions a node still waits for.
    pub fn pending(&self, node: NodeId) -> Option<usize> {
        self.buffers
            .lock()
            .get(&node)
            .map(|buffer| buffer.lock().pending)
    }
}

#[cfg(test)]
mod test;
