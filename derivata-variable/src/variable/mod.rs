use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use derivata_core::{ShapeError, Value};
use parking_lot::Mutex;

use crate::{
    engine::Engine,
    grad_mode,
    node::{Edge, Node},
    Result,
};

static NEXT_VARIABLE_ID: AtomicUsize = AtomicUsize::new(0);

pub(crate) struct VariableInner {
    id: usize,
    value: Value,
    requires_grad: bool,
    grad_fn: Option<(Arc<Node>, usize)>,
    grad: Mutex<Option<Variable>>,
}

/// A value together with the history needed to differentiate it.
///
/// Variables are cheap to clone: clones share the same value, history and gradient. They can be
/// freely sent across threads.
///
/// A variable is created in one of three ways:
///
/// 1. As a *leaf* that requires grad, with [`Variable::leaf`]. Leaves accumulate the gradients
/// that reach them into their own [`.grad()`](Variable::grad()).
///
/// 2. As a *constant*, with [`Variable::constant`]. Constants never create graph edges.
///
/// 3. As the result of a differentiable operation. The result requires grad when gradient
/// recording is enabled and at least one input requires grad, and it then remembers the node
/// that produced it.
#[derive(Clone)]
pub struct Variable {
    inner: Arc<VariableInner>,
}

impl Variable {
    fn with_parts(value: Value, requires_grad: bool, grad_fn: Option<(Arc<Node>, usize)>) -> Self {
        Self {
            inner: Arc::new(VariableInner {
                id: NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed),
                value,
                requires_grad,
                grad_fn,
                grad: Mutex::new(None),
            }),
        }
    }

    /// Creates a new variable.
    ///
    /// # Arguments
    ///
    /// * `value` - the data of the variable.
    ///
    /// * `requires_grad` - whether gradients should be accumulated into it.
    pub fn new(value: Value, requires_grad: bool) -> Self {
        Self::with_parts(value, requires_grad, None)
    }

    /// Creates a leaf that requires grad.
    pub fn leaf(value: Value) -> Self {
        Self::new(value, true)
    }

    /// Creates a variable that never requires grad.
    pub fn constant(value: Value) -> Self {
        Self::new(value, false)
    }

    /// Creates output number `output` of `node`.
    pub(crate) fn from_node(value: Value, node: Arc<Node>, output: usize) -> Self {
        Self::with_parts(value, true, Some((node, output)))
    }

    pub(crate) fn from_inner(inner: Arc<VariableInner>) -> Self {
        Self { inner }
    }

    /// Process-unique identity of the variable. Clones share it.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Returns a reference to the data inside `self`.
    pub fn value(&self) -> &Value {
        &self.inner.value
    }

    pub fn shape(&self) -> &[usize] {
        self.inner.value.shape()
    }

    pub fn ndim(&self) -> usize {
        self.inner.value.ndim()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.inner.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.value.is_empty()
    }

    /// Returns the scalar contained in a single-element variable.
    pub fn item(&self) -> Result<f64> {
        match self.inner.value.iter().next() {
            Some(&item) if self.len() == 1 => Ok(item),
            _ => Err(ShapeError::ShapeMismatch {
                expected: vec![],
                actual: self.shape().to_vec(),
            }
            .into()),
        }
    }

    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad
    }

    /// Returns `true` if the variable was not produced by a recorded operation.
    pub fn is_leaf(&self) -> bool {
        self.inner.grad_fn.is_none()
    }

    /// The node that produced this variable, if any.
    pub fn grad_fn(&self) -> Option<&Arc<Node>> {
        self.inner.grad_fn.as_ref().map(|(node, _)| node)
    }

    /// Which output of [`grad_fn`](Variable::grad_fn()) this variable is.
    pub fn output_index(&self) -> Option<usize> {
        self.inner.grad_fn.as_ref().map(|(_, output)| *output)
    }

    /// Returns a copy of the accumulated gradient.
    ///
    /// Gradients keep accumulating across backward calls until
    /// [`.zero_grad()`](Variable::zero_grad()) is called.
    pub fn grad(&self) -> Option<Value> {
        self.inner
            .grad
            .lock()
            .as_ref()
            .map(|grad| grad.value().to_owned())
    }

    /// Returns the accumulated gradient as a variable.
    ///
    /// After a backward call with `create_graph` the returned variable carries its own history
    /// and can be differentiated again.
    pub fn grad_variable(&self) -> Option<Variable> {
        self.inner.grad.lock().clone()
    }

    /// Clears the accumulated gradient.
    pub fn zero_grad(&self) {
        *self.inner.grad.lock() = None;
    }

    /// Returns a constant sharing nothing but the data with `self`.
    pub fn detach(&self) -> Variable {
        Self::constant(self.inner.value.clone())
    }

    /// Returns a leaf that requires grad and holds the data of `self`.
    ///
    /// Constants created by the constructors of the root crate are promoted with this method.
    pub fn into_leaf(self) -> Variable {
        if self.requires_grad() && self.is_leaf() {
            return self;
        }

        Self::leaf(self.inner.value.clone())
    }

    /// The edge gradients of this variable flow along, or `None` if it does not require grad.
    pub(crate) fn edge(&self) -> Option<Edge> {
        if !self.inner.requires_grad {
            return None;
        }

        Some(match &self.inner.grad_fn {
            Some((node, output)) => Edge::Node {
                node: Arc::clone(node),
                output: *output,
            },
            None => Edge::Leaf {
                id: self.inner.id,
                variable: Arc::downgrade(&self.inner),
            },
        })
    }

    /// Adds `grad` into the gradient of `self`.
    ///
    /// The stored gradient is replaced with the sum, never mutated in place.
    pub(crate) fn accumulate_grad(&self, grad: Variable) -> Result<()> {
        if grad.shape() != self.shape() {
            return Err(ShapeError::ShapeMismatch {
                expected: self.shape().to_vec(),
                actual: grad.shape().to_vec(),
            }
            .into());
        }

        let mut slot = self.inner.grad.lock();
        let accumulated = match slot.take() {
            Some(previous) => match previous.add(&grad) {
                Ok(sum) => sum,
                Err(error) => {
                    *slot = Some(previous);
                    return Err(error);
                }
            },
            None if grad_mode::is_enabled() => grad,
            None => grad.detach(),
        };
        *slot = Some(accumulated);

        Ok(())
    }

    /// Back-propagates from `self`, accumulating into the gradients of the leaves it depends on.
    ///
    /// # Arguments
    ///
    /// * `seed` - gradient of the final objective with respect to `self`. It can be omitted only
    /// when `self` holds a single element, and defaults to one.
    ///
    /// * `retain_graph` - keeps the saved values of the graph so that it can be traversed again.
    ///
    /// * `create_graph` - records the backward computation itself, so that the resulting
    /// gradients can be differentiated again. It implies `retain_graph`.
    pub fn backward(
        &self,
        seed: Option<Value>,
        retain_graph: bool,
        create_graph: bool,
    ) -> Result<()> {
        Engine::global()?.backward(self, seed, retain_graph, create_graph)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Variable");
        debug
            .field("id", &self.inner.id)
            .field("value", &self.inner.value)
            .field("requires_grad", &self.inner.requires_grad);
        if let Some((node, output)) = &self.inner.grad_fn {
            debug.field("grad_fn", &format_args!("{}#{}[{}]", node.op(), node.id(), output));
        }

        debug.finish()
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.value)
    }
}
