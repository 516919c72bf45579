use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;

use crate::{
    saved::SavedState,
    variable::{Variable, VariableInner},
};

/// Identifier of a graph node, unique within the process.
pub type NodeId = usize;

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(0);

/// Where the gradient of one differentiable input flows.
#[derive(Clone)]
pub(crate) enum Edge {
    /// Output `output` of an upstream node.
    Node { node: Arc<Node>, output: usize },
    /// A leaf variable. It is referenced weakly, so a dropped leaf simply stops receiving
    /// gradients.
    Leaf {
        id: usize,
        variable: Weak<VariableInner>,
    },
}

impl Edge {
    /// Resolves a leaf edge to its variable, if it is still alive.
    pub(crate) fn leaf(&self) -> Option<Variable> {
        match self {
            Self::Leaf { variable, .. } => variable.upgrade().map(Variable::from_inner),
            Self::Node { .. } => None,
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node { node, output } => write!(f, "Node({}#{}, {})", node.op, node.id, output),
            Self::Leaf { id, .. } => write!(f, "Leaf({})", id),
        }
    }
}

/// A recorded operation of the computational graph.
///
/// A node remembers which operation produced its outputs, where the gradients of its inputs
/// must flow and the values its derivative rules need.
pub struct Node {
    id: NodeId,
    op: String,
    edges: Vec<Option<Edge>>,
    input_shapes: Vec<Vec<usize>>,
    output_shapes: Vec<Vec<usize>>,
    saved: Mutex<Arc<SavedState>>,
}

impl Node {
    pub(crate) fn new(
        op: String,
        edges: Vec<Option<Edge>>,
        input_shapes: Vec<Vec<usize>>,
        output_shapes: Vec<Vec<usize>>,
        saved: SavedState,
    ) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            op,
            edges,
            input_shapes,
            output_shapes,
            saved: Mutex::new(Arc::new(saved)),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The registry key of the operation, e.g. `sum.dim`.
    pub fn op(&self) -> &str {
        &self.op
    }

    /// One entry per differentiable input, `None` for inputs that do not require grad.
    pub(crate) fn edges(&self) -> &[Option<Edge>] {
        &self.edges
    }

    pub fn input_shapes(&self) -> &[Vec<usize>] {
        &self.input_shapes
    }

    pub fn output_shapes(&self) -> &[Vec<usize>] {
        &self.output_shapes
    }

    pub fn num_outputs(&self) -> usize {
        self.output_shapes.len()
    }

    pub(crate) fn saved(&self) -> Arc<SavedState> {
        Arc::clone(&self.saved.lock())
    }

    /// Frees the saved tensors of this node.
    pub(crate) fn release(&self) {
        let mut saved = self.saved.lock();
        *saved = Arc::new(saved.released());
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("op", &self.op)
            .field("edges", &self.edges)
            .field("output_shapes", &self.output_shapes)
            .finish()
    }
}
