//! Reverse-mode traversal of recorded graphs.
//!
//! A backward call discovers the nodes reachable from its roots, counts for each one how many
//! gradient contributions it will receive and then runs them in waves: a node joins a wave only
//! once all its contributions arrived. Nodes of the same wave are independent and, when
//! parallelism is on, run on the `rayon` thread pool.

mod accumulator;

use std::{
    collections::{HashMap, HashSet},
    env,
    sync::Arc,
};

use derivata_core::{ShapeError, Value};
use log::{debug, trace};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::{
    grad_mode,
    node::{Edge, Node, NodeId},
    registry::{self, is_truthy, BackwardContext, DerivativeKind, Registry, RuleKind},
    AutogradError, Result, Variable,
};

pub use accumulator::Accumulator;

/// Environment variable that turns on parallel execution of independent nodes by default.
pub const PARALLEL_BACKWARD_ENV: &str = "DERIVATA_PARALLEL_BACKWARD";

/// Inputs whose gradients a functional backward call returns, by position.
#[derive(Default)]
struct Targets {
    leaves: HashMap<usize, Vec<usize>>,
    slots: HashMap<(NodeId, usize), Vec<usize>>,
    count: usize,
}

impl Targets {
    fn new(inputs: &[Variable]) -> Self {
        let mut targets = Self {
            count: inputs.len(),
            ..Self::default()
        };
        for (position, input) in inputs.iter().enumerate() {
            match (input.grad_fn(), input.output_index()) {
                (Some(node), Some(output)) => targets
                    .slots
                    .entry((node.id(), output))
                    .or_default()
                    .push(position),
                _ => targets.leaves.entry(input.id()).or_default().push(position),
            }
        }

        targets
    }
}

/// State shared by every worker of one backward call.
struct GraphTask<'a> {
    registry: &'a Registry,
    accumulator: Accumulator,
    needed: HashSet<NodeId>,
    targets: Option<&'a Targets>,
    captured: Mutex<Vec<Option<Variable>>>,
    retain_graph: bool,
    create_graph: bool,
}

impl<'a> GraphTask<'a> {
    /// Whether the gradient flowing along `edge` is used by this call.
    fn wants(&self, edge: &Option<Edge>) -> bool {
        match (edge, self.targets) {
            (None, _) => false,
            (Some(Edge::Node { node, .. }), _) => self.needed.contains(&node.id()),
            (Some(Edge::Leaf { id, .. }), Some(targets)) => targets.leaves.contains_key(id),
            (Some(edge @ Edge::Leaf { .. }), None) => edge.leaf().is_some(),
        }
    }

    fn capture(&self, positions: &[usize], grad: &Variable) -> Result<()> {
        let mut captured = self.captured.lock();
        for &position in positions {
            let sum = match captured[position].take() {
                Some(previous) => previous.add(grad)?,
                None => grad.clone(),
            };
            captured[position] = Some(sum);
        }

        Ok(())
    }

    /// Hands a gradient to a leaf: captured if requested, accumulated otherwise.
    fn deliver(&self, id: usize, leaf: Option<Variable>, grad: Variable) -> Result<()> {
        match self.targets {
            Some(targets) => match targets.leaves.get(&id) {
                Some(positions) => self.capture(positions, &grad),
                None => Ok(()),
            },
            None => match leaf {
                Some(leaf) => {
                    trace!("accumulating into leaf {}", id);
                    leaf.accumulate_grad(grad)
                }
                None => Ok(()),
            },
        }
    }

    /// Runs the rules of `node` and routes their results, returning the nodes that became ready.
    fn evaluate(&self, node: &Arc<Node>) -> Result<Vec<Arc<Node>>> {
        let _mode = grad_mode::set_grad_enabled(self.create_graph);
        trace!("running {}#{}", node.op(), node.id());

        let grads = self.accumulator.take(node.id())?;
        if let Some(targets) = self.targets {
            for (output, grad) in grads.iter().enumerate() {
                let positions = targets.slots.get(&(node.id(), output));
                if let (Some(positions), Some(grad)) = (positions, grad) {
                    self.capture(positions, grad)?;
                }
            }
        }

        let mask: Vec<bool> = node.edges().iter().map(|edge| self.wants(edge)).collect();
        let mut results: Vec<Option<Variable>> = vec![None; mask.len()];
        if grads.iter().any(Option::is_some) && mask.contains(&true) {
            self.apply(node, &grads, &mask, &mut results)?;
        }
        // A recorded backward pass reaches back into the saved state of this graph.
        if !self.retain_graph && !self.create_graph {
            node.release();
        }

        let mut ready = Vec::new();
        for (edge, grad) in node.edges().iter().zip(results) {
            match edge {
                Some(Edge::Node { node: next, output }) if self.needed.contains(&next.id()) => {
                    if self.accumulator.add(next.id(), *output, grad)? {
                        ready.push(Arc::clone(next));
                    }
                }
                Some(edge @ Edge::Leaf { id, .. }) => {
                    if let Some(grad) = grad {
                        self.deliver(*id, edge.leaf(), grad)?;
                    }
                }
                _ => {}
            }
        }

        Ok(ready)
    }

    fn apply(
        &self,
        node: &Arc<Node>,
        grads: &[Option<Variable>],
        mask: &[bool],
        results: &mut [Option<Variable>],
    ) -> Result<()> {
        let rules = match self.registry.get(node.op())?.kind() {
            DerivativeKind::Rules(rules) => rules,
            DerivativeKind::Fallthrough => return Ok(()),
            DerivativeKind::NotImplemented(op) => {
                return Err(AutogradError::NotImplementedGradient { op: op.clone() })
            }
        };

        let saved = node.saved();
        for rule in rules {
            let rule_mask: Vec<bool> = rule
                .covers()
                .iter()
                .map(|&input| mask.get(input).copied().unwrap_or(false))
                .collect();
            if !rule_mask.contains(&true) {
                continue;
            }

            let (function, requires_mask) = match rule.kind() {
                RuleKind::Formula {
                    function,
                    requires_mask,
                } => (function, *requires_mask),
                RuleKind::NotImplemented(op) => {
                    return Err(AutogradError::NotImplementedGradient { op: op.clone() })
                }
            };

            // Formulas that ignore the mask compute every covered input.
            let full_mask = vec![true; rule_mask.len()];
            let ctx_mask = if requires_mask { &rule_mask } else { &full_mask };
            let ctx = BackwardContext::new(node, grads, &saved, rule.covers(), ctx_mask);
            let output = function(&ctx)?;
            if output.len() != rule.covers().len() {
                return Err(AutogradError::InvalidRuleOutput {
                    op: node.op().to_string(),
                    expected: rule.covers().len(),
                    actual: output.len(),
                });
            }

            for ((&input, grad), &wanted) in rule.covers().iter().zip(output).zip(&rule_mask) {
                if wanted {
                    results[input] = grad;
                }
            }
        }

        Ok(())
    }
}

/// Nodes reachable from `roots`, ordered so that every node precedes the nodes it feeds
/// gradients to.
fn discover(roots: &[Arc<Node>]) -> Vec<Arc<Node>> {
    let mut nodes: HashMap<NodeId, Arc<Node>> = HashMap::new();
    let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
    let mut stack: Vec<Arc<Node>> = roots.to_vec();
    while let Some(node) = stack.pop() {
        if nodes.contains_key(&node.id()) {
            continue;
        }
        for edge in node.edges().iter().flatten() {
            if let Edge::Node { node: next, .. } = edge {
                *in_degree.entry(next.id()).or_insert(0) += 1;
                if !nodes.contains_key(&next.id()) {
                    stack.push(Arc::clone(next));
                }
            }
        }
        nodes.insert(node.id(), node);
    }

    let mut queue: Vec<Arc<Node>> = nodes
        .values()
        .filter(|node| !in_degree.contains_key(&node.id()))
        .cloned()
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = queue.pop() {
        for edge in node.edges().iter().flatten() {
            if let Edge::Node { node: next, .. } = edge {
                if let Some(count) = in_degree.get_mut(&next.id()) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push(Arc::clone(next));
                    }
                }
            }
        }
        order.push(node);
    }

    order
}

/// Nodes whose execution contributes to a requested gradient.
fn prune(order: &[Arc<Node>], targets: &Targets) -> HashSet<NodeId> {
    let mut needed = HashSet::new();
    for node in order.iter().rev() {
        let is_target = (0..node.num_outputs())
            .any(|output| targets.slots.contains_key(&(node.id(), output)));
        let leads_to_target = node.edges().iter().flatten().any(|edge| match edge {
            Edge::Node { node: next, .. } => needed.contains(&next.id()),
            Edge::Leaf { id, .. } => targets.leaves.contains_key(id),
        });
        if is_target || leads_to_target {
            needed.insert(node.id());
        }
    }

    needed
}

/// Checks a root and returns its seed gradient.
fn root_seed(root: &Variable, seed: Option<Value>) -> Result<Value> {
    if !root.requires_grad() {
        return Err(AutogradError::RootDoesNotRequireGrad);
    }

    match seed {
        Some(seed) if seed.shape() != root.shape() => Err(ShapeError::ShapeMismatch {
            expected: root.shape().to_vec(),
            actual: seed.shape().to_vec(),
        }
        .into()),
        Some(seed) => Ok(seed),
        None if root.len() == 1 => Ok(Value::ones(root.value().raw_dim())),
        None => Err(AutogradError::ImplicitSeedRequiresScalar {
            shape: root.shape().to_vec(),
        }),
    }
}

/// Executes backward passes against a registry.
#[derive(Clone, Copy)]
pub struct Engine<'r> {
    registry: &'r Registry,
    parallel: bool,
}

impl<'r> Engine<'r> {
    /// Creates an engine. Parallelism defaults to the value of `DERIVATA_PARALLEL_BACKWARD`.
    pub fn new(registry: &'r Registry) -> Self {
        let parallel = env::var(PARALLEL_BACKWARD_ENV)
            .map(|value| is_truthy(&value))
            .unwrap_or(false);

        Self { registry, parallel }
    }

    /// Runs independent nodes on the `rayon` thread pool when `parallel` is `true`.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// Back-propagates from `root` into the gradients of the leaves it depends on.
    ///
    /// # Arguments
    ///
    /// * `root` - the variable to differentiate.
    ///
    /// * `seed` - gradient with respect to `root`; implicitly one for single-element roots.
    ///
    /// * `retain_graph` - keeps the saved values so that the graph can be traversed again.
    ///
    /// * `create_graph` - records the backward computation, enabling higher order gradients. The
    /// recorded gradients depend on the saved values, which are then kept as with `retain_graph`.
    pub fn backward(
        &self,
        root: &Variable,
        seed: Option<Value>,
        retain_graph: bool,
        create_graph: bool,
    ) -> Result<()> {
        let seed = root_seed(root, seed)?;
        self.execute(&[(root.clone(), seed)], None, retain_graph, create_graph)?;

        Ok(())
    }

    /// Computes the gradients of `outputs` with respect to `inputs`, leaving every `.grad()`
    /// untouched.
    ///
    /// # Arguments
    ///
    /// * `outputs` - the variables to differentiate.
    ///
    /// * `inputs` - the variables to differentiate with respect to; leaves or intermediate
    /// results.
    ///
    /// * `grad_outputs` - one optional seed per output. An empty slice seeds every output
    /// implicitly.
    ///
    /// * `retain_graph` - keeps the saved values so that the graph can be traversed again.
    ///
    /// * `create_graph` - records the backward computation, enabling higher order gradients.
    ///
    /// The result holds one entry per input, `None` for inputs the outputs do not depend on.
    pub fn grad(
        &self,
        outputs: &[Variable],
        inputs: &[Variable],
        grad_outputs: &[Option<Value>],
        retain_graph: bool,
        create_graph: bool,
    ) -> Result<Vec<Option<Variable>>> {
        if !grad_outputs.is_empty() && grad_outputs.len() != outputs.len() {
            return Err(AutogradError::ArityMismatch {
                op: String::from("grad"),
                what: "grad_outputs",
                expected: outputs.len(),
                actual: grad_outputs.len(),
            });
        }

        let roots = outputs
            .iter()
            .enumerate()
            .map(|(i, output)| {
                let seed = grad_outputs.get(i).cloned().flatten();
                Ok((output.clone(), root_seed(output, seed)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let targets = Targets::new(inputs);
        self.execute(&roots, Some(&targets), retain_graph, create_graph)
    }

    fn execute(
        &self,
        roots: &[(Variable, Value)],
        targets: Option<&Targets>,
        retain_graph: bool,
        create_graph: bool,
    ) -> Result<Vec<Option<Variable>>> {
        let _mode = grad_mode::set_grad_enabled(create_graph);

        let root_nodes: Vec<Arc<Node>> = roots
            .iter()
            .filter_map(|(root, _)| root.grad_fn().cloned())
            .collect();
        let order = discover(&root_nodes);
        let needed = match targets {
            Some(targets) => prune(&order, targets),
            None => order.iter().map(|node| node.id()).collect(),
        };

        let task = GraphTask {
            registry: self.registry,
            accumulator: Accumulator::new(),
            needed,
            targets,
            captured: Mutex::new(vec![None; targets.map_or(0, |targets| targets.count)]),
            retain_graph,
            create_graph,
        };

        let mut dependencies: HashMap<NodeId, usize> =
            task.needed.iter().map(|&id| (id, 0)).collect();
        for node in order.iter().filter(|node| task.needed.contains(&node.id())) {
            for edge in node.edges().iter().flatten() {
                if let Edge::Node { node: next, .. } = edge {
                    if let Some(count) = dependencies.get_mut(&next.id()) {
                        *count += 1;
                    }
                }
            }
        }
        for node in order.iter().filter(|node| task.needed.contains(&node.id())) {
            task.accumulator
                .expect(node.id(), node.output_shapes(), dependencies[&node.id()]);
        }

        for (root, seed) in roots {
            let seed = Variable::constant(seed.clone());
            match (root.grad_fn(), root.output_index()) {
                (Some(node), Some(output)) => {
                    if task.needed.contains(&node.id()) {
                        task.accumulator.seed(node.id(), output, seed)?;
                    }
                }
                _ => task.deliver(root.id(), Some(root.clone()), seed)?,
            }
        }

        debug!(
            "backward over {} nodes ({} needed), retain_graph = {}, create_graph = {}",
            order.len(),
            task.needed.len(),
            retain_graph,
            create_graph
        );

        let mut wave: Vec<Arc<Node>> = order
            .iter()
            .filter(|node| task.needed.contains(&node.id()) && dependencies[&node.id()] == 0)
            .cloned()
            .collect();
        let mut executed = 0;
        while !wave.is_empty() {
            executed += wave.len();
            let next: Vec<Vec<Arc<Node>>> = if self.parallel && wave.len() > 1 {
                wave.par_iter()
                    .map(|node| task.evaluate(node))
                    .collect::<Result<_>>()?
            } else {
                wave.iter()
                    .map(|node| task.evaluate(node))
                    .collect::<Result<_>>()?
            };
            wave = next.into_iter().flatten().collect();
        }

        debug!("backward done, {} nodes executed", executed);

        Ok(task.captured.into_inner())
    }
}

impl Engine<'static> {
    /// An engine bound to the process-wide registry.
    pub fn global() -> Result<Self> {
        Ok(Self::new(registry::global()?))
    }
}

/// Back-propagates from `root` with the global engine. See [`Engine::backward`].
pub fn backward(
    root: &Variable,
    seed: Option<Value>,
    retain_graph: bool,
    create_graph: bool,
) -> Result<()> {
    Engine::global()?.backward(root, seed, retain_graph, create_graph)
}

/// Computes gradients with the global engine. See [`Engine::grad`].
pub fn grad(
    outputs: &[Variable],
    inputs: &[Variable],
    grad_outputs: &[Option<Value>],
    retain_graph: bool,
    create_graph: bool,
) -> Result<Vec<Option<Variable>>> {
    Engine::global()?.grad(outputs, inputs, grad_outputs, retain_graph, create_graph)
}

#[cfg(test)]
mod test;
