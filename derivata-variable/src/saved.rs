use std::sync::Arc;

use derivata_core::Value;

use crate::{node::Node, AutogradError, Result, Variable};

/// One value an operation stores for its backward pass.
#[derive(Debug, Clone)]
pub(crate) enum Saved {
    /// An input, held strongly.
    Variable(Variable),
    /// One of the operation's own outputs. Only the data is kept; the differentiable handle is
    /// rebuilt from the node when the entry is read.
    Output { value: Value, output: usize },
    /// An output whose value is not known yet, bound when the node is recorded.
    PendingOutput(usize),
    Shape(Vec<usize>),
    Int(i64),
    Ints(Vec<usize>),
    Float(f64),
    Bool(bool),
    /// A tensor freed by a backward pass that did not retain the graph.
    Released,
}

/// Named values an operation stores for its backward pass.
///
/// Built with a chain of calls, one per entry:
///
/// ```
/// # use derivata_variable::{SavedState, Variable};
/// # let x = Variable::leaf(ndarray::arr1(&[1., 2.]).into_dyn());
/// let saved = SavedState::new()
///     .input("self", &x)
///     .output("result", 0)
///     .shape("self_sizes", x.shape());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SavedState {
    entries: Vec<(&'static str, Saved)>,
}

impl SavedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(mut self, name: &'static str, saved: Saved) -> Self {
        self.entries.push((name, saved));
        self
    }

    /// Saves an input variable.
    pub fn input(self, name: &'static str, variable: &Variable) -> Self {
        self.with(name, Saved::Variable(variable.clone()))
    }

    /// Saves output number `output` of the operation being recorded.
    pub fn output(self, name: &'static str, output: usize) -> Self {
        self.with(name, Saved::PendingOutput(output))
    }

    pub fn shape(self, name: &'static str, shape: &[usize]) -> Self {
        self.with(name, Saved::Shape(shape.to_vec()))
    }

    pub fn int(self, name: &'static str, value: i64) -> Self {
        self.with(name, Saved::Int(value))
    }

    pub fn ints(self, name: &'static str, values: &[usize]) -> Self {
        self.with(name, Saved::Ints(values.to_vec()))
    }

    pub fn float(self, name: &'static str, value: f64) -> Self {
        self.with(name, Saved::Float(value))
    }

    pub fn bool(self, name: &'static str, value: bool) -> Self {
        self.with(name, Saved::Bool(value))
    }

    /// Binds every pending output entry to the values just computed.
    pub(crate) fn bind_outputs(&mut self, outputs: &[Value]) -> Result<()> {
        for (_, saved) in self.entries.iter_mut() {
            if let Saved::PendingOutput(output) = *saved {
                let value = outputs.get(output).ok_or(AutogradError::ArityMismatch {
                    op: String::from("saved output"),
                    what: "outputs",
                    expected: output + 1,
                    actual: outputs.len(),
                })?;
                *saved = Saved::Output {
                    value: value.clone(),
                    output,
                };
            }
        }

        Ok(())
    }

    /// Frees the saved tensors, keeping the scalar metadata.
    pub(crate) fn released(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(name, saved)| match saved {
                Saved::Variable(_) | Saved::Output { .. } | Saved::PendingOutput(_) => {
                    (*name, Saved::Released)
                }
                other => (*name, other.clone()),
            })
            .collect();

        Self { entries }
    }

    pub(crate) fn get(&self, op: &str, name: &str) -> Result<&Saved> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, saved)| saved)
            .ok_or_else(|| AutogradError::MissingSavedState {
                op: op.to_string(),
                name: name.to_string(),
            })
    }

    /// Reads a saved variable, re-attaching saved outputs to `node`.
    pub(crate) fn variable(&self, node: &Arc<Node>, name: &str) -> Result<Variable> {
        match self.get(node.op(), name)? {
            Saved::Variable(variable) => Ok(variable.clone()),
            Saved::Output { value, output } => {
                Ok(Variable::from_node(value.clone(), Arc::clone(node), *output))
            }
            Saved::Released => Err(AutogradError::GraphReleased {
                op: node.op().to_string(),
            }),
            _ => Err(mismatch(node.op(), name)),
        }
    }
}

pub(crate) fn mismatch(op: &str, name: &str) -> AutogradError {
    AutogradError::MissingSavedState {
        op: op.to_string(),
        name: name.to_string(),
    }
}
