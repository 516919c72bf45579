use derivata_core::ShapeError;
use thiserror::Error;

/// Result type of every fallible autograd operation.
pub type Result<T> = std::result::Result<T, AutogradError>;

/// Failures of registry construction, graph recording and back-propagation.
#[derive(Debug, Clone, Error)]
pub enum AutogradError {
    /// A differentiable input of an operation has no rule covering it.
    #[error("input `{input}` of `{op}` is not covered by any derivative rule")]
    UncoveredInput { op: String, input: String },

    /// An input is covered by more than one rule.
    #[error("input `{input}` of `{op}` is covered by more than one derivative rule")]
    AmbiguousCoverage { op: String, input: String },

    /// A rule names something that is not a differentiable input.
    #[error("`{input}` is not a differentiable input of `{op}`")]
    UnknownInput { op: String, input: String },

    /// The same operation key is declared twice.
    #[error("operation `{op}` is declared more than once")]
    DuplicateOperation { op: String },

    /// A signature string could not be parsed.
    #[error("invalid signature `{signature}`: {reason}")]
    InvalidSignature { signature: String, reason: String },

    /// No registry entry exists for the operation.
    #[error("operation `{op}` is not registered")]
    UnknownOperation { op: String },

    /// The operation was recorded with the wrong number of inputs or outputs.
    #[error("`{op}` expects {expected} {what}, got {actual}")]
    ArityMismatch {
        op: String,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Back-propagation reached a derivative that is not implemented.
    #[error("the derivative of `{op}` is not implemented")]
    NotImplementedGradient { op: String },

    /// Shapes disagree.
    #[error(transparent)]
    ShapeMismatch(#[from] ShapeError),

    /// A buffer was taken while contributions to it were still pending.
    #[error("node {node} still waits for {pending} gradient contributions")]
    AccumulatorNotReady { node: usize, pending: usize },

    /// The saved state of a node was freed by a previous backward pass.
    #[error(
        "trying to back-propagate through `{op}` a second time, but its saved values were \
         released; pass `retain_graph = true` to the first backward call"
    )]
    GraphReleased { op: String },

    /// A rule asked for saved state the operation never stored.
    #[error("`{op}` has no saved value named `{name}`")]
    MissingSavedState { op: String, name: String },

    /// A rule returned the wrong number of gradients.
    #[error("a derivative rule of `{op}` returned {actual} gradients instead of {expected}")]
    InvalidRuleOutput {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// Back-propagation was started from a variable that does not require grad.
    #[error("the root does not require grad and has no grad_fn")]
    RootDoesNotRequireGrad,

    /// No seed was given for a root holding more than one element.
    #[error("an implicit seed needs a single-element root, got shape {shape:?}")]
    ImplicitSeedRequiresScalar { shape: Vec<usize> },
}
