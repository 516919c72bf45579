//! Registry of derivative rules, compiled from the declarative table in [`crate::formulas`].
//!
//! Every operation is declared with a signature string and one rule per group of
//! differentiable inputs:
//!
//! ```
//! # use derivata_variable::registry::{RegistryBuilder, RegistryConfig};
//! let mut table = RegistryBuilder::new(RegistryConfig::default());
//! table
//!     .entry("exp(Tensor self) -> Tensor")
//!     .grad("self", |ctx| ctx.grad()?.mul(&ctx.result()?));
//! table
//!     .entry("atan2(Tensor self, Tensor other) -> Tensor")
//!     .grads("self, other", |ctx| Ok(vec![None, None]));
//! let registry = table.build().unwrap();
//!
//! assert!(registry.get("exp").is_ok());
//! ```
//!
//! [`RegistryBuilder::build`] validates coverage: every differentiable input of an operation must
//! be covered by exactly one rule, unless the whole operation is marked fallthrough or not
//! implemented.

mod context;
mod signature;

use std::{collections::HashMap, env, sync::Arc, sync::OnceLock};

use derivata_core::Value;
use log::{debug, warn};
use ndarray::IxDyn;

use crate::{formulas, AutogradError, Result, Variable};

pub use context::BackwardContext;
pub use signature::{Argument, ArgumentType, Returns, Signature};

/// A compiled derivative formula.
///
/// It receives the context of the node being differentiated and returns one gradient per input
/// covered by its rule, `None` where no gradient flows.
pub type BackwardFn =
    Arc<dyn Fn(&BackwardContext<'_>) -> Result<Vec<Option<Variable>>> + Send + Sync>;

/// Environment variable that enables stub gradients in the global registry.
pub const STUB_GRADIENTS_ENV: &str = "DERIVATA_STUB_GRADIENTS";

/// Settings used when compiling the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Compiles stub rules to zero gradients instead of not-implemented markers.
    pub allow_stub_gradients: bool,
}

impl RegistryConfig {
    /// Reads the configuration from the environment.
    ///
    /// Stubs are enabled when `DERIVATA_STUB_GRADIENTS` is `1`, `true`, `yes` or `on`.
    pub fn from_env() -> Self {
        let allow_stub_gradients = env::var(STUB_GRADIENTS_ENV)
            .map(|value| is_truthy(&value))
            .unwrap_or(false);

        Self {
            allow_stub_gradients,
        }
    }
}

pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// How the gradients of a group of inputs are computed.
#[derive(Clone)]
pub enum RuleKind {
    Formula {
        function: BackwardFn,
        /// The formula inspects the mask and may skip inputs that need no gradient.
        requires_mask: bool,
    },
    /// Reaching this rule with an input that needs a gradient is an error.
    NotImplemented(String),
}

/// A rule covering one or more differentiable inputs.
#[derive(Clone)]
pub struct BackwardRule {
    covers: Vec<usize>,
    names: Vec<String>,
    kind: RuleKind,
}

impl BackwardRule {
    /// Positions of the covered inputs among the differentiable inputs.
    pub fn covers(&self) -> &[usize] {
        &self.covers
    }

    /// Names of the covered inputs.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }
}

/// How an operation as a whole is differentiated.
#[derive(Clone)]
pub enum DerivativeKind {
    Rules(Vec<BackwardRule>),
    /// Outputs are never differentiable; recording produces no node.
    Fallthrough,
    /// The operation is not differentiable at all.
    NotImplemented(String),
}

/// The compiled entry of one operation.
#[derive(Clone)]
pub struct Derivatives {
    signature: Signature,
    kind: DerivativeKind,
    differentiable_outputs: Vec<bool>,
    num_inputs: usize,
}

impl Derivatives {
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn kind(&self) -> &DerivativeKind {
        &self.kind
    }

    /// Number of differentiable inputs.
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Whether output number `output` can carry a gradient.
    ///
    /// Outputs of a `Tensor[]` return are all differentiable.
    pub fn is_output_differentiable(&self, output: usize) -> bool {
        self.differentiable_outputs.get(output).copied().unwrap_or(true)
    }

    pub fn is_fallthrough(&self) -> bool {
        matches!(self.kind, DerivativeKind::Fallthrough)
    }
}

/// The compiled table, keyed by `name` or `name.overload`.
pub struct Registry {
    entries: HashMap<String, Derivatives>,
}

impl Registry {
    /// Looks up the entry of an operation.
    pub fn get(&self, op: &str) -> Result<&Derivatives> {
        self.entries
            .get(op)
            .ok_or_else(|| AutogradError::UnknownOperation { op: op.to_string() })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the registered operation keys.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

static GLOBAL: OnceLock<Result<Registry>> = OnceLock::new();

/// The process-wide registry, compiled from the table on first use.
///
/// A compilation failure is remembered and returned to every caller.
pub fn global() -> Result<&'static Registry> {
    GLOBAL
        .get_or_init(|| formulas::registry(RegistryConfig::from_env()))
        .as_ref()
        .map_err(Clone::clone)
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ Builder ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

enum RuleDecl {
    Formula {
        inputs: String,
        function: BackwardFn,
        requires_mask: bool,
    },
    NotImplemented(String),
    Stub(String),
}

enum Marker {
    Fallthrough,
    NotImplemented,
}

struct EntryDecl {
    signature: String,
    rules: Vec<RuleDecl>,
    marker: Option<Marker>,
    non_differentiable: Vec<String>,
}

/// Declares the derivatives of one operation. Obtained from [`RegistryBuilder::entry`].
pub struct EntryBuilder<'a> {
    decl: &'a mut EntryDecl,
}

impl<'a> EntryBuilder<'a> {
    /// Adds a rule for a single input. `f` returns its gradient.
    pub fn grad<F>(self, input: &str, f: F) -> Self
    where
        F: Fn(&BackwardContext<'_>) -> Result<Variable> + Send + Sync + 'static,
    {
        self.decl.rules.push(RuleDecl::Formula {
            inputs: input.to_string(),
            function: Arc::new(move |ctx: &BackwardContext<'_>| Ok(vec![Some(f(ctx)?)])),
            requires_mask: false,
        });
        self
    }

    /// Adds a joint rule for a comma separated list of inputs.
    ///
    /// `f` must return one entry per listed input, in order. It can use
    /// [`BackwardContext::needs`] to skip the inputs that need no gradient.
    pub fn grads<F>(self, inputs: &str, f: F) -> Self
    where
        F: Fn(&BackwardContext<'_>) -> Result<Vec<Option<Variable>>> + Send + Sync + 'static,
    {
        self.decl.rules.push(RuleDecl::Formula {
            inputs: inputs.to_string(),
            function: Arc::new(f),
            requires_mask: true,
        });
        self
    }

    /// Adds a joint rule that always computes every listed input.
    ///
    /// [`BackwardContext::needs`] is `true` for each of them; the gradients of inputs that need
    /// none are dropped after the rule returns.
    pub fn joint<F>(self, inputs: &str, f: F) -> Self
    where
        F: Fn(&BackwardContext<'_>) -> Result<Vec<Option<Variable>>> + Send + Sync + 'static,
    {
        self.decl.rules.push(RuleDecl::Formula {
            inputs: inputs.to_string(),
            function: Arc::new(f),
            requires_mask: false,
        });
        self
    }

    /// Declares that the gradient of `input` is not implemented.
    pub fn not_implemented(self, input: &str) -> Self {
        self.decl
            .rules
            .push(RuleDecl::NotImplemented(input.to_string()));
        self
    }

    /// Declares a placeholder zero gradient for `input`.
    ///
    /// It is only honoured when [`RegistryConfig::allow_stub_gradients`] is set, otherwise it
    /// behaves like [`not_implemented`](EntryBuilder::not_implemented).
    pub fn stub(self, input: &str) -> Self {
        self.decl.rules.push(RuleDecl::Stub(input.to_string()));
        self
    }

    /// Marks an output as never carrying a gradient.
    pub fn non_differentiable(self, output: &str) -> Self {
        self.decl.non_differentiable.push(output.to_string());
        self
    }

    /// Marks the operation as having no derivative; its outputs never require grad.
    pub fn fallthrough(self) -> Self {
        self.decl.marker = Some(Marker::Fallthrough);
        self
    }

    /// Marks the whole operation as not differentiable.
    pub fn not_implemented_op(self) -> Self {
        self.decl.marker = Some(Marker::NotImplemented);
        self
    }
}

/// Collects the entries of the table and compiles them into a [`Registry`].
pub struct RegistryBuilder {
    config: RegistryConfig,
    entries: Vec<EntryDecl>,
}

impl RegistryBuilder {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    /// Starts the declaration of an operation.
    ///
    /// # Arguments
    ///
    /// * `signature` - e.g. `mul(Tensor self, Tensor other) -> Tensor`.
    pub fn entry(&mut self, signature: &str) -> EntryBuilder<'_> {
        self.entries.push(EntryDecl {
            signature: signature.to_string(),
            rules: Vec::new(),
            marker: None,
            non_differentiable: Vec::new(),
        });
        let last = self.entries.len() - 1;

        EntryBuilder {
            decl: &mut self.entries[last],
        }
    }

    /// Validates and compiles every entry. The first failure aborts the build.
    pub fn build(self) -> Result<Registry> {
        let mut entries = HashMap::with_capacity(self.entries.len());
        let (mut rules, mut stubs) = (0, 0);

        for decl in self.entries {
            let signature = Signature::parse(&decl.signature)?;
            let op = signature.key();
            if entries.contains_key(&op) {
                return Err(AutogradError::DuplicateOperation { op });
            }

            let inputs: Vec<String> = signature
                .differentiable_inputs()
                .map(str::to_string)
                .collect();
            let differentiable_outputs = Self::output_differentiability(&signature, &decl)?;

            let kind = match decl.marker {
                Some(marker) => {
                    if let Some(rule) = decl.rules.first() {
                        return Err(AutogradError::AmbiguousCoverage {
                            op,
                            input: rule.inputs().to_string(),
                        });
                    }
                    match marker {
                        Marker::Fallthrough => DerivativeKind::Fallthrough,
                        Marker::NotImplemented => DerivativeKind::NotImplemented(op.clone()),
                    }
                }
                None => {
                    let mut covered = vec![false; inputs.len()];
                    let mut compiled = Vec::with_capacity(decl.rules.len());
                    for rule in decl.rules {
                        let names: Vec<String> = rule
                            .inputs()
                            .split(',')
                            .map(|name| name.trim().to_string())
                            .collect();
                        let mut covers = Vec::with_capacity(names.len());
                        for name in &names {
                            let position = inputs.iter().position(|input| input == name).ok_or_else(
                                || AutogradError::UnknownInput {
                                    op: op.clone(),
                                    input: name.clone(),
                                },
                            )?;
                            if covered[position] {
                                return Err(AutogradError::AmbiguousCoverage {
                                    op,
                                    input: name.clone(),
                                });
                            }
                            covered[position] = true;
                            covers.push(position);
                        }

                        let kind = match rule {
                            RuleDecl::Formula {
                                function,
                                requires_mask,
                                ..
                            } => RuleKind::Formula {
                                function,
                                requires_mask,
                            },
                            RuleDecl::NotImplemented(_) => RuleKind::NotImplemented(op.clone()),
                            RuleDecl::Stub(_) if self.config.allow_stub_gradients => {
                                warn!(
                                    "using a zero placeholder gradient for {} of `{}`",
                                    names.join(", "),
                                    op
                                );
                                stubs += 1;
                                zeros_rule(covers.clone())
                            }
                            RuleDecl::Stub(_) => RuleKind::NotImplemented(op.clone()),
                        };
                        rules += 1;
                        compiled.push(BackwardRule {
                            covers,
                            names,
                            kind,
                        });
                    }

                    if let Some(position) = covered.iter().position(|covered| !covered) {
                        return Err(AutogradError::UncoveredInput {
                            op,
                            input: inputs[position].clone(),
                        });
                    }

                    DerivativeKind::Rules(compiled)
                }
            };

            entries.insert(
                op,
                Derivatives {
                    signature,
                    kind,
                    differentiable_outputs,
                    num_inputs: inputs.len(),
                },
            );
        }

        debug!(
            "compiled {} operations with {} derivative rules ({} stubs)",
            entries.len(),
            rules,
            stubs
        );

        Ok(Registry { entries })
    }

    fn output_differentiability(signature: &Signature, decl: &EntryDecl) -> Result<Vec<bool>> {
        let names = match &signature.returns {
            Returns::Fixed(names) => names.as_slice(),
            Returns::List => &[],
        };

        for output in &decl.non_differentiable {
            if !names.contains(output) {
                return Err(AutogradError::InvalidSignature {
                    signature: decl.signature.clone(),
                    reason: format!("`{}` is not a named output", output),
                });
            }
        }

        Ok(names
            .iter()
            .map(|name| !decl.non_differentiable.contains(name))
            .collect())
    }
}

impl RuleDecl {
    fn inputs(&self) -> &str {
        match self {
            Self::Formula { inputs, .. } => inputs,
            Self::NotImplemented(inputs) | Self::Stub(inputs) => inputs,
        }
    }
}

/// A formula returning zeros shaped like each covered input.
fn zeros_rule(covers: Vec<usize>) -> RuleKind {
    let function: BackwardFn = Arc::new(move |ctx: &BackwardContext<'_>| {
        covers
            .iter()
            .map(|&input| {
                let shape = ctx.input_shape(input)?;
                Ok(Some(Variable::constant(Value::zeros(IxDyn(shape)))))
            })
            .collect()
    });

    RuleKind::Formula {
        function,
        requires_mask: false,
    }
}
