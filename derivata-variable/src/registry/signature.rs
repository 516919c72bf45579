use std::fmt;

use itertools::Itertools;

use crate::{AutogradError, Result};

/// Type of a declared argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentType {
    Tensor,
    TensorList,
    Scalar,
    Float,
    Int,
    IntList,
    Bool,
}

impl ArgumentType {
    fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "Tensor" => Self::Tensor,
            "Tensor[]" => Self::TensorList,
            "Scalar" => Self::Scalar,
            "float" => Self::Float,
            "int" => Self::Int,
            "int[]" => Self::IntList,
            "bool" => Self::Bool,
            _ => return None,
        })
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Tensor => "Tensor",
            Self::TensorList => "Tensor[]",
            Self::Scalar => "Scalar",
            Self::Float => "float",
            Self::Int => "int",
            Self::IntList => "int[]",
            Self::Bool => "bool",
        };

        f.write_str(text)
    }
}

/// A declared argument, such as `int dim=0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub ty: ArgumentType,
    pub default: Option<String>,
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)?;
        if let Some(default) = &self.default {
            write!(f, "={}", default)?;
        }

        Ok(())
    }
}

/// Declared outputs of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Returns {
    /// A fixed number of named outputs. A bare `Tensor` is a single output named `result`.
    Fixed(Vec<String>),
    /// A `Tensor[]`, whose length is only known once the operation runs.
    List,
}

impl fmt::Display for Returns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(names) if names.len() == 1 && names[0] == "result" => f.write_str("Tensor"),
            Self::Fixed(names) => write!(
                f,
                "({})",
                names.iter().map(|name| format!("Tensor {}", name)).join(", ")
            ),
            Self::List => f.write_str("Tensor[]"),
        }
    }
}

/// A parsed operation signature, `name[.overload](Type arg[=default], ...) -> Returns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub overload: Option<String>,
    pub arguments: Vec<Argument>,
    pub returns: Returns,
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits on top-level commas, leaving those nested in brackets or parentheses alone.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let (mut depth, mut start) = (0usize, 0);
    for (i, c) in text.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);

    parts
}

impl Signature {
    /// Parses a signature string.
    ///
    /// # Arguments
    ///
    /// * `text` - the signature, e.g.
    /// `sum.dim(Tensor self, int[] dim, bool keepdim=False) -> Tensor`.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: &str| AutogradError::InvalidSignature {
            signature: text.to_string(),
            reason: reason.to_string(),
        };

        let (head, tail) = text
            .split_once("->")
            .ok_or_else(|| invalid("missing `->`"))?;
        let head = head.trim();
        let open = head.find('(').ok_or_else(|| invalid("missing `(`"))?;
        if !head.ends_with(')') {
            return Err(invalid("missing `)`"));
        }

        let (name, overload) = match head[..open].trim().split_once('.') {
            Some((name, overload)) => (name, Some(overload)),
            None => (head[..open].trim(), None),
        };
        if !is_identifier(name) {
            return Err(invalid("invalid operation name"));
        }
        if let Some(overload) = overload {
            if !is_identifier(overload) {
                return Err(invalid("invalid overload name"));
            }
        }

        let mut arguments: Vec<Argument> = Vec::new();
        let body = head[open + 1..head.len() - 1].trim();
        if !body.is_empty() {
            for declaration in split_top_level(body) {
                let (ty, rest) = declaration
                    .trim()
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| invalid("argument without a name"))?;
                let ty = ArgumentType::parse(ty).ok_or_else(|| invalid("unknown argument type"))?;
                let (arg_name, default) = match rest.split_once('=') {
                    Some((arg_name, default)) => {
                        (arg_name.trim(), Some(default.trim().to_string()))
                    }
                    None => (rest.trim(), None),
                };
                if !is_identifier(arg_name) {
                    return Err(invalid("invalid argument name"));
                }
                if arguments.iter().any(|argument| argument.name == arg_name) {
                    return Err(invalid("repeated argument name"));
                }
                arguments.push(Argument {
                    name: arg_name.to_string(),
                    ty,
                    default,
                });
            }
        }

        let returns = Self::parse_returns(tail.trim()).ok_or_else(|| invalid("invalid returns"))?;

        Ok(Self {
            name: name.to_string(),
            overload: overload.map(str::to_string),
            arguments,
            returns,
        })
    }

    fn parse_returns(text: &str) -> Option<Returns> {
        match text {
            "Tensor" => return Some(Returns::Fixed(vec!["result".to_string()])),
            "Tensor[]" => return Some(Returns::List),
            _ => {}
        }

        let inner = text.strip_prefix('(')?.strip_suffix(')')?;
        let names = split_top_level(inner)
            .into_iter()
            .map(|declaration| {
                let (ty, name) = declaration.trim().split_once(char::is_whitespace)?;
                let name = name.trim();
                (ty == "Tensor" && is_identifier(name)).then(|| name.to_string())
            })
            .collect::<Option<Vec<_>>>()?;

        if names.is_empty() || names.iter().unique().count() != names.len() {
            return None;
        }

        Some(Returns::Fixed(names))
    }

    /// The registry key, `name` or `name.overload`.
    pub fn key(&self) -> String {
        match &self.overload {
            Some(overload) => format!("{}.{}", self.name, overload),
            None => self.name.clone(),
        }
    }

    /// Names of the differentiable inputs, that is, of the `Tensor` arguments, in order.
    pub fn differentiable_inputs(&self) -> impl Iterator<Item = &str> {
        self.arguments
            .iter()
            .filter(|argument| argument.ty == ArgumentType::Tensor)
            .map(|argument| argument.name.as_str())
    }

    /// Number of outputs, or `None` for a `Tensor[]` return.
    pub fn num_outputs(&self) -> Option<usize> {
        match &self.returns {
            Returns::Fixed(names) => Some(names.len()),
            Returns::List => None,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) -> {}",
            self.key(),
            self.arguments.iter().join(", "),
            self.returns
        )
    }
}
