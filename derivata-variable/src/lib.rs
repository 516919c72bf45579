//! Variables, graph recording and the reverse-mode engine of derivata.
//!
//! Operations on [`Variable`]s compute their value eagerly and, when some input requires grad,
//! record a [`Node`] remembering how to differentiate them. The derivatives themselves are not
//! hand-written per node: they are compiled into a [`Registry`](registry::Registry) from the
//! declarative table in [`formulas`], and the [`Engine`] looks them up while traversing the
//! graph.
//!
//! ```
//! # use derivata_variable::Variable;
//! use ndarray::arr0;
//!
//! let a = Variable::leaf(arr0(2.).into_dyn());
//! let b = Variable::leaf(arr0(3.).into_dyn());
//!
//! let c = a.mul(&b).unwrap();
//! let d = a.add(&c).unwrap();
//! d.backward(None, false, false).unwrap();
//!
//! assert_eq!(a.grad().unwrap(), arr0(4.).into_dyn());
//! assert_eq!(b.grad().unwrap(), arr0(2.).into_dyn());
//! ```

mod error;
mod node;
mod ops;
mod saved;
mod variable;

pub mod engine;
pub mod formulas;
pub mod grad_mode;
pub mod registry;

pub use crate::{
    engine::{backward, grad, Engine},
    error::{AutogradError, Result},
    node::{Node, NodeId},
    ops::record,
    saved::SavedState,
    variable::Variable,
};

pub use derivata_core::{ShapeError, Value};
