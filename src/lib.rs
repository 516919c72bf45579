//! The `derivata` crate provides reverse-mode automatic differentiation for n-dimensional arrays.
//!
//! Operations on [`Variable`]s are evaluated eagerly and, when some input requires grad, recorded
//! into a graph. Back-propagating through that graph is driven by a declarative table of
//! derivative formulas, compiled once into a [`Registry`](registry::Registry).
//!
//! # Highlights
//!
//! * Define by run computational graphs
//! * A derivative table validated when it is compiled
//! * Higher order gradients
//! * Parallel execution of independent backward nodes
//!
//! # Variables
//!
//! A [`Variable`] is either a *leaf*, that accumulates the gradients reaching it, a *constant*,
//! that never takes part in differentiation, or the result of an operation.
//!
//! You can create variables with one of the provided functions, such as [`zeros()`], [`ones()`],
//! [`full()`] and [`rand()`]. They all create constants; promote one to a leaf with
//! [`.into_leaf()`](Variable::into_leaf()).
//!
//! Requiring grad is a *sticky* property: the result of an operation requires grad as soon as one
//! of its inputs does, provided gradient recording is enabled. See [`grad_mode`] for disabling it.
//!
//! # Back-propagation
//!
//! [`.backward()`](Variable::backward()) accumulates into the gradients of every leaf the root
//! depends on, while [`grad()`] returns the gradients with respect to chosen inputs without
//! touching any `.grad()`.
//!
//!```
//! use derivata;
//!
//! let a = derivata::full((), 2.).into_leaf();
//! let b = derivata::full((), 3.).into_leaf();
//!
//! let c = a.mul(&b).unwrap();
//! let d = a.add(&c).unwrap();
//! d.backward(None, false, false).unwrap();
//!
//! assert_eq!(a.grad().unwrap(), ndarray::arr0(4.).into_dyn());
//! assert_eq!(b.grad().unwrap(), ndarray::arr0(2.).into_dyn());
//!```
//!
//! ## Freeing and keeping the graph
//!
//! A backward call releases the tensors the graph saved for differentiation, unless
//! `retain_graph` or `create_graph` is set. Traversing a released graph again fails with
//! [`AutogradError::GraphReleased`]. With `create_graph` the backward computation is itself
//! recorded, and the resulting gradients can be differentiated again.
//!
//!```
//! use derivata;
//!
//! let x = derivata::linspace(-1., 1., 5).into_leaf();
//! let y = x.mul(&x).unwrap().mul(&x).unwrap().sum().unwrap();
//!
//! let dx = derivata::grad(&[y], &[x.clone()], &[], true, true).unwrap();
//! let dx = dx[0].clone().unwrap();
//! let ddx = derivata::grad(&[dx.sum().unwrap()], &[x.clone()], &[], false, false).unwrap();
//!
//! assert_eq!(ddx[0].as_ref().unwrap().value(), &x.value().mapv(|x| 6. * x));
//!```
//!
//! # Configuration
//!
//! Two environment variables are read:
//!
//! * `DERIVATA_STUB_GRADIENTS` compiles the placeholder gradients of the table to zeros instead of
//! failing when they are reached.
//!
//! * `DERIVATA_PARALLEL_BACKWARD` runs independent nodes on the `rayon` thread pool by default.
pub use derivata_core::{kernels, shape, ShapeError, Value};
pub use derivata_variable::{
    backward, formulas, grad, grad_mode, record, registry, AutogradError, Engine, Node, NodeId,
    Result, SavedState, Variable,
};

use ndarray::{Array, Array2, Dimension, ShapeBuilder};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Creates a constant from a **[ndarray]** array that owns its data.
///
/// # Examples
///
/// ```
/// use ndarray;
/// use derivata;
///
/// let a = ndarray::array![[1., 2.], [3., 4.]];
/// let t = derivata::from_ndarray(a.clone());
///
/// assert_eq!(t.value(), &a.into_dyn());
/// ```
pub fn from_ndarray<D: Dimension>(array: Array<f64, D>) -> Variable {
    Variable::constant(array.into_dyn())
}

/// Creates a constant with zeroed data.
///
/// The shape is of type [`ndarray::ShapeBuilder`].
///
/// # Examples
///
/// ```
/// use derivata;
/// let t1 = derivata::zeros(1);
/// let t2 = derivata::zeros((1, 5));
/// let t3 = derivata::zeros([1, 2, 3]);
///
/// assert_eq!(t1.shape(), &[1]);
/// assert_eq!(t2.shape(), &[1, 5]);
/// assert_eq!(t3.shape(), &[1, 2, 3]);
/// ```
pub fn zeros<D: Dimension, Sh: ShapeBuilder<Dim = D>>(shape: Sh) -> Variable {
    full(shape, 0.)
}

/// Creates a constant with data filled with ones.
///
/// # Examples
///
/// ```
/// use derivata;
/// let t = derivata::ones((2, 3));
///
/// assert_eq!(t.shape(), &[2, 3]);
/// ```
pub fn ones<D: Dimension, Sh: ShapeBuilder<Dim = D>>(shape: Sh) -> Variable {
    full(shape, 1.)
}

/// Creates a constant with data filled with `elem`.
///
/// # Examples
///
/// ```
/// use derivata;
/// let t = derivata::full([1, 2, 3], 8.);
///
/// assert!(t.value().iter().all(|&el| el == 8.));
/// ```
pub fn full<D: Dimension, Sh: ShapeBuilder<Dim = D>>(shape: Sh, elem: f64) -> Variable {
    from_ndarray(Array::from_elem(shape, elem))
}

/// Creates a constant with values sampled from a uniform distribution on the interval *[0,1)*.
///
/// # Examples
///
/// ```
/// use derivata;
/// let t = derivata::rand([4, 5, 6]);
///
/// assert_eq!(t.shape(), &[4, 5, 6]);
/// ```
pub fn rand<D: Dimension, Sh: ShapeBuilder<Dim = D>>(shape: Sh) -> Variable {
    from_ndarray(Array::random(shape, Uniform::new(0., 1.)))
}

/// Creates a constant holding the identity matrix of size *n*.
///
/// # Panics
///
/// If `n * n` would overflow `isize`.
pub fn eye(n: usize) -> Variable {
    from_ndarray(Array2::eye(n))
}

/// Creates a one-dimensional constant with *n* evenly spaced elements from `start` to `end`,
/// both included.
///
/// # Examples
///
/// ```
/// use derivata;
/// use ndarray::arr1;
///
/// let t = derivata::linspace(0., 1., 5);
/// assert_eq!(t.value(), &arr1(&[0.0, 0.25, 0.5, 0.75, 1.0]).into_dyn());
/// ```
pub fn linspace(start: f64, end: f64, n: usize) -> Variable {
    from_ndarray(Array::linspace(start, end, n))
}
