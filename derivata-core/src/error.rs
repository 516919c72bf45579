use thiserror::Error;

/// Errors raised by kernels and shape helpers when the shapes they are given are inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// Two shapes that must be equal are not.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// The two shapes can't be broadcast together.
    #[error("shapes {left:?} and {right:?} can't be broadcast together")]
    IncompatibleBroadcast { left: Vec<usize>, right: Vec<usize> },

    /// An axis index exceeds the number of dimensions.
    #[error("axis {axis} is out of bounds for a value with {ndim} dimensions")]
    AxisOutOfBounds { axis: usize, ndim: usize },

    /// The range `start..start + length` does not fit the dimension.
    #[error("narrow {start}..{} out of bounds for dimension {dim} of size {size}", start + length)]
    InvalidNarrow {
        dim: usize,
        start: usize,
        length: usize,
        size: usize,
    },

    /// The number of elements is not preserved by the reshape.
    #[error("can't reshape {from:?} into {to:?}")]
    InvalidReshape { from: Vec<usize>, to: Vec<usize> },

    /// The axes list is not a permutation of `0..ndim`.
    #[error("invalid permutation {permutation:?} for a value with {ndim} dimensions")]
    InvalidPermutation { permutation: Vec<usize>, ndim: usize },

    /// Operands of a matrix product have incompatible shapes.
    #[error("can't multiply matrices of shapes {left:?} and {right:?}")]
    InvalidMatmul { left: Vec<usize>, right: Vec<usize> },

    /// A chunk count of zero.
    #[error("chunk count must be positive, got {chunks}")]
    InvalidChunk { chunks: usize },
}
