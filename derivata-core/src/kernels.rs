//! Forward numeric kernels.
//!
//! Every function here is a pure map from input values to a freshly allocated output value.
//! Shape problems are reported as [`ShapeError`]s rather than panics.

use ndarray::{arr0, Axis, Ix2, IxDyn, Slice, Zip};

use crate::{
    shape::{check_axis, cobroadcast, inverse_permutation, numel, reduced_shape},
    ShapeError, Value,
};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ Pointwise ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Applies `f` element-wise to the broadcast of `lhs` and `rhs`.
pub fn zip_with<F>(lhs: &Value, rhs: &Value, f: F) -> Result<Value, ShapeError>
where
    F: Fn(f64, f64) -> f64,
{
    let shape = IxDyn(&cobroadcast(lhs.shape(), rhs.shape())?);
    let incompatible = || ShapeError::IncompatibleBroadcast {
        left: lhs.shape().to_vec(),
        right: rhs.shape().to_vec(),
    };

    let lhs_view = lhs.broadcast(shape.clone()).ok_or_else(incompatible)?;
    let rhs_view = rhs.broadcast(shape).ok_or_else(incompatible)?;

    Ok(Zip::from(&lhs_view)
        .and(&rhs_view)
        .map_collect(|&l, &r| f(l, r)))
}

/// Element-wise logistic function.
pub fn sigmoid(operand: &Value) -> Value {
    operand.mapv(|el| 1. / (1. + (-el).exp()))
}

/// Element-wise rectified linear unit.
pub fn relu(operand: &Value) -> Value {
    operand.mapv(|el| el.max(0.))
}

/// Element-wise sign, with `sign(0) = 0`.
pub fn sign(operand: &Value) -> Value {
    operand.mapv(|el| {
        if el > 0. {
            1.
        } else if el < 0. {
            -1.
        } else {
            0.
        }
    })
}

/// Element-wise clamp into `[min, max]`.
pub fn clamp(operand: &Value, min: f64, max: f64) -> Value {
    operand.mapv(|el| el.max(min).min(max))
}

/// Element-wise `1.0` where the predicate holds and `0.0` elsewhere.
pub fn compare<F>(lhs: &Value, rhs: &Value, predicate: F) -> Result<Value, ShapeError>
where
    F: Fn(f64, f64) -> bool,
{
    zip_with(lhs, rhs, |l, r| if predicate(l, r) { 1. } else { 0. })
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ Reductions ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Sum of all the elements, as a zero-dimensional value.
pub fn sum_all(operand: &Value) -> Value {
    arr0(operand.sum()).into_dyn()
}

/// Sums along `dims`. An empty `dims` reduces every dimension.
pub fn sum_dims(operand: &Value, dims: &[usize], keepdim: bool) -> Result<Value, ShapeError> {
    reduced_shape(operand.shape(), dims, keepdim)?;

    let mut dims = if dims.is_empty() {
        (0..operand.ndim()).collect()
    } else {
        dims.to_vec()
    };
    dims.sort_unstable();
    dims.dedup();

    let mut reduced = operand.to_owned();
    for &dim in dims.iter().rev() {
        reduced = reduced.sum_axis(Axis(dim));
        if keepdim {
            reduced = reduced.insert_axis(Axis(dim));
        }
    }

    Ok(reduced)
}

/// Averages along `dims`. An empty `dims` reduces every dimension.
pub fn mean_dims(operand: &Value, dims: &[usize], keepdim: bool) -> Result<Value, ShapeError> {
    let summed = sum_dims(operand, dims, keepdim)?;
    let count = operand.len() / summed.len().max(1);

    Ok(summed / count as f64)
}

/// Maximum along `dim`, returning the values and the indices (stored as floats) at which they
/// occur. Ties resolve to the first occurrence.
pub fn max_dim(operand: &Value, dim: usize, keepdim: bool) -> Result<(Value, Value), ShapeError> {
    let kept = IxDyn(&reduced_shape(operand.shape(), &[dim], true)?);
    let axis = Axis(dim);

    let mut values = Value::zeros(kept.clone());
    let mut indices = Value::zeros(kept);
    Zip::from(values.lanes_mut(axis))
        .and(indices.lanes_mut(axis))
        .and(operand.lanes(axis))
        .for_each(|mut value, mut index, lane| {
            let (arg, max) = lane
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |(arg, max), (i, &el)| {
                    if el > max {
                        (i, el)
                    } else {
                        (arg, max)
                    }
                });
            value[0] = max;
            index[0] = arg as f64;
        });

    if keepdim {
        Ok((values, indices))
    } else {
        Ok((values.remove_axis(axis), indices.remove_axis(axis)))
    }
}

/// Histogram of the elements into `bins` equal-width bins spanning `[min, max]`.
///
/// When `min == max` the data range is used instead. Elements outside the range are ignored.
pub fn histc(operand: &Value, bins: usize, min: f64, max: f64) -> Value {
    let (mut lo, mut hi) = (min, max);
    if lo == hi {
        lo = operand.fold(f64::INFINITY, |acc, &el| acc.min(el));
        hi = operand.fold(f64::NEG_INFINITY, |acc, &el| acc.max(el));
    }
    if lo == hi {
        lo -= 1.;
        hi += 1.;
    }

    let mut counts = Value::zeros(IxDyn(&[bins]));
    if bins == 0 {
        return counts;
    }

    let width = (hi - lo) / bins as f64;
    operand
        .iter()
        .filter(|&&el| el >= lo && el <= hi)
        .for_each(|&el| {
            let bin = (((el - lo) / width) as usize).min(bins - 1);
            counts[bin] += 1.;
        });

    counts
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ Shape ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Reshapes to `shape`, reading the elements in logical (row-major) order.
pub fn reshape(operand: &Value, shape: &[usize]) -> Result<Value, ShapeError> {
    let invalid = || ShapeError::InvalidReshape {
        from: operand.shape().to_vec(),
        to: shape.to_vec(),
    };

    if numel(shape) != operand.len() {
        return Err(invalid());
    }

    Value::from_shape_vec(IxDyn(shape), operand.iter().copied().collect()).map_err(|_| invalid())
}

/// Broadcasts to `shape`, materializing the result.
pub fn expand(operand: &Value, shape: &[usize]) -> Result<Value, ShapeError> {
    operand
        .broadcast(IxDyn(shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| ShapeError::IncompatibleBroadcast {
            left: operand.shape().to_vec(),
            right: shape.to_vec(),
        })
}

/// Removes dimension `dim` if it has size 1, otherwise returns a copy.
pub fn squeeze_dim(operand: &Value, dim: usize) -> Result<Value, ShapeError> {
    check_axis(dim, operand.ndim())?;

    if operand.shape()[dim] == 1 {
        Ok(operand.index_axis(Axis(dim), 0).to_owned())
    } else {
        Ok(operand.to_owned())
    }
}

/// Inserts a dimension of size 1 at position `dim`.
pub fn unsqueeze(operand: &Value, dim: usize) -> Result<Value, ShapeError> {
    check_axis(dim, operand.ndim() + 1)?;

    Ok(operand.to_owned().insert_axis(Axis(dim)))
}

/// Restricts dimension `dim` to `start..start + length`.
pub fn narrow(
    operand: &Value,
    dim: usize,
    start: usize,
    length: usize,
) -> Result<Value, ShapeError> {
    check_axis(dim, operand.ndim())?;

    let size = operand.shape()[dim];
    if start + length > size {
        return Err(ShapeError::InvalidNarrow {
            dim,
            start,
            length,
            size,
        });
    }

    Ok(operand
        .slice_axis(Axis(dim), Slice::from(start..start + length))
        .to_owned())
}

/// Swaps dimensions `dim0` and `dim1`.
pub fn transpose(operand: &Value, dim0: usize, dim1: usize) -> Result<Value, ShapeError> {
    check_axis(dim0, operand.ndim())?;
    check_axis(dim1, operand.ndim())?;

    let mut transposed = operand.to_owned();
    transposed.swap_axes(dim0, dim1);

    Ok(transposed)
}

/// Reorders the dimensions so that dimension `i` of the result is dimension `axes[i]` of the
/// operand.
pub fn permute(operand: &Value, axes: &[usize]) -> Result<Value, ShapeError> {
    if axes.len() != operand.ndim() {
        return Err(ShapeError::InvalidPermutation {
            permutation: axes.to_vec(),
            ndim: operand.ndim(),
        });
    }
    inverse_permutation(axes)?;

    Ok(operand.to_owned().permuted_axes(IxDyn(axes)))
}

/// Splits dimension `dim` into `chunks` pieces of equal length, except possibly the last.
///
/// Fewer pieces are returned when the dimension is too short to fill all of them.
pub fn chunk(operand: &Value, chunks: usize, dim: usize) -> Result<Vec<Value>, ShapeError> {
    if chunks == 0 {
        return Err(ShapeError::InvalidChunk { chunks });
    }
    check_axis(dim, operand.ndim())?;

    let size = operand.shape()[dim];
    if size == 0 {
        return Ok(vec![operand.to_owned()]);
    }

    let step = (size + chunks - 1) / chunks;
    (0..size)
        .step_by(step)
        .map(|start| narrow(operand, dim, start, step.min(size - start)))
        .collect()
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ Linear Algebra ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Matrix product of two matrices.
pub fn matmul(lhs: &Value, rhs: &Value) -> Result<Value, ShapeError> {
    let invalid = || ShapeError::InvalidMatmul {
        left: lhs.shape().to_vec(),
        right: rhs.shape().to_vec(),
    };

    let lhs_matrix = lhs.view().into_dimensionality::<Ix2>().map_err(|_| invalid())?;
    let rhs_matrix = rhs.view().into_dimensionality::<Ix2>().map_err(|_| invalid())?;
    if lhs_matrix.ncols() != rhs_matrix.nrows() {
        return Err(invalid());
    }

    Ok(lhs_matrix.dot(&rhs_matrix).into_dyn())
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~ NN ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Softmax of every lane along `dim`.
pub fn softmax(operand: &Value, dim: usize) -> Result<Value, ShapeError> {
    check_axis(dim, operand.ndim())?;

    let axis = Axis(dim);
    let mut data = Value::zeros(operand.raw_dim());
    Zip::from(data.lanes_mut(axis))
        .and(operand.lanes(axis))
        .for_each(|lane_v, lane_o| {
            let max = lane_o.fold(f64::MIN, |x, &y| x.max(y));
            let sum = lane_o.fold(0., |acc, &el| acc + (el - max).exp());
            Zip::from(lane_v)
                .and(lane_o)
                .for_each(|lane_v_el, &lane_o_el| *lane_v_el = (lane_o_el - max).exp() / sum);
        });

    Ok(data)
}

/// Log-softmax of every lane along `dim`, computed with the max-shift for stability.
pub fn log_softmax(operand: &Value, dim: usize) -> Result<Value, ShapeError> {
    check_axis(dim, operand.ndim())?;

    let axis = Axis(dim);
    let mut data = Value::zeros(operand.raw_dim());
    Zip::from(data.lanes_mut(axis))
        .and(operand.lanes(axis))
        .for_each(|lane_v, lane_o| {
            let max = lane_o.fold(f64::MIN, |x, &y| x.max(y));
            let log_sum_exp = lane_o.fold(0., |acc, &el| acc + (el - max).exp()).ln();
            Zip::from(lane_v)
                .and(lane_o)
                .for_each(|lane_v_el, &lane_o_el| *lane_v_el = lane_o_el - log_sum_exp - max);
        });

    Ok(data)
}

fn check_same_shape(expected: &Value, actual: &Value) -> Result<(), ShapeError> {
    if expected.shape() != actual.shape() {
        return Err(ShapeError::ShapeMismatch {
            expected: expected.shape().to_vec(),
            actual: actual.shape().to_vec(),
        });
    }

    Ok(())
}

/// Gradient of softmax given the upstream gradient and the softmax output:
/// `output * (grad - sum(grad * output, dim))`.
pub fn softmax_backward_data(
    grad: &Value,
    output: &Value,
    dim: usize,
) -> Result<Value, ShapeError> {
    check_same_shape(output, grad)?;
    check_axis(dim, output.ndim())?;

    let axis = Axis(dim);
    let mut operand_gradient = Value::zeros(output.raw_dim());
    Zip::from(operand_gradient.lanes_mut(axis))
        .and(grad.lanes(axis))
        .and(output.lanes(axis))
        .for_each(|mut op_grad_lane, grad_lane, data_lane| {
            let sum = Zip::from(&grad_lane)
                .and(&data_lane)
                .fold(0., |acc, &grad_el, &data_el| acc + grad_el * data_el);
            Zip::from(&mut op_grad_lane)
                .and(&grad_lane)
                .and(&data_lane)
                .for_each(|op_grad_el, &grad_el, &data_el| {
                    *op_grad_el = data_el * (grad_el - sum)
                })
        });

    Ok(operand_gradient)
}

/// Gradient of log-softmax given the upstream gradient and the log-softmax output:
/// `grad - exp(output) * sum(grad, dim)`.
pub fn log_softmax_backward_data(
    grad: &Value,
    output: &Value,
    dim: usize,
) -> Result<Value, ShapeError> {
    check_same_shape(output, grad)?;
    check_axis(dim, output.ndim())?;

    let axis = Axis(dim);
    let mut operand_gradient = Value::zeros(output.raw_dim());
    Zip::from(operand_gradient.lanes_mut(axis))
        .and(grad.lanes(axis))
        .and(output.lanes(axis))
        .for_each(|mut op_grad_lane, grad_lane, data_lane| {
            let gradient_sum = grad_lane.sum();
            Zip::from(&mut op_grad_lane)
                .and(&grad_lane)
                .and(&data_lane)
                .for_each(|op_grad_el, &grad_el, &data_el| {
                    *op_grad_el = grad_el - data_el.exp() * gradient_sum
                })
        });

    Ok(operand_gradient)
}

/// Gradient of the logistic function given the upstream gradient and its output.
pub fn sigmoid_backward(grad: &Value, output: &Value) -> Result<Value, ShapeError> {
    check_same_shape(output, grad)?;

    Ok(Zip::from(grad)
        .and(output)
        .map_collect(|&grad_el, &data_el| grad_el * data_el * (1. - data_el)))
}

/// Gradient of the hyperbolic tangent given the upstream gradient and its output.
pub fn tanh_backward(grad: &Value, output: &Value) -> Result<Value, ShapeError> {
    check_same_shape(output, grad)?;

    Ok(Zip::from(grad)
        .and(output)
        .map_collect(|&grad_el, &data_el| grad_el * (1. - data_el.powi(2))))
}
