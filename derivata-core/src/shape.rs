use ndarray::{Axis, IxDyn, Slice};

use crate::{ShapeError, Value};

/// Checks that `axis` is a valid axis for a value with `ndim` dimensions.
pub fn check_axis(axis: usize, ndim: usize) -> Result<(), ShapeError> {
    if axis >= ndim {
        return Err(ShapeError::AxisOutOfBounds { axis, ndim });
    }

    Ok(())
}

/// Number of elements of a value having the given shape.
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Computes the result of broadcasting between `left` and `right`.
///
/// Shapes are aligned on their trailing dimensions; a dimension of size 1 stretches to match
/// the other one.
///
/// # Arguments
///
/// * `left` - left shape.
///
/// * `right` - right shape.
pub fn cobroadcast(left: &[usize], right: &[usize]) -> Result<Vec<usize>, ShapeError> {
    let (bigger, smaller) = if left.len() >= right.len() {
        (left, right)
    } else {
        (right, left)
    };

    let mut out = bigger.to_vec();
    let offset = bigger.len() - smaller.len();
    for (l, &r) in out.iter_mut().skip(offset).zip(smaller) {
        if *l == r || r == 1 {
            continue;
        }
        if *l != 1 {
            return Err(ShapeError::IncompatibleBroadcast {
                left: left.to_vec(),
                right: right.to_vec(),
            });
        }
        *l = r;
    }

    Ok(out)
}

/// Shape of the result of reducing `shape` along `dims`.
///
/// With `keepdim` the reduced dimensions are kept with size 1, otherwise they are removed.
pub fn reduced_shape(
    shape: &[usize],
    dims: &[usize],
    keepdim: bool,
) -> Result<Vec<usize>, ShapeError> {
    for &dim in dims {
        check_axis(dim, shape.len())?;
    }

    Ok(shape
        .iter()
        .enumerate()
        .filter_map(|(axis, &size)| match (dims.contains(&axis), keepdim) {
            (false, _) => Some(size),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect())
}

/// Shape a non-keepdim reduction over `dims` would have had with keepdim.
///
/// `reduced` has the reduced dimensions removed; they are reinserted with size 1, so that a
/// gradient of shape `reduced` can be reshaped and then expanded back to the input.
pub fn restore_reduced(reduced: &[usize], dims: &[usize]) -> Result<Vec<usize>, ShapeError> {
    let ndim = reduced.len() + dims.len();
    let mut dims = dims.to_vec();
    dims.sort_unstable();
    dims.dedup();
    for &dim in &dims {
        check_axis(dim, ndim)?;
    }

    let mut restored = reduced.to_vec();
    for dim in dims {
        restored.insert(dim, 1);
    }

    Ok(restored)
}

/// Shape that undoes `squeeze(dim)` on a value whose pre-squeeze shape was `sizes`.
///
/// A squeeze only removes `dim` when its size is 1, so the dimension is reinserted only in
/// that case.
pub fn unsqueeze_to(
    shape: &[usize],
    dim: usize,
    sizes: &[usize],
) -> Result<Vec<usize>, ShapeError> {
    check_axis(dim, sizes.len())?;

    let mut restored = shape.to_vec();
    if sizes[dim] == 1 && shape.len() < sizes.len() {
        restored.insert(dim, 1);
    }

    Ok(restored)
}

/// Sums `source` down to `target`, reverting a broadcast.
///
/// Leading dimensions that `target` lacks are summed away, and dimensions where `target` has
/// size 1 are summed keeping the axis. This is the exact shape inverse of expanding a value of
/// shape `target` to the shape of `source`.
///
/// # Arguments
///
/// * `source` - value to reduce.
///
/// * `target` - shape to reduce to.
pub fn sum_to(source: &Value, target: &[usize]) -> Result<Value, ShapeError> {
    if source.shape() == target {
        return Ok(source.to_owned());
    }

    let mismatch = || ShapeError::ShapeMismatch {
        expected: target.to_vec(),
        actual: source.shape().to_vec(),
    };

    if source.ndim() < target.len() {
        return Err(mismatch());
    }

    let mut reduced = source.to_owned();
    for _ in 0..source.ndim() - target.len() {
        reduced = reduced.sum_axis(Axis(0));
    }

    for (axis, &size) in target.iter().enumerate() {
        if reduced.shape()[axis] == size {
            continue;
        }
        if size != 1 {
            return Err(mismatch());
        }
        reduced = reduced.sum_axis(Axis(axis)).insert_axis(Axis(axis));
    }

    Ok(reduced)
}

/// Scatters `grad` back into a zero value whose dimension `dim` has length `full_len`.
///
/// `grad` lands at offset `start` along `dim`; every other position is zero. This is the
/// inverse of narrowing `dim` to `start..start + grad.shape()[dim]`.
///
/// # Arguments
///
/// * `grad` - the narrowed value.
///
/// * `dim` - the narrowed dimension.
///
/// * `start` - offset of the narrowed window.
///
/// * `full_len` - length of `dim` before narrowing.
pub fn un_narrow(
    grad: &Value,
    dim: usize,
    start: usize,
    full_len: usize,
) -> Result<Value, ShapeError> {
    check_axis(dim, grad.ndim())?;

    let length = grad.shape()[dim];
    if start + length > full_len {
        return Err(ShapeError::InvalidNarrow {
            dim,
            start,
            length,
            size: full_len,
        });
    }

    let mut shape = grad.shape().to_vec();
    shape[dim] = full_len;

    let mut out = Value::zeros(IxDyn(&shape));
    out.slice_axis_mut(Axis(dim), Slice::from(start..start + length))
        .assign(grad);

    Ok(out)
}

/// Returns the permutation that undoes `permutation`.
pub fn inverse_permutation(permutation: &[usize]) -> Result<Vec<usize>, ShapeError> {
    let invalid = || ShapeError::InvalidPermutation {
        permutation: permutation.to_vec(),
        ndim: permutation.len(),
    };

    let mut inverse = vec![usize::MAX; permutation.len()];
    for (position, &axis) in permutation.iter().enumerate() {
        match inverse.get_mut(axis) {
            Some(slot) if *slot == usize::MAX => *slot = position,
            _ => return Err(invalid()),
        }
    }

    Ok(inverse)
}

#[cfg(test)]
mod test;
