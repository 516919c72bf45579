use derivata_core::{shape, Value};
use ndarray::{Axis, IxDyn, Zip};

use crate::{Result, Variable};

/// Dimensions a reduction over `dims` touches, an empty list meaning all of them.
pub(super) fn reduced_dims(dims: &[usize], ndim: usize) -> Vec<usize> {
    if dims.is_empty() {
        (0..ndim).collect()
    } else {
        dims.to_vec()
    }
}

/// Spreads the gradient of a sum over `dims` back to the input shape `sizes`.
pub(super) fn sum_backward(
    grad: &Variable,
    sizes: &[usize],
    dims: &[usize],
    keepdim: bool,
) -> Result<Variable> {
    if keepdim {
        return grad.expand(sizes);
    }

    let mut dims = reduced_dims(dims, sizes.len());
    dims.sort_unstable();
    dims.dedup();
    let kept = shape::restore_reduced(grad.shape(), &dims)?;

    grad.reshape(&kept)?.expand(sizes)
}

/// Number of elements a mean over `dims` averages.
pub(super) fn reduced_count(sizes: &[usize], dims: &[usize]) -> usize {
    let mut dims = reduced_dims(dims, sizes.len());
    dims.sort_unstable();
    dims.dedup();

    dims.iter().map(|&dim| sizes[dim]).product()
}

/// Restores the dimension `squeeze(dim)` may have removed from an input shaped `sizes`.
pub(super) fn unsqueeze_to(grad: &Variable, dim: usize, sizes: &[usize]) -> Result<Variable> {
    let restored = shape::unsqueeze_to(grad.shape(), dim, sizes)?;
    if restored == grad.shape() {
        return Ok(grad.clone());
    }

    grad.reshape(&restored)
}

/// A constant with `1.0` where `predicate` holds on `value` and `0.0` elsewhere.
pub(super) fn mask_where<F>(value: &Value, predicate: F) -> Variable
where
    F: Fn(f64) -> bool,
{
    Variable::constant(value.mapv(|el| if predicate(el) { 1. } else { 0. }))
}

/// A constant shaped `sizes` with `1.0` at the positions along `dim` selected by `indices`.
///
/// `indices` holds one index per lane, with `dim` either kept with size 1 or removed.
pub(super) fn index_mask(indices: &Value, dim: usize, sizes: &[usize]) -> Result<Variable> {
    let kept = if indices.ndim() == sizes.len() {
        indices.shape().to_vec()
    } else {
        shape::restore_reduced(indices.shape(), &[dim])?
    };
    let indices = derivata_core::kernels::reshape(indices, &kept)?;

    let axis = Axis(dim);
    let mut mask = Value::zeros(IxDyn(sizes));
    Zip::from(mask.lanes_mut(axis))
        .and(indices.lanes(axis))
        .for_each(|mut mask_lane, index_lane| {
            let index = index_lane[0] as usize;
            if let Some(el) = mask_lane.get_mut(index) {
                *el = 1.;
            }
        });

    Ok(Variable::constant(mask))
}
