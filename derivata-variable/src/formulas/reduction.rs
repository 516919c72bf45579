use derivata_core::shape::numel;

use super::helpers::{index_mask, reduced_count, sum_backward};
use crate::registry::RegistryBuilder;

pub(super) fn register(table: &mut RegistryBuilder) {
    table
        .entry("sum(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.expand(ctx.input_shape(0)?));
    table
        .entry("sum.dim(Tensor self, int[] dim, bool keepdim=False) -> Tensor")
        .grad("self", |ctx| {
            sum_backward(
                &ctx.grad()?,
                ctx.input_shape(0)?,
                ctx.ints("dim")?,
                ctx.bool("keepdim")?,
            )
        });
    table.entry("mean(Tensor self) -> Tensor").grad("self", |ctx| {
        let sizes = ctx.input_shape(0)?;
        ctx.grad()?
            .expand(sizes)?
            .mul_scalar(1. / numel(sizes) as f64)
    });
    table
        .entry("mean.dim(Tensor self, int[] dim, bool keepdim=False) -> Tensor")
        .grad("self", |ctx| {
            let (sizes, dims) = (ctx.input_shape(0)?, ctx.ints("dim")?);
            sum_backward(&ctx.grad()?, sizes, dims, ctx.bool("keepdim")?)?
                .mul_scalar(1. / reduced_count(sizes, dims) as f64)
        });
    table
        .entry("max.dim(Tensor self, int dim, bool keepdim=False) -> (Tensor values, Tensor indices)")
        .grad("self", |ctx| {
            let (sizes, dim) = (ctx.input_shape(0)?, ctx.usize("dim")?);
            let mask = index_mask(ctx.var("indices")?.value(), dim, sizes)?;
            sum_backward(&ctx.grad()?, sizes, &[dim], ctx.bool("keepdim")?)?.mul(&mask)
        })
        .non_differentiable("indices");
    table
        .entry("argmax(Tensor self, int dim, bool keepdim=False) -> Tensor")
        .fallthrough();
    table
        .entry("histc(Tensor self, int bins=100, Scalar min=0, Scalar max=0) -> Tensor")
        .stub("self");
}
