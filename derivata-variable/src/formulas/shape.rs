use derivata_core::shape::inverse_permutation;

use super::helpers::unsqueeze_to;
use crate::{registry::RegistryBuilder, Variable};

pub(super) fn register(table: &mut RegistryBuilder) {
    table
        .entry("reshape(Tensor self, int[] shape) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.reshape(ctx.input_shape(0)?));
    table
        .entry("expand(Tensor self, int[] size) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.sum_to_size(ctx.input_shape(0)?));
    table
        .entry("sum_to_size(Tensor self, int[] size) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.expand(ctx.input_shape(0)?));
    table
        .entry("squeeze.dim(Tensor self, int dim) -> Tensor")
        .grad("self", |ctx| {
            unsqueeze_to(&ctx.grad()?, ctx.usize("dim")?, ctx.input_shape(0)?)
        });
    table
        .entry("unsqueeze(Tensor self, int dim) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.squeeze_dim(ctx.usize("dim")?));
    table
        .entry("narrow(Tensor self, int dim, int start, int length) -> Tensor")
        .grad("self", |ctx| {
            let dim = ctx.usize("dim")?;
            let full_len = ctx.input_shape(0)?[dim];
            ctx.grad()?.un_narrow(dim, ctx.usize("start")?, full_len)
        });
    table
        .entry("un_narrow(Tensor self, int dim, int start, int full_len) -> Tensor")
        .grad("self", |ctx| {
            let dim = ctx.usize("dim")?;
            let length = ctx.input_shape(0)?[dim];
            ctx.grad()?.narrow(dim, ctx.usize("start")?, length)
        });
    table
        .entry("transpose(Tensor self, int dim0, int dim1) -> Tensor")
        .grad("self", |ctx| {
            ctx.grad()?
                .transpose(ctx.usize("dim0")?, ctx.usize("dim1")?)
        });
    table
        .entry("permute(Tensor self, int[] dims) -> Tensor")
        .grad("self", |ctx| {
            let inverse = inverse_permutation(ctx.ints("dims")?)?;
            ctx.grad()?.permute(&inverse)
        });
    table
        .entry("chunk(Tensor self, int chunks, int dim=0) -> Tensor[]")
        .grad("self", |ctx| {
            let dim = ctx.usize("dim")?;
            let full_len = ctx.input_shape(0)?[dim];

            let mut start = 0;
            let mut total: Option<Variable> = None;
            for (output, grad) in ctx.grads().iter().enumerate() {
                let length = ctx.output_shape(output)?[dim];
                if let Some(grad) = grad {
                    let placed = grad.un_narrow(dim, start, full_len)?;
                    total = Some(match total {
                        Some(total) => total.add(&placed)?,
                        None => placed,
                    });
                }
                start += length;
            }

            match total {
                Some(total) => Ok(total),
                None => ctx.grad()?.un_narrow(dim, 0, full_len),
            }
        });
}
