use super::helpers::mask_where;
use crate::registry::RegistryBuilder;

pub(super) fn register(table: &mut RegistryBuilder) {
    table
        .entry("neg(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.neg());
    table
        .entry("exp(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.mul(&ctx.result()?));
    table
        .entry("log(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.div(&ctx.var("self")?));
    table
        .entry("sin(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.mul(&ctx.var("self")?.cos()?));
    table
        .entry("cos(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.mul(&ctx.var("self")?.sin()?.neg()?));
    table
        .entry("sqrt(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.div(&ctx.result()?.mul_scalar(2.)?));
    table
        .entry("abs(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.mul(&ctx.var("self")?.sign()?));
    table
        .entry("sign(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.zeros_like());
    table
        .entry("sigmoid(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.sigmoid_backward(&ctx.result()?));
    table
        .entry("tanh(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.tanh_backward(&ctx.result()?));
    table.entry("relu(Tensor self) -> Tensor").grad("self", |ctx| {
        let mask = mask_where(ctx.var("self")?.value(), |el| el > 0.);
        ctx.grad()?.mul(&mask)
    });
    table.entry("reciprocal(Tensor self) -> Tensor").grad("self", |ctx| {
        let result = ctx.result()?;
        ctx.grad()?.mul(&result)?.mul(&result)?.neg()
    });
    table
        .entry("pow.Scalar(Tensor self, Scalar exponent) -> Tensor")
        .grad("self", |ctx| {
            let exponent = ctx.float("exponent")?;
            if exponent == 0. {
                return ctx.grad()?.zeros_like();
            }
            let derivative = ctx
                .var("self")?
                .pow_scalar(exponent - 1.)?
                .mul_scalar(exponent)?;
            ctx.grad()?.mul(&derivative)
        });
    table
        .entry("clamp(Tensor self, Scalar min, Scalar max) -> Tensor")
        .grad("self", |ctx| {
            let (min, max) = (ctx.float("min")?, ctx.float("max")?);
            let mask = mask_where(ctx.var("self")?.value(), |el| el >= min && el <= max);
            ctx.grad()?.mul(&mask)
        });
    table
        .entry("floor(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.zeros_like());
    table
        .entry("ceil(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.zeros_like());
    table
        .entry("round(Tensor self) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.zeros_like());
    table
        .entry("add.Scalar(Tensor self, Scalar other) -> Tensor")
        .grad("self", |ctx| ctx.grad());
    table
        .entry("mul.Scalar(Tensor self, Scalar other) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.mul_scalar(ctx.float("other")?));

    // Binary operations broadcast, so every gradient is summed back to its input's shape.
    table
        .entry("add(Tensor self, Tensor other) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.sum_to_size(ctx.input_shape(0)?))
        .grad("other", |ctx| ctx.grad()?.sum_to_size(ctx.input_shape(1)?));
    table
        .entry("sub(Tensor self, Tensor other) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.sum_to_size(ctx.input_shape(0)?))
        .grad("other", |ctx| {
            ctx.grad()?.neg()?.sum_to_size(ctx.input_shape(1)?)
        });
    table
        .entry("mul(Tensor self, Tensor other) -> Tensor")
        .grad("self", |ctx| {
            ctx.grad()?
                .mul(&ctx.var("other")?)?
                .sum_to_size(ctx.input_shape(0)?)
        })
        .grad("other", |ctx| {
            ctx.grad()?
                .mul(&ctx.var("self")?)?
                .sum_to_size(ctx.input_shape(1)?)
        });
    table
        .entry("div(Tensor self, Tensor other) -> Tensor")
        .grad("self", |ctx| {
            ctx.grad()?
                .div(&ctx.var("other")?)?
                .sum_to_size(ctx.input_shape(0)?)
        })
        .grad("other", |ctx| {
            let other = ctx.var("other")?;
            ctx.grad()?
                .neg()?
                .mul(&ctx.var("self")?)?
                .div(&other.mul(&other)?)?
                .sum_to_size(ctx.input_shape(1)?)
        });
    table
        .entry("atan2(Tensor self, Tensor other) -> Tensor")
        .grads("self, other", |ctx| {
            let (this, other) = (ctx.var("self")?, ctx.var("other")?);
            let grad = ctx.grad()?;
            let scale = grad.div(&this.mul(&this)?.add(&other.mul(&other)?)?)?;

            let grad_self = if ctx.needs(0) {
                Some(scale.mul(&other)?.sum_to_size(ctx.input_shape(0)?)?)
            } else {
                None
            };
            let grad_other = if ctx.needs(1) {
                Some(scale.mul(&this)?.neg()?.sum_to_size(ctx.input_shape(1)?)?)
            } else {
                None
            };

            Ok(vec![grad_self, grad_other])
        });
    table
        .entry("fmod(Tensor self, Tensor other) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.sum_to_size(ctx.input_shape(0)?))
        .not_implemented("other");

    for signature in [
        "gt(Tensor self, Tensor other) -> Tensor",
        "lt(Tensor self, Tensor other) -> Tensor",
        "eq(Tensor self, Tensor other) -> Tensor",
        "zeros_like(Tensor self) -> Tensor",
        "ones_like(Tensor self) -> Tensor",
        "rand_like(Tensor self) -> Tensor",
    ] {
        table.entry(signature).fallthrough();
    }
}
