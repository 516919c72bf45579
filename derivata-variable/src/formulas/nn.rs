use crate::registry::RegistryBuilder;

pub(super) fn register(table: &mut RegistryBuilder) {
    table
        .entry("softmax(Tensor self, int dim) -> Tensor")
        .grad("self", |ctx| {
            ctx.grad()?
                .softmax_backward_data(&ctx.result()?, ctx.usize("dim")?)
        });
    table
        .entry("log_softmax(Tensor self, int dim) -> Tensor")
        .grad("self", |ctx| {
            ctx.grad()?
                .log_softmax_backward_data(&ctx.result()?, ctx.usize("dim")?)
        });

    // ~~~~ Double backward ~~~~
    //
    // The backward primitives above are operations of their own, so that gradients computed with
    // `create_graph` can be differentiated again.

    table
        .entry("sigmoid_backward(Tensor grad_output, Tensor output) -> Tensor")
        .grad("grad_output", |ctx| {
            ctx.grad()?.sigmoid_backward(&ctx.var("output")?)
        })
        .grad("output", |ctx| {
            // d/do [g * o * (1 - o)] = g * (1 - 2o)
            let output = ctx.var("output")?;
            let slope = output.mul_scalar(-2.)?.add_scalar(1.)?;
            ctx.grad()?.mul(&ctx.var("grad_output")?)?.mul(&slope)
        });
    table
        .entry("tanh_backward(Tensor grad_output, Tensor output) -> Tensor")
        .grad("grad_output", |ctx| {
            ctx.grad()?.tanh_backward(&ctx.var("output")?)
        })
        .grad("output", |ctx| {
            // d/do [g * (1 - o^2)] = -2 * g * o
            let output = ctx.var("output")?;
            ctx.grad()?
                .mul(&ctx.var("grad_output")?)?
                .mul(&output)?
                .mul_scalar(-2.)
        });
    table
        .entry("_softmax_backward_data(Tensor grad_output, Tensor output, int dim) -> Tensor")
        .grad("grad_output", |ctx| {
            ctx.grad()?
                .softmax_backward_data(&ctx.var("output")?, ctx.usize("dim")?)
        })
        .grad("output", |ctx| {
            // r = o * (g - sum(g * o)), so the vjp with v is
            // v * g - v * sum(g * o) - g * sum(v * o).
            let (grad_output, output) = (ctx.var("grad_output")?, ctx.var("output")?);
            let dim = ctx.usize("dim")?;
            let grad = ctx.grad()?;

            let dot_go = grad_output.mul(&output)?.sum_dim(&[dim], true)?;
            let dot_vo = grad.mul(&output)?.sum_dim(&[dim], true)?;
            grad.mul(&grad_output)?
                .sub(&grad.mul(&dot_go)?)?
                .sub(&grad_output.mul(&dot_vo)?)
        });
    table
        .entry("_log_softmax_backward_data(Tensor grad_output, Tensor output, int dim) -> Tensor")
        .grad("grad_output", |ctx| {
            // r = g - exp(o) * sum(g), so the vjp with v is v - sum(v * exp(o)).
            let dim = ctx.usize("dim")?;
            let grad = ctx.grad()?;
            let weighted = grad.mul(&ctx.var("output")?.exp()?)?.sum_dim(&[dim], true)?;
            grad.sub(&weighted)
        })
        .grad("output", |ctx| {
            let dim = ctx.usize("dim")?;
            let total = ctx.var("grad_output")?.sum_dim(&[dim], true)?;
            total
                .mul(&ctx.var("output")?.exp()?)?
                .mul(&ctx.grad()?)?
                .neg()
        });
}
