use crate::registry::RegistryBuilder;

pub(super) fn register(table: &mut RegistryBuilder) {
    table
        .entry("mm(Tensor self, Tensor mat2) -> Tensor")
        .grad("self", |ctx| ctx.grad()?.mm(&ctx.var("mat2")?.t()?))
        .grad("mat2", |ctx| ctx.var("self")?.t()?.mm(&ctx.grad()?));
}
