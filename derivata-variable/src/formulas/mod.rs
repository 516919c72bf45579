//! The declarative derivative table.
//!
//! Each entry pairs an operation signature with the formula of every differentiable input. The
//! formulas are written with differentiable operations, so the gradients they produce can be
//! differentiated again.

mod helpers;
mod linalg;
mod nn;
mod pointwise;
mod reduction;
mod shape;

use crate::{
    registry::{Registry, RegistryBuilder, RegistryConfig},
    Result,
};

/// Compiles the whole table.
///
/// # Arguments
///
/// * `config` - compilation settings, such as whether stub gradients are allowed.
pub fn registry(config: RegistryConfig) -> Result<Registry> {
    let mut table = RegistryBuilder::new(config);
    pointwise::register(&mut table);
    reduction::register(&mut table);
    shape::register(&mut table);
    linalg::register(&mut table);
    nn::register(&mut table);

    table.build()
}
