#[allow(clippy::module_inception)]
mod tuple;

pub use tuple::*;
