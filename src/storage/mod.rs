pub mod disk;
pub mod page;
mod page_store;

pub use page_store::*;
