mod lock_manager;
mod log;
#[allow(clippy::module_inception)]
mod transaction;

pub use lock_manager::*;
pub use log::*;
pub use transaction::*;
