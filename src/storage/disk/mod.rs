mod disk_manager;
mod disk_scheduler;
mod heap_file;

pub use disk_manager::*;
pub use disk_scheduler::*;
pub use heap_file::*;
