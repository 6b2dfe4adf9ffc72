mod buffer_pool;
mod lru_list;

pub use buffer_pool::*;
pub use lru_list::*;
