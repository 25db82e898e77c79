//! Storage layer: block pointers, the allocation table and its collaborators

pub mod allocation_table;
pub mod block_pointer;
pub mod payload;
pub mod stream;

pub use allocation_table::*;
pub use block_pointer::*;
pub use payload::*;
pub use stream::*;
