//! Core data types shared by the allocation table and its callers

pub mod point;
pub mod temporal;

pub use point::*;
pub use temporal::*;
