//! Indexing for block lookups by point and time

pub mod temporal;

pub use temporal::*;
