//! Data models shared across crates.

mod catalog;

pub use catalog::*;
