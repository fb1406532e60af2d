//! CLI command implementations.

pub mod check;
pub mod simulate;
pub mod table;
