//! Benchmark helpers for txscope.

pub mod utils;
