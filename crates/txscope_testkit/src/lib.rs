//! # txscope Testkit
//!
//! Test utilities for txscope.
//!
//! This crate provides:
//! - In-memory resource providers (blocking and async) with an event journal
//! - Scripted failure injection for open, commit and rollback
//! - Fixtures for registries, wrappers and option files
//! - Property-based test generators using proptest
//! - Concurrent call-chain stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use txscope_testkit::prelude::*;
//!
//! #[test]
//! fn commits_once() {
//!     let env = MemoryEnv::new();
//!     let save = env.wrap_with(Propagation::Required);
//!     save.call_root(|frame| frame.scope().unwrap().put("k", "v")).unwrap();
//!     assert_eq!(env.provider.journal().commits(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod async_memory;
pub mod fixtures;
pub mod generators;
pub mod journal;
pub mod memory;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::async_memory::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::journal::*;
    pub use crate::memory::*;
    pub use crate::stress::*;
    pub use txscope_core::{Propagation, TransactionOptions};
}

pub use async_memory::*;
pub use fixtures::*;
pub use generators::*;
pub use journal::*;
pub use memory::*;
pub use stress::*;
