//! Scope bookkeeping.
//!
//! A scope is pushed onto the [`ScopeStack`] of its call chain for as long as a
//! frame runs with it. The frame that opened the scope also holds an owning
//! guard; frames that reuse it only hold a stack entry.

mod guard;
mod stack;

pub(crate) use guard::OwnedScope;
pub use stack::{ScopeStack, StackEntry};
