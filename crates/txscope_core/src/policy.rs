//! Propagation decision table.
//!
//! [`decide`] is a pure function: given the scope active in the current call
//! chain (if any) and the requested [`Propagation`], it returns what the
//! orchestrator must do. It has no side effects and needs no coordination.
//!
//! | mode          | scope present | scope absent            |
//! |---------------|---------------|-------------------------|
//! | REQUIRED      | reuse         | create new              |
//! | REQUIRES_NEW  | create new    | create new              |
//! | SUPPORTS      | reuse         | proceed without scope   |
//! | NEVER         | reject        | proceed without scope   |
//! | MANDATORY     | reuse         | reject                  |
//!
//! `NESTED` and `NOT_SUPPORTED` are reserved and always rejected.

use std::fmt;

use crate::types::Propagation;

/// Outcome of a propagation decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<S> {
    /// Join the existing scope without owning it.
    Reuse(S),
    /// Open a fresh scope owned by this call.
    CreateNew,
    /// Run the body without a scope.
    ProceedWithoutScope,
    /// Fail without running the body.
    Reject(RejectReason),
}

impl<S> Action<S> {
    /// Returns a short label for logging.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Action::Reuse(_) => "reuse",
            Action::CreateNew => "create_new",
            Action::ProceedWithoutScope => "proceed_without_scope",
            Action::Reject(_) => "reject",
        }
    }

    /// Drops the payload of a `Reuse` action.
    pub fn kind(&self) -> Action<()> {
        match self {
            Action::Reuse(_) => Action::Reuse(()),
            Action::CreateNew => Action::CreateNew,
            Action::ProceedWithoutScope => Action::ProceedWithoutScope,
            Action::Reject(reason) => Action::Reject(*reason),
        }
    }
}

/// Why a call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// A scope exists but `NEVER` forbids it.
    ScopeForbidden,
    /// No scope exists but `MANDATORY` requires one.
    ScopeRequired,
    /// The mode is reserved and has no decision-table entry.
    Unsupported,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::ScopeForbidden => "scope exists but NEVER propagation forbids it",
            RejectReason::ScopeRequired => {
                "no scope exists but MANDATORY propagation requires one"
            }
            RejectReason::Unsupported => "propagation mode is reserved and not supported",
        })
    }
}

/// Decides what to do for `mode` given the `existing` scope.
pub fn decide<S>(existing: Option<S>, mode: Propagation) -> Action<S> {
    match (mode, existing) {
        (Propagation::Required, Some(scope)) => Action::Reuse(scope),
        (Propagation::Required, None) => Action::CreateNew,

        (Propagation::RequiresNew, _) => Action::CreateNew,

        (Propagation::Supports, Some(scope)) => Action::Reuse(scope),
        (Propagation::Supports, None) => Action::ProceedWithoutScope,

        (Propagation::Never, Some(_)) => Action::Reject(RejectReason::ScopeForbidden),
        (Propagation::Never, None) => Action::ProceedWithoutScope,

        (Propagation::Mandatory, Some(scope)) => Action::Reuse(scope),
        (Propagation::Mandatory, None) => Action::Reject(RejectReason::ScopeRequired),

        (Propagation::Nested | Propagation::NotSupported, _) => {
            Action::Reject(RejectReason::Unsupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn expected(mode: Propagation, present: bool) -> Action<()> {
        match (mode, present) {
            (Propagation::Required, true) => Action::Reuse(()),
            (Propagation::Required, false) => Action::CreateNew,
            (Propagation::RequiresNew, _) => Action::CreateNew,
            (Propagation::Supports, true) => Action::Reuse(()),
            (Propagation::Supports, false) => Action::ProceedWithoutScope,
            (Propagation::Never, true) => Action::Reject(RejectReason::ScopeForbidden),
            (Propagation::Never, false) => Action::ProceedWithoutScope,
            (Propagation::Mandatory, true) => Action::Reuse(()),
            (Propagation::Mandatory, false) => Action::Reject(RejectReason::ScopeRequired),
            (_, _) => Action::Reject(RejectReason::Unsupported),
        }
    }

    #[test]
    fn full_decision_table() {
        for mode in Propagation::ALL {
            for present in [true, false] {
                let existing = present.then_some(());
                assert_eq!(
                    decide(existing, mode),
                    expected(mode, present),
                    "mode={mode} present={present}"
                );
            }
        }
    }

    #[test]
    fn reuse_returns_the_existing_scope() {
        assert_eq!(decide(Some(7u32), Propagation::Required), Action::Reuse(7));
        assert_eq!(decide(Some(7u32), Propagation::Mandatory), Action::Reuse(7));
    }

    #[test]
    fn requires_new_ignores_existing() {
        assert_eq!(decide(Some(7u32), Propagation::RequiresNew), Action::CreateNew);
    }

    #[test]
    fn reserved_modes_are_rejected() {
        for mode in [Propagation::Nested, Propagation::NotSupported] {
            assert_eq!(
                decide(None::<u32>, mode),
                Action::Reject(RejectReason::Unsupported)
            );
        }
    }

    #[test]
    fn reject_messages() {
        assert!(RejectReason::ScopeForbidden.to_string().contains("NEVER"));
        assert!(RejectReason::ScopeRequired.to_string().contains("MANDATORY"));
    }

    proptest! {
        #[test]
        fn decide_matches_table(idx in 0usize..7, present in any::<bool>(), payload in any::<u64>()) {
            let mode = Propagation::ALL[idx];
            let action = decide(present.then_some(payload), mode);
            prop_assert_eq!(action.kind(), expected(mode, present));
            if let Action::Reuse(scope) = action {
                prop_assert_eq!(scope, payload);
            }
        }
    }
}
