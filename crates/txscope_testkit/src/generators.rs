//! Property-based test generators using proptest.

use proptest::prelude::*;
use std::time::Duration;
use txscope_core::{FailureClass, Propagation, RollbackRules, TransactionOptions};

/// Strategy over the implemented propagation modes.
pub fn propagation_strategy() -> impl Strategy<Value = Propagation> {
    prop::sample::select(Propagation::IMPLEMENTED.to_vec())
}

/// Strategy over every propagation mode, including the reserved ones.
pub fn any_propagation_strategy() -> impl Strategy<Value = Propagation> {
    prop::sample::select(Propagation::ALL.to_vec())
}

/// Strategy over failure classes.
pub fn failure_class_strategy() -> impl Strategy<Value = FailureClass> {
    prop_oneof![
        Just(FailureClass::Provider),
        Just(FailureClass::Timeout),
        Just(FailureClass::Transaction),
        prop::string::string_regex("[a-z]{1,12}")
            .expect("Invalid regex")
            .prop_map(|name| FailureClass::application(name)),
    ]
}

/// Strategy over rollback rules.
pub fn rollback_rules_strategy() -> impl Strategy<Value = RollbackRules> {
    prop_oneof![
        Just(RollbackRules::All),
        prop::collection::vec(failure_class_strategy(), 0..4)
            .prop_map(|classes| RollbackRules::only(classes)),
    ]
}

/// Strategy over valid options with short backoffs and no deadline.
pub fn options_strategy() -> impl Strategy<Value = TransactionOptions> {
    (
        propagation_strategy(),
        any::<bool>(),
        prop::option::of(prop::sample::select(vec![
            "READ COMMITTED",
            "REPEATABLE READ",
            "SERIALIZABLE",
        ])),
        0u32..4,
        1u64..5,
        rollback_rules_strategy(),
    )
        .prop_map(|(propagation, read_only, isolation, retries, backoff_ms, rules)| {
            let mut builder = TransactionOptions::builder()
                .propagation(propagation)
                .read_only(read_only)
                .retry_count(retries)
                .retry_backoff(Duration::from_millis(backoff_ms))
                .rollback_for(rules);
            if let Some(level) = isolation {
                builder = builder.isolation_level(level);
            }
            builder.build().expect("Generated options must be valid")
        })
}

/// Strategy over chains of propagation modes for nested calls.
pub fn nesting_strategy(max_depth: usize) -> impl Strategy<Value = Vec<Propagation>> {
    prop::collection::vec(propagation_strategy(), 1..=max_depth)
}
