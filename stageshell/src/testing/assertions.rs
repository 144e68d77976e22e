//! Orchestrator-view assertions over a metadata store.
//!
//! These check exactly what an orchestrator would observe in a working
//! directory after the process exits: which markers exist and which do not.

use crate::store::{MetadataKey, MetadataStore};

/// Asserts that a store shows a completed invocation: outs and the
/// completion marker present, no failure marker.
pub fn assert_invocation_completed(store: &dyn MetadataStore) {
    assert!(
        store.exists(&MetadataKey::Complete),
        "Expected completion marker, but it is missing"
    );
    assert!(
        store.exists(&MetadataKey::Outs),
        "Completion marker present without an outs entry"
    );
    assert!(
        !store.exists(&MetadataKey::Errors),
        "Expected no failure marker on a completed invocation"
    );
}

/// Asserts that a store shows a failed invocation: failure record present,
/// no completion marker and no outs entry.
pub fn assert_invocation_failed(store: &dyn MetadataStore) {
    assert!(
        store.exists(&MetadataKey::Errors),
        "Expected failure marker, but it is missing"
    );
    assert!(
        !store.exists(&MetadataKey::Complete),
        "Expected no completion marker on a failed invocation"
    );
    assert!(
        !store.exists(&MetadataKey::Outs),
        "Partial outs must not be exposed on a failed invocation"
    );
}
