//! The Policy Store: an atomically-swapped, lock-free-to-read snapshot
//! pointer.

use std::sync::{Arc, RwLock};

use crate::PolicySnapshot;

/// Holds the single current [`PolicySnapshot`] and replaces it as a
/// whole. `snapshot()` is O(1): a read-lock, an `Arc` clone, and a return
/// — readers never see a mix of old and new rules because the swap is a
/// single pointer write.
pub struct PolicyStore {
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    /// Build a store seeded with `initial`.
    #[must_use]
    pub fn new(initial: PolicySnapshot) -> Self {
        Self { current: RwLock::new(Arc::new(initial)) }
    }

    /// Build a store with an empty snapshot (no rules ever match; every
    /// evaluation falls through to the default-allow branch).
    #[must_use]
    pub fn empty() -> Self {
        Self::new(PolicySnapshot::default())
    }

    /// The current snapshot. Cheap: a shared lock held only long enough
    /// to clone the `Arc`.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current.read().expect("policy store lock poisoned").clone()
    }

    /// Atomically replace the current snapshot. Readers already holding
    /// a clone of the previous `Arc` keep serving it for the remainder of
    /// their evaluation.
    pub fn replace(&self, new: PolicySnapshot) {
        *self.current.write().expect("policy store lock poisoned") = Arc::new(new);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile, parse_document};
    use serde_json::json;
    use superego_core::ToolRequest;

    fn snapshot(yaml: &str) -> PolicySnapshot {
        compile(parse_document(yaml).unwrap()).unwrap()
    }

    #[test]
    fn readers_never_observe_a_mixed_snapshot() {
        let store = PolicyStore::new(snapshot(
            r#"
rules:
  - id: deny-rm
    priority: 1
    conditions:
      tool_name: rm
    action: deny
"#,
        ));

        let held = store.snapshot();
        store.replace(snapshot(
            r#"
rules:
  - id: allow-all
    priority: 1
    conditions:
      tool_name: { regex: ".*" }
    action: allow
"#,
        ));

        let request = ToolRequest::new("rm", json!({}));
        assert!(held.first_match(&request).is_some());
        assert_eq!(held.first_match(&request).unwrap().id, "deny-rm");

        let fresh = store.snapshot();
        assert_eq!(fresh.first_match(&request).unwrap().id, "allow-all");
    }

    #[test]
    fn empty_store_matches_nothing() {
        let store = PolicyStore::empty();
        let request = ToolRequest::new("anything", json!({}));
        assert!(store.snapshot().first_match(&request).is_none());
    }
}
