//! Object Store Mirrors.
//!
//! A thin, named wrapper over `kube::runtime::reflector::Store` — the
//! idiomatic kube-rs informer cache. Workers treat it as a read-only hint
//! and always re-fetch via Get when it matters for correctness; writers are
//! the reflector's own watch stream, never application code.

use kube::runtime::reflector::{ObjectRef, Store};
use kube::Resource;
use std::fmt::Debug;
use std::hash::Hash;

/// Typed mirror for one resource kind.
#[derive(Clone)]
pub struct Mirror<K: Resource + 'static>
where
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
}

impl<K> Mirror<K>
where
    K: Resource + Clone + Debug + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
{
    pub fn new(store: Store<K>) -> Self {
        Mirror { store }
    }

    /// Cache lookup by namespace/name. Never blocks; never talks to the API
    /// server. Correctness-sensitive call sites must re-`Get` instead.
    pub fn get(&self, namespace: Option<&str>, name: &str) -> Option<std::sync::Arc<K>> {
        let mut key = ObjectRef::new(name);
        if let Some(ns) = namespace {
            key = key.within(ns);
        }
        self.store.get(&key)
    }

    pub fn state(&self) -> Vec<std::sync::Arc<K>> {
        self.store.state()
    }
}
