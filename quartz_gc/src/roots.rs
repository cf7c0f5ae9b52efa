//! Explicit root registration.
//!
//! The collector owns the root set: embedders and the bootstrapper register
//! values that must stay reachable (the core environment, long-lived host
//! handles) and unregister them when done. Roots hold strong references, so
//! a rooted value can never be swept out from under an embedder.

use parking_lot::Mutex;
use quartz_core::Value;

/// The set of explicitly registered roots.
#[derive(Default)]
pub struct RootSet {
    values: Mutex<Vec<Value>>,
}

impl RootSet {
    pub fn new() -> RootSet {
        RootSet::default()
    }

    /// Register a value as a root. Registering the same value twice keeps
    /// two entries; each `unregister` removes one.
    pub fn register(&self, value: Value) {
        self.values.lock().push(value);
    }

    /// Remove one occurrence of `value`, matched by identity. Returns
    /// whether anything was removed.
    pub fn unregister(&self, value: &Value) -> bool {
        let mut values = self.values.lock();
        match values.iter().position(|v| v.identical(value)) {
            Some(i) => {
                values.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Snapshot of the current roots.
    pub fn snapshot(&self) -> Vec<Value> {
        self.values.lock().clone()
    }

    /// Is `value` (by identity) currently rooted?
    pub fn contains(&self, value: &Value) -> bool {
        self.values.lock().iter().any(|v| v.identical(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_by_identity() {
        let roots = RootSet::new();
        let a = Value::array(vec![Value::Number(1.0)]);
        let twin = Value::array(vec![Value::Number(1.0)]);
        roots.register(a.clone());
        assert_eq!(roots.len(), 1);
        assert!(roots.contains(&a));
        // Structural twins are not the same root.
        assert!(!roots.contains(&twin));
        assert!(!roots.unregister(&twin));
        assert!(roots.unregister(&a));
        assert!(roots.is_empty());
    }

    #[test]
    fn duplicate_roots_pop_one_at_a_time() {
        let roots = RootSet::new();
        let v = Value::table(Default::default());
        roots.register(v.clone());
        roots.register(v.clone());
        assert_eq!(roots.len(), 2);
        assert!(roots.unregister(&v));
        assert_eq!(roots.len(), 1);
        assert!(roots.unregister(&v));
        assert!(!roots.unregister(&v));
    }
}
