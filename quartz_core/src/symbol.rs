//! Process-wide symbol interning and `gensym`.
//!
//! Every symbol and keyword name that enters the runtime (reader, assembler,
//! binding tables) is interned here. `gensym` relies on that: a generated
//! name is checked against the interner and then claimed, so it can never
//! collide with a name the process has already seen or will generate again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashSet;

static INTERNED: LazyLock<DashSet<Arc<str>>> = LazyLock::new(DashSet::new);
static GENSYM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Intern `name`, returning a shared allocation.
pub fn intern(name: &str) -> Arc<str> {
    if let Some(existing) = INTERNED.get(name) {
        return existing.key().clone();
    }
    let arc: Arc<str> = Arc::from(name);
    // Two threads may race here; both end up with an interned entry and a
    // valid Arc, at worst one transient duplicate allocation.
    INTERNED.insert(arc.clone());
    match INTERNED.get(name) {
        Some(existing) => existing.key().clone(),
        None => arc,
    }
}

/// Has this exact name been interned?
pub fn is_interned(name: &str) -> bool {
    INTERNED.contains(name)
}

/// Fresh symbol name, guaranteed distinct from every interned name.
pub fn gensym() -> Arc<str> {
    loop {
        let n = GENSYM_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = format!("_g{n:06x}");
        if !is_interned(&candidate) {
            return intern(&candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_allocations() {
        let a = intern("shared-name");
        let b = intern("shared-name");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn gensym_skips_taken_names() {
        // Claim a name shaped like the generator's output, then make sure
        // generated symbols avoid it.
        intern("_g000000");
        for _ in 0..8 {
            let fresh = gensym();
            assert_ne!(&*fresh, "_g000000");
            assert!(is_interned(&fresh));
        }
    }

    #[test]
    fn gensyms_are_distinct() {
        let a = gensym();
        let b = gensym();
        assert_ne!(a, b);
    }
}
