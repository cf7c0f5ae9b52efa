//! Collection pacing and root tracking for the Quartz runtime.
//!
//! Values are reference counted, so there is no tracing collector to run;
//! what this crate owns is the surface the runtime exposes around
//! collection:
//!
//! - an explicit [`RootSet`] of values pinned by the bootstrapper and
//!   embedders,
//! - a weak tracking list that `collect` prunes, giving the runtime its
//!   notion of "swept" objects,
//! - the allocation interval that paces how much allocation is allowed
//!   between collections.
//!
//! All state lives in one process-wide [`Collector`], reached through
//! [`collector()`].

pub mod roots;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use parking_lot::Mutex;
use quartz_core::{QuartzError, Result, Value, WeakValue};
use tracing::debug;

pub use roots::RootSet;

/// Allocation interval used until an embedder overrides it.
pub const DEFAULT_INTERVAL: u64 = 0x10000;

/// Result of one collection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    /// Tracked entries whose payloads were already dropped.
    pub swept: usize,
    /// Tracked entries still alive.
    pub live: usize,
    /// Allocation pressure accumulated since the previous pass.
    pub pressure: u64,
}

/// Process-wide collector state.
pub struct Collector {
    roots: RootSet,
    tracked: Mutex<Vec<WeakValue>>,
    interval: AtomicU64,
    pressure: AtomicU64,
    passes: AtomicU64,
}

static COLLECTOR: LazyLock<Collector> = LazyLock::new(Collector::new);

/// The process-wide collector.
pub fn collector() -> &'static Collector {
    &COLLECTOR
}

impl Default for Collector {
    fn default() -> Collector {
        Collector::new()
    }
}

impl Collector {
    pub fn new() -> Collector {
        Collector {
            roots: RootSet::new(),
            tracked: Mutex::new(Vec::new()),
            interval: AtomicU64::new(DEFAULT_INTERVAL),
            pressure: AtomicU64::new(0),
            passes: AtomicU64::new(0),
        }
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    /// Shorthand for rooting a value.
    pub fn root(&self, value: Value) {
        self.roots.register(value);
    }

    /// Shorthand for unrooting a value by identity.
    pub fn unroot(&self, value: &Value) -> bool {
        self.roots.unregister(value)
    }

    /// Start tracking a mutable heap value; `collect` later reports whether
    /// it was swept. Immutable and scalar values are not trackable and are
    /// ignored.
    pub fn track(&self, value: &Value) {
        if let Some(weak) = value.downgrade() {
            self.tracked.lock().push(weak);
        }
    }

    /// Current allocation interval in bytes.
    pub fn interval(&self) -> u64 {
        self.interval.load(Ordering::Relaxed)
    }

    /// Replace the allocation interval, returning the previous value.
    /// Negative intervals are out of range.
    pub fn set_interval(&self, interval: i64) -> Result<u64> {
        if interval < 0 {
            return Err(QuartzError::range(format!(
                "gc interval must be non-negative, got {interval}"
            )));
        }
        let old = self.interval.swap(interval as u64, Ordering::Relaxed);
        debug!(old, new = interval, "gc interval changed");
        Ok(old)
    }

    /// Record allocation pressure. Returns true once the accumulated
    /// pressure crosses the interval, hinting the caller to `collect`.
    pub fn note_allocation(&self, bytes: u64) -> bool {
        let total = self.pressure.fetch_add(bytes, Ordering::Relaxed) + bytes;
        total >= self.interval.load(Ordering::Relaxed)
    }

    /// Completed collection passes.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run one pass: prune dead tracked entries and reset the pressure
    /// counter.
    pub fn collect(&self) -> CollectStats {
        let mut tracked = self.tracked.lock();
        let before = tracked.len();
        tracked.retain(WeakValue::is_alive);
        let live = tracked.len();
        drop(tracked);
        let stats = CollectStats {
            swept: before - live,
            live,
            pressure: self.pressure.swap(0, Ordering::Relaxed),
        };
        self.passes.fetch_add(1, Ordering::Relaxed);
        debug!(swept = stats.swept, live = stats.live, "gc pass");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_set_get_and_range_error() {
        let c = Collector::new();
        assert_eq!(c.interval(), DEFAULT_INTERVAL);
        let old = c.set_interval(1234).unwrap();
        assert_eq!(old, DEFAULT_INTERVAL);
        assert_eq!(c.interval(), 1234);
        let err = c.set_interval(-1).unwrap_err();
        assert!(matches!(err, QuartzError::Range(_)));
        assert_eq!(c.interval(), 1234);
    }

    #[test]
    fn collect_prunes_dead_tracked_values() {
        let c = Collector::new();
        let keep = Value::array(vec![Value::Number(1.0)]);
        let drop_me = Value::array(vec![Value::Number(2.0)]);
        c.track(&keep);
        c.track(&drop_me);
        drop(drop_me);
        let stats = c.collect();
        assert_eq!(stats.swept, 1);
        assert_eq!(stats.live, 1);
        drop(keep);
        let stats = c.collect();
        assert_eq!(stats.swept, 1);
        assert_eq!(stats.live, 0);
        assert_eq!(c.passes(), 2);
    }

    #[test]
    fn rooted_values_stay_alive() {
        let c = Collector::new();
        let v = Value::table(Default::default());
        let weak = v.downgrade().unwrap();
        c.root(v.clone());
        c.track(&v);
        drop(v);
        c.collect();
        assert!(weak.is_alive());
        let strong = weak.upgrade_value().unwrap();
        assert!(c.unroot(&strong));
        drop(strong);
        c.collect();
        assert!(!weak.is_alive());
    }

    #[test]
    fn pressure_crosses_interval() {
        let c = Collector::new();
        c.set_interval(100).unwrap();
        assert!(!c.note_allocation(10));
        assert!(c.note_allocation(200));
        let stats = c.collect();
        assert_eq!(stats.pressure, 210);
        assert!(!c.note_allocation(10));
    }

    #[test]
    fn global_collector_is_shared() {
        let a = collector() as *const Collector;
        let b = collector() as *const Collector;
        assert_eq!(a, b);
    }
}
