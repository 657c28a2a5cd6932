//! Change tracking primitives shared by every CPU-side resource.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a CPU-side resource.
///
/// Device caches are keyed by this id, never by handle or address, so a
/// resource moved between containers keeps its device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic content version of a resource.
///
/// Caches store the version they last uploaded and compare it with the
/// current one; a fresh tracker starts at 0 and every edit moves it on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeTracker(u64);

impl ChangeTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn changed(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    #[inline]
    #[must_use]
    pub fn version(self) -> u64 {
        self.0
    }

    /// Whether an edit happened after `seen` was recorded.
    #[inline]
    #[must_use]
    pub fn is_newer_than(self, seen: u64) -> bool {
        self.0 != seen
    }
}

/// Mutable access to resource data that counts as one edit when released.
pub struct MutGuard<'a, T> {
    data: &'a mut T,
    tracker: &'a mut ChangeTracker,
}

impl<'a, T> MutGuard<'a, T> {
    pub fn new(data: &'a mut T, tracker: &'a mut ChangeTracker) -> Self {
        Self { data, tracker }
    }
}

impl<T> std::ops::Deref for MutGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.data
    }
}

impl<T> std::ops::DerefMut for MutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data
    }
}

impl<T> Drop for MutGuard<'_, T> {
    fn drop(&mut self) {
        self.tracker.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_bumps_on_drop() {
        let mut data = 1u32;
        let mut tracker = ChangeTracker::new();
        {
            let mut g = MutGuard::new(&mut data, &mut tracker);
            *g = 2;
        }
        assert_eq!(data, 2);
        assert_eq!(tracker.version(), 1);
        assert!(tracker.is_newer_than(0));
        assert!(!tracker.is_newer_than(1));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ResourceId::next(), ResourceId::next());
    }
}
