//! Deduplicated warnings.
//!
//! Resource warnings fire from hot paths (every frame an oversized texture
//! is drawn, for example). Each distinct message is logged once per process.

use std::hash::BuildHasher;
use std::sync::LazyLock;

use parking_lot::Mutex;
use rustc_hash::{FxBuildHasher, FxHashSet};

static SEEN: LazyLock<Mutex<FxHashSet<u64>>> = LazyLock::new(|| Mutex::new(FxHashSet::default()));

/// Logs `message` at warn level unless the same `(target, message)` pair was
/// logged before. Returns `true` when the message was emitted.
pub fn warn_once(target: &str, message: &str) -> bool {
    let key = FxBuildHasher.hash_one((target, message));
    let fresh = SEEN.lock().insert(key);
    if fresh {
        log::warn!(target: "kiln", "[{target}] {message}");
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_identical_warning_is_suppressed() {
        assert!(warn_once("warn_once_test", "first"));
        assert!(!warn_once("warn_once_test", "first"));
        assert!(warn_once("warn_once_test", "second"));
    }
}
