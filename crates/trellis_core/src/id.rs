//! Process-wide unique identifiers
//!
//! Node uuids come from one lazily initialised cache of issued ids.
//! Generation retries a bounded number of times on a collision and then
//! falls back to a counter suffix, so it always terminates.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

/// Attempts before falling back to a counter suffix
const MAX_ATTEMPTS: usize = 8;

static ISSUED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
static FALLBACK: AtomicU64 = AtomicU64::new(0);

fn issued() -> &'static Mutex<HashSet<String>> {
    ISSUED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Generate a new id that has not been issued in this process
pub fn make_id() -> String {
    make_id_with(|| Uuid::new_v4().to_string())
}

/// Generate an id from a custom candidate source
pub fn make_id_with(mut candidate: impl FnMut() -> String) -> String {
    let mut cache = issued().lock().unwrap_or_else(|e| e.into_inner());
    for _ in 0..MAX_ATTEMPTS {
        let id = candidate();
        if cache.insert(id.clone()) {
            return id;
        }
    }

    // Counter suffixes are unique per process, but may still collide with a
    // candidate issued earlier, so keep bumping until the insert succeeds.
    let base = candidate();
    loop {
        let id = format!("{}-{}", base, FALLBACK.fetch_add(1, Ordering::Relaxed));
        if cache.insert(id.clone()) {
            log::debug!("Id generator fell back to counter suffix: {}", id);
            return id;
        }
    }
}

/// Whether an id has been issued since the last reset
pub fn is_issued(id: &str) -> bool {
    issued().lock().unwrap_or_else(|e| e.into_inner()).contains(id)
}

/// Forget every issued id
pub fn reset_ids() {
    issued().lock().unwrap_or_else(|e| e.into_inner()).clear();
}
