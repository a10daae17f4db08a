//! Stable string hashing for instance paths, message ids and sockets
//!
//! Hashes are FxHash over the raw bytes using the fixed-width 32/64-bit
//! hashers, so the same string produces the same identifier on every
//! platform and in every run. Content hashed offline matches runtime lookups.

use fxhash::{FxHasher32, FxHasher64};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use tracing::trace;

/// Path separator used by instance identifiers
pub const PATH_SEPARATOR: char = '/';

/// 64-bit identifier (instance paths, message ids, component ids)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash64(pub u64);

/// 32-bit identifier (sockets, input actions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash32(pub u32);

impl Hash64 {
    /// Hash a string
    pub fn new(s: &str) -> Self {
        hash_string64(s)
    }
}

impl Hash32 {
    /// Hash a string
    pub fn new(s: &str) -> Self {
        hash_string32(s)
    }
}

impl fmt::Display for Hash64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match reverse_lookup64(*self) {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "{:#018x}", self.0),
        }
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match reverse_lookup32(*self) {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

// Debug-only registry of hashed strings. Never consulted for correctness.
static REVERSE_ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));
static REVERSE64: OnceLock<Mutex<HashMap<u64, String>>> = OnceLock::new();
static REVERSE32: OnceLock<Mutex<HashMap<u32, String>>> = OnceLock::new();

/// Enable or disable recording of hashed strings for reverse lookup
pub fn enable_reverse_lookup(enabled: bool) {
    REVERSE_ENABLED.store(enabled, Ordering::Relaxed);
}

fn record64(hash: u64, bytes: &[u8]) {
    if !REVERSE_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    if let (Ok(s), Ok(mut map)) = (
        std::str::from_utf8(bytes),
        REVERSE64.get_or_init(Default::default).lock(),
    ) {
        map.entry(hash).or_insert_with(|| s.to_string());
    }
}

fn record32(hash: u32, bytes: &[u8]) {
    if !REVERSE_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    if let (Ok(s), Ok(mut map)) = (
        std::str::from_utf8(bytes),
        REVERSE32.get_or_init(Default::default).lock(),
    ) {
        map.entry(hash).or_insert_with(|| s.to_string());
    }
}

/// Hash arbitrary bytes to a 64-bit identifier
pub fn hash_bytes64(bytes: &[u8]) -> Hash64 {
    let mut hasher = FxHasher64::default();
    hasher.write(bytes);
    let hash = hasher.finish();
    record64(hash, bytes);
    Hash64(hash)
}

/// Hash arbitrary bytes to a 32-bit identifier
pub fn hash_bytes32(bytes: &[u8]) -> Hash32 {
    let mut hasher = FxHasher32::default();
    hasher.write(bytes);
    let hash = hasher.finish() as u32;
    record32(hash, bytes);
    Hash32(hash)
}

/// Hash a string to a 64-bit identifier
pub fn hash_string64(s: &str) -> Hash64 {
    hash_bytes64(s.as_bytes())
}

/// Hash a string to a 32-bit identifier
pub fn hash_string32(s: &str) -> Hash32 {
    hash_bytes32(s.as_bytes())
}

/// Look up the string a 64-bit hash was produced from, if it was recorded
pub fn reverse_lookup64(hash: Hash64) -> Option<String> {
    REVERSE64
        .get()
        .and_then(|m| m.lock().ok().and_then(|map| map.get(&hash.0).cloned()))
}

/// Look up the string a 32-bit hash was produced from, if it was recorded
pub fn reverse_lookup32(hash: Hash32) -> Option<String> {
    REVERSE32
        .get()
        .and_then(|m| m.lock().ok().and_then(|map| map.get(&hash.0).cloned()))
}

/// Namespace of an absolute path: everything up to and including the last separator
///
/// `/level/enemy` has namespace `/level/`, `/player` has namespace `/`.
pub fn namespace_of(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(index) => &path[..=index],
        None => "/",
    }
}

/// Build the absolute path for `path` as seen from `base`
///
/// Absolute paths are returned unchanged, relative paths are joined with the
/// namespace of `base`.
pub fn absolute_path(base: &str, path: &str) -> String {
    if path.starts_with(PATH_SEPARATOR) {
        path.to_string()
    } else {
        let namespace = namespace_of(base);
        let mut absolute = String::with_capacity(namespace.len() + path.len());
        absolute.push_str(namespace);
        absolute.push_str(path);
        absolute
    }
}

/// Resolve a relative or absolute path against the caller's path and hash it
///
/// Resolution never fails; an identifier that matches no instance only
/// surfaces as "not found" when it is looked up.
pub fn resolve_path(base: &str, path: &str) -> Hash64 {
    let absolute = absolute_path(base, path);
    trace!(base = base, path = path, absolute = absolute, "Resolved path");
    hash_string64(&absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_string64("/player"), hash_string64("/player"));
        assert_eq!(hash_string32("main"), hash_string32("main"));
        assert_ne!(hash_string64("/player"), hash_string64("/enemy"));
    }

    #[test]
    fn test_hash_matches_bytes() {
        assert_eq!(hash_string64("ping"), hash_bytes64(b"ping"));
        assert_eq!(hash_string32("ping"), hash_bytes32(b"ping"));
    }

    #[test]
    fn test_reverse_lookup() {
        enable_reverse_lookup(true);
        let hash = hash_string64("reverse_lookup_test");
        assert_eq!(reverse_lookup64(hash).as_deref(), Some("reverse_lookup_test"));
        assert_eq!(hash.to_string(), "reverse_lookup_test");

        // Never hashed, so nothing to find
        assert_eq!(reverse_lookup64(Hash64(1)), None);
    }

    #[test]
    fn test_namespace_of() {
        assert_eq!(namespace_of("/level/enemy"), "/level/");
        assert_eq!(namespace_of("/player"), "/");
        assert_eq!(namespace_of("player"), "/");
    }

    #[test]
    fn test_resolve_path() {
        // Absolute paths hash directly
        assert_eq!(resolve_path("/level/a", "/level/b"), hash_string64("/level/b"));

        // Relative paths are joined with the caller's namespace
        assert_eq!(resolve_path("/level/a", "b"), hash_string64("/level/b"));
        assert_eq!(resolve_path("/a", "b"), hash_string64("/b"));
    }
}
