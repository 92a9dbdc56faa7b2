//! Fingerprint store for incremental crawling
//!
//! This module persists what the crawler learned about each resource between
//! runs:
//! - Key/value fingerprints per resource identifier
//! - The children each container produced when it was last unwrapped
//! - A SQLite backend and an in-memory map
//! - A container-scoped view handed to unwrappers

mod memory;
mod schema;
mod scoped;
mod sqlite;
mod traits;

pub use memory::FingerprintMap;
pub use scoped::ScopedFingerprints;
pub use sqlite::SqliteFingerprintStore;
pub use traits::{FingerprintStore, StoreError, StoreResult};

/// Key under which the crawler stores a top-level resource's fingerprint
pub const FINGERPRINT_KEY: &str = "fingerprint";

/// Key under which unwrappers store a child's content hash
pub const CONTENT_HASH_KEY: &str = "content-hash";

/// Computes the hex-encoded SHA-256 digest of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Classification of a resource against its previous fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Change {
    /// No fingerprint was recorded before
    New,
    /// A different fingerprint was recorded before
    Changed,
    /// The same fingerprint was recorded before
    Unchanged,
}

/// Compares `value` with the fingerprint stored under `key` and records it
///
/// The new value is stored unless the resource is unchanged.
pub fn classify(
    store: &mut dyn FingerprintStore,
    id: &str,
    key: &str,
    value: &str,
) -> StoreResult<Change> {
    let change = match store.get(id, key) {
        None => Change::New,
        Some(previous) if previous == value => Change::Unchanged,
        Some(_) => Change::Changed,
    };

    if change != Change::Unchanged {
        store.put(id, key, value)?;
    }

    Ok(change)
}
