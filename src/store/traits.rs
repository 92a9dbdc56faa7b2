//! Fingerprint store trait and error types
//!
//! This module defines the trait interface for fingerprint stores and
//! associated error types.

use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur during fingerprint store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Identifier {id} is outside the scope of {scope}")]
    OutOfScope { id: String, scope: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Result type for fingerprint store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for fingerprint store implementations
///
/// A fingerprint store maps each resource identifier to a set of key/value
/// pairs plus a set of referred identifiers (the children a container produced
/// the last time it was unwrapped). It survives between crawl runs and is how
/// the crawler tells new, changed, unchanged and removed resources apart.
///
/// An identifier with no keys and no referred identifiers is not known.
/// Mutations take effect in memory immediately; only [`load`](Self::load) and
/// [`store`](Self::store) touch persistent state.
pub trait FingerprintStore {
    /// Returns true if the store holds any key or referred identifier for `id`
    fn is_known(&self, id: &str) -> bool;

    /// Gets the value stored under `key` for `id`
    fn get(&self, id: &str, key: &str) -> Option<&str>;

    /// Stores `value` under `key` for `id`, replacing any previous value
    fn put(&mut self, id: &str, key: &str, value: &str) -> StoreResult<()>;

    /// Removes a single key of `id`
    fn remove_key(&mut self, id: &str, key: &str) -> StoreResult<()>;

    /// Removes all keys and referred identifiers of `id`
    ///
    /// Entries referred to by `id` are left untouched.
    fn remove(&mut self, id: &str) -> StoreResult<()>;

    /// Records that `id` refers to `referred_id`
    fn put_referred_id(&mut self, id: &str, referred_id: &str) -> StoreResult<()>;

    /// Gets the identifiers `id` refers to
    fn referred_ids(&self, id: &str) -> Option<&BTreeSet<String>>;

    /// Removes all referred identifiers of `id`
    fn remove_referred_ids(&mut self, id: &str) -> StoreResult<()>;

    /// Returns every known identifier
    fn known_ids(&self) -> BTreeSet<String>;

    /// Returns the number of known identifiers
    fn len(&self) -> usize;

    /// Returns true if no identifier is known
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the in-memory state with the persisted state
    fn load(&mut self) -> StoreResult<()>;

    /// Persists the in-memory state
    fn store(&mut self) -> StoreResult<()>;
}
