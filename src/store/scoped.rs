//! Fingerprint store view limited to one container

use crate::id;
use crate::store::traits::{FingerprintStore, StoreError, StoreResult};
use std::collections::BTreeSet;

/// A view of a fingerprint store restricted to the resources nested inside
/// one container
///
/// Unwrappers receive this view instead of the whole store. Reads outside the
/// scope see nothing and writes outside it fail with
/// [`StoreError::OutOfScope`]. Persistence is not available through the view.
pub struct ScopedFingerprints<'a> {
    inner: &'a mut dyn FingerprintStore,
    scope: &'a str,
}

impl<'a> ScopedFingerprints<'a> {
    /// Creates a view over the resources nested inside `scope`
    pub fn new(inner: &'a mut dyn FingerprintStore, scope: &'a str) -> Self {
        Self { inner, scope }
    }

    /// Identifier of the container this view is limited to
    pub fn scope(&self) -> &str {
        self.scope
    }

    fn contains(&self, id: &str) -> bool {
        id::is_within(id, self.scope)
    }

    fn check(&self, id: &str) -> StoreResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(StoreError::OutOfScope {
                id: id.to_string(),
                scope: self.scope.to_string(),
            })
        }
    }
}

impl FingerprintStore for ScopedFingerprints<'_> {
    fn is_known(&self, id: &str) -> bool {
        self.contains(id) && self.inner.is_known(id)
    }

    fn get(&self, id: &str, key: &str) -> Option<&str> {
        if self.contains(id) {
            self.inner.get(id, key)
        } else {
            None
        }
    }

    fn put(&mut self, id: &str, key: &str, value: &str) -> StoreResult<()> {
        self.check(id)?;
        self.inner.put(id, key, value)
    }

    fn remove_key(&mut self, id: &str, key: &str) -> StoreResult<()> {
        self.check(id)?;
        self.inner.remove_key(id, key)
    }

    fn remove(&mut self, id: &str) -> StoreResult<()> {
        self.check(id)?;
        self.inner.remove(id)
    }

    fn put_referred_id(&mut self, id: &str, referred_id: &str) -> StoreResult<()> {
        self.check(id)?;
        self.inner.put_referred_id(id, referred_id)
    }

    fn referred_ids(&self, id: &str) -> Option<&BTreeSet<String>> {
        if self.contains(id) {
            self.inner.referred_ids(id)
        } else {
            None
        }
    }

    fn remove_referred_ids(&mut self, id: &str) -> StoreResult<()> {
        self.check(id)?;
        self.inner.remove_referred_ids(id)
    }

    fn known_ids(&self) -> BTreeSet<String> {
        self.inner
            .known_ids()
            .into_iter()
            .filter(|id| self.contains(id))
            .collect()
    }

    fn len(&self) -> usize {
        self.known_ids().len()
    }

    fn load(&mut self) -> StoreResult<()> {
        Err(StoreError::Unsupported("load through a scoped view"))
    }

    fn store(&mut self) -> StoreResult<()> {
        Err(StoreError::Unsupported("store through a scoped view"))
    }
}
