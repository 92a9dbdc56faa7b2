//! In-memory fingerprint map
//!
//! This is the state every store operates on. On its own it is a store
//! without persistence: `load` and `store` do nothing.

use crate::store::traits::{FingerprintStore, StoreResult};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Entry {
    values: BTreeMap<String, String>,
    referred: BTreeSet<String>,
}

impl Entry {
    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.referred.is_empty()
    }
}

/// Fingerprint store held entirely in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintMap {
    entries: HashMap<String, Entry>,
}

impl FingerprintMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over every `(id, key, value)` triple
    pub fn values(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.entries.iter().flat_map(|(id, entry)| {
            entry
                .values
                .iter()
                .map(move |(k, v)| (id.as_str(), k.as_str(), v.as_str()))
        })
    }

    /// Iterates over every `(id, referred_id)` pair
    pub fn referrals(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(id, entry)| {
            entry
                .referred
                .iter()
                .map(move |r| (id.as_str(), r.as_str()))
        })
    }

    /// Drops an entry once it holds nothing, so it stops being known
    fn prune(&mut self, id: &str) {
        if self.entries.get(id).is_some_and(Entry::is_empty) {
            self.entries.remove(id);
        }
    }
}

impl FingerprintStore for FingerprintMap {
    fn is_known(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn get(&self, id: &str, key: &str) -> Option<&str> {
        self.entries
            .get(id)
            .and_then(|entry| entry.values.get(key))
            .map(String::as_str)
    }

    fn put(&mut self, id: &str, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .entry(id.to_string())
            .or_default()
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_key(&mut self, id: &str, key: &str) -> StoreResult<()> {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.values.remove(key);
        }
        self.prune(id);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> StoreResult<()> {
        self.entries.remove(id);
        Ok(())
    }

    fn put_referred_id(&mut self, id: &str, referred_id: &str) -> StoreResult<()> {
        self.entries
            .entry(id.to_string())
            .or_default()
            .referred
            .insert(referred_id.to_string());
        Ok(())
    }

    fn referred_ids(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.entries
            .get(id)
            .map(|entry| &entry.referred)
            .filter(|referred| !referred.is_empty())
    }

    fn remove_referred_ids(&mut self, id: &str) -> StoreResult<()> {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.referred.clear();
        }
        self.prune(id);
        Ok(())
    }

    fn known_ids(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn load(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn store(&mut self) -> StoreResult<()> {
        Ok(())
    }
}
