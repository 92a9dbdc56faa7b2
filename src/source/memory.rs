//! In-memory data source

use crate::id;
use crate::resource::{Opener, ResourceStream};
use crate::source::{DataSource, Entries, SourceEntry, SourceError, SourceResult};
use crate::{IdError, IdResult};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct MemoryEntry {
    bytes: Arc<[u8]>,
    content_type: Option<String>,
    fingerprint: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, MemoryEntry>,
    fail_after: Option<usize>,
    locked: BTreeSet<String>,
}

/// Data source over resources held in memory
///
/// Clones share the same entries, so a handle kept by the caller can add and
/// remove resources while a crawler owns the source. Entries are enumerated
/// in identifier order. The source can be told to fail its enumeration after
/// a number of entries, which simulates an unreachable root part-way through
/// a run, and single resources can be locked so that opening them fails.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    id: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inner: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a resource
    ///
    /// Without a source fingerprint the crawler hashes the content.
    pub fn insert(
        &self,
        id: &str,
        bytes: impl Into<Arc<[u8]>>,
        content_type: Option<&str>,
    ) -> IdResult<()> {
        self.insert_entry(id, bytes.into(), content_type, None)
    }

    /// Adds or replaces a resource that carries its own fingerprint
    pub fn insert_with_fingerprint(
        &self,
        id: &str,
        bytes: impl Into<Arc<[u8]>>,
        content_type: Option<&str>,
        fingerprint: &str,
    ) -> IdResult<()> {
        self.insert_entry(id, bytes.into(), content_type, Some(fingerprint))
    }

    fn insert_entry(
        &self,
        id: &str,
        bytes: Arc<[u8]>,
        content_type: Option<&str>,
        fingerprint: Option<&str>,
    ) -> IdResult<()> {
        id::validate(id)?;
        if id::is_composite(id) {
            return Err(IdError::Malformed {
                id: id.to_string(),
                reason: "top-level resources cannot be nested".to_string(),
            });
        }

        self.lock().entries.insert(
            id.to_string(),
            MemoryEntry {
                bytes,
                content_type: content_type.map(str::to_string),
                fingerprint: fingerprint.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Removes a resource, returning true if it existed
    pub fn remove(&self, id: &str) -> bool {
        self.lock().entries.remove(id).is_some()
    }

    /// Makes enumeration fail after yielding `count` entries, or never
    pub fn fail_after(&self, count: Option<usize>) {
        self.lock().fail_after = count;
    }

    /// Makes opening `id` fail until it is unlocked
    ///
    /// The resource is still enumerated; only its content is unreadable.
    pub fn set_locked(&self, id: &str, locked: bool) {
        let mut inner = self.lock();
        if locked {
            inner.locked.insert(id.to_string());
        } else {
            inner.locked.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn entry(id: &str, entry: &MemoryEntry, locked: bool) -> SourceEntry {
        let bytes = Arc::clone(&entry.bytes);
        let opener: Opener = if locked {
            let message = format!("{} is locked", id);
            Box::new(move || {
                Err::<ResourceStream, _>(io::Error::new(io::ErrorKind::PermissionDenied, message))
            })
        } else {
            Box::new(move || Ok(Box::new(Cursor::new(bytes)) as ResourceStream))
        };
        SourceEntry::new(id, opener)
            .with_content_type(entry.content_type.clone())
            .with_fingerprint(entry.fingerprint.clone())
    }
}

impl DataSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn entries(&self) -> SourceResult<Entries<'_>> {
        let failure = SourceError::Enumeration {
            root: self.id.clone(),
            message: "enumeration failed".to_string(),
        };

        let inner = self.lock();
        let limit = match inner.fail_after {
            Some(0) => return Err(failure),
            Some(n) => n,
            None => usize::MAX,
        };

        // Snapshot, so the source can change while the crawl is running
        let mut snapshot: Vec<SourceResult<SourceEntry>> = inner
            .entries
            .iter()
            .take(limit)
            .map(|(id, entry)| Ok(Self::entry(id, entry, inner.locked.contains(id))))
            .collect();
        if inner.fail_after.is_some() {
            snapshot.push(Err(failure));
        }

        Ok(Box::new(snapshot.into_iter()))
    }

    fn open(&self, id: &str) -> SourceResult<SourceEntry> {
        let inner = self.lock();
        inner
            .entries
            .get(id)
            .map(|entry| Self::entry(id, entry, inner.locked.contains(id)))
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn source() -> MemorySource {
        let source = MemorySource::new("memory");
        source.insert("file:///f1", b"one".to_vec(), None).unwrap();
        source
            .insert("file:///f2", b"two".to_vec(), Some("text/plain"))
            .unwrap();
        source
    }

    #[test]
    fn test_enumerates_in_order() {
        let ids: Vec<_> = source()
            .entries()
            .unwrap()
            .map(|e| e.unwrap().id)
            .collect();
        assert_eq!(ids, vec!["file:///f1", "file:///f2"]);
    }

    #[test]
    fn test_rejects_nested_or_malformed_ids() {
        let source = MemorySource::new("memory");
        assert!(source.insert("tar:file:///a!/b", b"x".to_vec(), None).is_err());
        assert!(source.insert("no-scheme", b"x".to_vec(), None).is_err());
    }

    #[test]
    fn test_fail_immediately() {
        let source = source();
        source.fail_after(Some(0));
        assert!(matches!(
            source.entries().err(),
            Some(SourceError::Enumeration { .. })
        ));
    }

    #[test]
    fn test_fail_part_way() {
        let source = source();
        source.fail_after(Some(1));
        let results: Vec<_> = source.entries().unwrap().collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SourceError::Enumeration { .. })));
    }

    #[test]
    fn test_clones_share_entries() {
        let source = source();
        let handle = source.clone();
        handle.remove("file:///f1");

        assert_eq!(source.len(), 1);
        assert!(matches!(
            source.open("file:///f1"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_locked_resource_cannot_be_opened() {
        let source = source();
        source.set_locked("file:///f2", true);

        let entries: Vec<_> = source.entries().unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(entries.len(), 2);
        let error = entries.into_iter().nth(1).unwrap().open().err().unwrap();
        assert_eq!(error.kind(), io::ErrorKind::PermissionDenied);

        source.set_locked("file:///f2", false);
        assert!(source.open("file:///f2").unwrap().open().is_ok());
    }

    #[test]
    fn test_open_reads_content() {
        let entry = source().open("file:///f2").unwrap();
        assert_eq!(entry.content_type.as_deref(), Some("text/plain"));

        let mut text = String::new();
        entry.open().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "two");

        assert!(matches!(
            source().open("file:///f3"),
            Err(SourceError::NotFound(_))
        ));
    }
}
