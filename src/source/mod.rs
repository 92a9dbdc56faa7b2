//! Data sources enumerating top-level resources
//!
//! A data source yields one [`SourceEntry`] per top-level resource. The
//! crawler decides from the entry's fingerprint whether the resource has to be
//! opened at all, so entries carry a deferred opener rather than a stream.
//!
//! # Components
//!
//! - `DataSource`: The enumeration trait
//! - `FileSystemSource`: Walks a directory tree
//! - `MemorySource`: Entries held in memory
//! - `ContentSniffer`: Identifies content types from leading bytes

mod filesystem;
mod memory;
mod sniff;

pub use filesystem::FileSystemSource;
pub use memory::MemorySource;
pub use sniff::{mime, ContentSniffer, MagicSniffer};

use crate::resource::{Opener, ResourceStream};
use crate::IdError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Errors raised by data sources
#[derive(Debug, Error)]
pub enum SourceError {
    /// Enumeration of the top-level resources failed; the run cannot complete
    #[error("Failed to enumerate {root}: {message}")]
    Enumeration { root: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Path cannot be expressed as an identifier: {0}")]
    InvalidPath(String),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Identifier error: {0}")]
    Id(#[from] IdError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for data source operations
pub type SourceResult<T> = Result<T, SourceError>;

/// Iterator over the top-level entries of a data source
///
/// Any `Err` item aborts the enumeration.
pub type Entries<'a> = Box<dyn Iterator<Item = SourceResult<SourceEntry>> + 'a>;

/// A top-level resource as reported by a data source
pub struct SourceEntry {
    /// Identifier of the resource
    pub id: String,

    /// Content type declared by the source, if it knows one
    pub content_type: Option<String>,

    /// Cheap change indicator supplied by the source (for example
    /// modification time and size). When absent the crawler hashes the
    /// content instead.
    pub fingerprint: Option<String>,

    opener: Opener,
}

impl SourceEntry {
    pub fn new(id: impl Into<String>, opener: Opener) -> Self {
        Self {
            id: id.into(),
            content_type: None,
            fingerprint: None,
            opener,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Opens the resource's byte stream
    pub fn open(self) -> io::Result<ResourceStream> {
        (self.opener)()
    }

    /// Gives up the deferred opener without calling it
    pub fn into_opener(self) -> Opener {
        self.opener
    }
}

impl fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceEntry")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Trait for top-level resource enumerators
pub trait DataSource: Send {
    /// Identifier of this source, recorded on every resource it yields
    fn id(&self) -> &str;

    /// Enumerates every top-level resource
    ///
    /// An `Err` return, or an `Err` item from the iterator, is fatal for the
    /// crawl run.
    fn entries(&self) -> SourceResult<Entries<'_>>;

    /// Looks up a single top-level resource by identifier
    fn open(&self, id: &str) -> SourceResult<SourceEntry>;
}
