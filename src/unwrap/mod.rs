//! Container unwrappers
//!
//! An unwrapper turns the byte stream of one container resource (an archive,
//! a compressed stream, a mailbox, a contact list) into child resources. The
//! crawler never names a concrete format: it asks the [`UnwrapperRegistry`]
//! for a factory by content type, or by identifier scheme when resolving a
//! nested identifier on demand.
//!
//! # Components
//!
//! - `Unwrapper`: The capability every format implements
//! - `UnwrapperFactory`: Creates unwrappers bound to a cancel token
//! - `UnwrapperRegistry`: Lookup by content type and by scheme
//! - `GzipUnwrapper`, `TarUnwrapper`, `ZipUnwrapper`, `VcardUnwrapper`, `MboxUnwrapper`

mod gzip;
mod mbox;
mod registry;
mod tar;
mod vcard;
mod zip;

pub use self::gzip::{GzipFactory, GzipUnwrapper};
pub use self::mbox::{MboxFactory, MboxUnwrapper};
pub use self::registry::{default_registry, UnwrapperRegistry};
pub use self::tar::{TarFactory, TarUnwrapper};
pub use self::vcard::{VcardFactory, VcardUnwrapper};
pub use self::zip::{ZipFactory, ZipUnwrapper};

use crate::crawler::{CancelToken, SubCrawlerHandler};
use crate::id;
use crate::resource::Resource;
use crate::store::{self, Change, FingerprintStore, StoreError, CONTENT_HASH_KEY};
use crate::{IdError, IdResult};
use std::io::{self, Read};
use thiserror::Error;

/// Errors raised while unwrapping or fetching from a container
#[derive(Debug, Error)]
pub enum UnwrapError {
    /// The container bytes could not be parsed
    #[error("Malformed container: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Path '{path}' not found in {parent}")]
    PathNotFound { parent: String, path: String },

    #[error("No unwrapper registered for scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Unwrapping was cancelled")]
    Cancelled,

    #[error("Fingerprint store error: {0}")]
    Store(#[from] StoreError),

    #[error("Identifier error: {0}")]
    Id(#[from] IdError),
}

/// Result type for unwrap operations
pub type UnwrapResult<T> = Result<T, UnwrapError>;

/// The container being unwrapped and what the unwrapper may consult
pub struct UnwrapContext<'a> {
    /// Identifier of the container
    pub id: &'a str,

    /// Declared or sniffed content type of the container
    pub content_type: Option<&'a str>,

    /// Identifier of the data source the container came from
    pub source_id: &'a str,

    /// Fingerprints of the container's children, when incremental
    /// classification is wanted. Without it every child is reported new.
    pub fingerprints: Option<&'a mut dyn FingerprintStore>,
}

impl<'a> UnwrapContext<'a> {
    pub fn new(id: &'a str, source_id: &'a str) -> Self {
        Self {
            id,
            content_type: None,
            source_id,
            fingerprints: None,
        }
    }

    pub fn with_content_type(mut self, content_type: Option<&'a str>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_fingerprints(mut self, fingerprints: &'a mut dyn FingerprintStore) -> Self {
        self.fingerprints = Some(fingerprints);
        self
    }

    /// Builds the identifier of the child at `path`
    pub fn child_id(&self, scheme: &str, path: &str) -> IdResult<String> {
        id::compose(self.id, scheme, path)
    }

    /// Classifies a child by its fingerprint and hands it to `handler`
    ///
    /// The fingerprint is compared with, and stored under,
    /// [`CONTENT_HASH_KEY`]. Unchanged children are reported by identifier
    /// and released.
    pub fn report(
        &mut self,
        handler: &mut dyn SubCrawlerHandler,
        resource: Resource,
        fingerprint: &str,
    ) -> UnwrapResult<Change> {
        let change = match self.fingerprints.as_deref_mut() {
            Some(fingerprints) => {
                store::classify(fingerprints, resource.id(), CONTENT_HASH_KEY, fingerprint)?
            }
            None => Change::New,
        };

        match change {
            Change::New => handler.object_new(resource),
            Change::Changed => handler.object_changed(resource),
            Change::Unchanged => handler.object_not_modified(resource.id()),
        }
        Ok(change)
    }
}

/// A decoder for one container format
pub trait Unwrapper: Send {
    /// Reads `stream` once and reports every child to `handler`
    ///
    /// Children are addressed with [`id::compose`] below `cx.id`. Removal is
    /// never reported here: only the crawler knows the full set of children
    /// seen during a run. Children reported before a failure stay reported.
    fn unwrap(
        &self,
        cx: UnwrapContext<'_>,
        stream: &mut dyn Read,
        handler: &mut dyn SubCrawlerHandler,
    ) -> UnwrapResult<()>;

    /// Retrieves the single child at `path` without reporting the others
    ///
    /// Fails with [`UnwrapError::PathNotFound`] if the container has no such
    /// child.
    fn fetch(
        &self,
        parent_id: &str,
        path: &str,
        stream: &mut dyn Read,
        source_id: &str,
        handler: &mut dyn SubCrawlerHandler,
    ) -> UnwrapResult<Resource>;

    /// Asks a running [`unwrap`](Self::unwrap) to stop before its next child
    fn cancel(&self);
}

/// Creates unwrappers for one container format
pub trait UnwrapperFactory: Send + Sync {
    /// Identifier scheme of the children this format produces
    fn scheme(&self) -> &str;

    /// Content types this format can unwrap
    fn content_types(&self) -> &[&str];

    /// Creates an unwrapper that stops once `cancel` is cancelled
    fn create(&self, cancel: CancelToken) -> Box<dyn Unwrapper>;
}

/// Fails with [`UnwrapError::Cancelled`] once `cancel` is set
fn check_cancelled(cancel: &CancelToken) -> UnwrapResult<()> {
    if cancel.is_cancelled() {
        Err(UnwrapError::Cancelled)
    } else {
        Ok(())
    }
}

fn path_not_found(parent_id: &str, path: &str) -> UnwrapError {
    UnwrapError::PathNotFound {
        parent: parent_id.to_string(),
        path: path.to_string(),
    }
}
