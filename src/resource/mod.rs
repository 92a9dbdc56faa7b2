//! Resources reported by the crawler
//!
//! A [`Resource`] is one addressable unit: a file, an archive entry, a mail
//! message, a contact. Its byte stream is opened lazily, at most once, and is
//! owned by whoever currently holds the resource. The handler that receives a
//! resource is expected to call [`Resource::dispose`] when it is done; the
//! stream is also released when the resource is dropped.

mod metadata;

pub use metadata::{property, MetadataContainer, RecordMetadata};

use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

/// Boxed byte stream of a resource
pub type ResourceStream = Box<dyn Read + Send>;

/// Deferred stream constructor
pub type Opener = Box<dyn FnOnce() -> io::Result<ResourceStream> + Send>;

enum Content {
    Lazy(Opener),
    Open(ResourceStream),
    Buffered(Arc<[u8]>),
    Released,
}

/// One unit reported by the crawler
pub struct Resource {
    id: String,
    content_type: Option<String>,
    source_id: String,
    metadata: Box<dyn MetadataContainer>,
    content: Content,
    disposed: bool,
}

impl Resource {
    fn with_content(
        id: impl Into<String>,
        source_id: impl Into<String>,
        metadata: Box<dyn MetadataContainer>,
        content: Content,
    ) -> Self {
        Self {
            id: id.into(),
            content_type: None,
            source_id: source_id.into(),
            metadata,
            content,
            disposed: false,
        }
    }

    /// Creates a resource whose stream is opened on first access
    pub fn lazy(
        id: impl Into<String>,
        source_id: impl Into<String>,
        metadata: Box<dyn MetadataContainer>,
        opener: Opener,
    ) -> Self {
        Self::with_content(id, source_id, metadata, Content::Lazy(opener))
    }

    /// Creates a resource around an already open stream
    pub fn from_reader(
        id: impl Into<String>,
        source_id: impl Into<String>,
        metadata: Box<dyn MetadataContainer>,
        reader: ResourceStream,
    ) -> Self {
        Self::with_content(id, source_id, metadata, Content::Open(reader))
    }

    /// Creates a resource whose content is held in memory
    pub fn from_bytes(
        id: impl Into<String>,
        source_id: impl Into<String>,
        metadata: Box<dyn MetadataContainer>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self::with_content(id, source_id, metadata, Content::Buffered(bytes.into()))
    }

    /// Sets the declared content type
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        self.content_type = content_type;
    }

    /// Identifier of the data source this resource originates from
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn metadata(&self) -> &dyn MetadataContainer {
        self.metadata.as_ref()
    }

    pub fn metadata_mut(&mut self) -> &mut dyn MetadataContainer {
        self.metadata.as_mut()
    }

    /// Returns the byte stream, opening it on first access
    ///
    /// Later calls return the same stream, positioned wherever the previous
    /// reader left it.
    pub fn stream(&mut self) -> io::Result<&mut (dyn Read + Send)> {
        if self.disposed {
            return Err(released(&self.id));
        }

        self.content = match std::mem::replace(&mut self.content, Content::Released) {
            Content::Lazy(opener) => Content::Open(opener()?),
            Content::Buffered(bytes) => Content::Open(Box::new(Cursor::new(bytes))),
            other => other,
        };

        match &mut self.content {
            Content::Open(stream) => Ok(stream.as_mut()),
            _ => Err(released(&self.id)),
        }
    }

    /// Reads the remaining content into memory and returns it
    ///
    /// The resource keeps the buffer, so a later [`stream`](Self::stream)
    /// reads the same bytes again.
    pub fn buffer(&mut self) -> io::Result<Arc<[u8]>> {
        if self.disposed {
            return Err(released(&self.id));
        }

        let bytes: Arc<[u8]> = match std::mem::replace(&mut self.content, Content::Released) {
            Content::Buffered(bytes) => bytes,
            Content::Lazy(opener) => read_all(opener()?)?.into(),
            Content::Open(stream) => read_all(stream)?.into(),
            Content::Released => return Err(released(&self.id)),
        };

        self.content = Content::Buffered(Arc::clone(&bytes));
        Ok(bytes)
    }

    /// Content already held in memory, if any
    pub fn buffered(&self) -> Option<&[u8]> {
        match &self.content {
            Content::Buffered(bytes) => Some(&bytes[..]),
            _ => None,
        }
    }

    /// Releases the stream and the metadata container
    ///
    /// Calling this more than once has no further effect.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.content = Content::Released;
        self.metadata.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = match &self.content {
            Content::Lazy(_) => "lazy",
            Content::Open(_) => "open",
            Content::Buffered(_) => "buffered",
            Content::Released => "released",
        };
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("content_type", &self.content_type)
            .field("source_id", &self.source_id)
            .field("content", &content)
            .field("disposed", &self.disposed)
            .finish()
    }
}

fn read_all(mut stream: ResourceStream) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn released(id: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        format!("stream of {} has been released", id),
    )
}
