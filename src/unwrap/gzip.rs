//! Gzip stream unwrapper

use super::{
    check_cancelled, path_not_found, UnwrapContext, UnwrapError, UnwrapResult, Unwrapper,
    UnwrapperFactory,
};
use crate::crawler::{CancelToken, SubCrawlerHandler};
use crate::id;
use crate::resource::{property, MetadataContainer, Resource};
use crate::source::mime;
use crate::store;
use chrono::DateTime;
use flate2::read::GzDecoder;
use std::io::Read;

pub const SCHEME: &str = "gzip";

const CONTENT_TYPES: &[&str] = &[mime::GZIP, mime::X_GZIP];

/// Name used when neither the header nor the parent identifier gives one
const FALLBACK_NAME: &str = "content";

#[derive(Debug, Clone, Copy, Default)]
pub struct GzipFactory;

impl UnwrapperFactory for GzipFactory {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn content_types(&self) -> &[&str] {
        CONTENT_TYPES
    }

    fn create(&self, cancel: CancelToken) -> Box<dyn Unwrapper> {
        Box::new(GzipUnwrapper::new(cancel))
    }
}

/// Unwraps a gzip stream into its single decompressed child
///
/// The child is named by the `FNAME` header field if present, otherwise by
/// the container's own name without its `.gz` suffix.
#[derive(Debug, Clone, Default)]
pub struct GzipUnwrapper {
    cancel: CancelToken,
}

struct Decompressed {
    name: String,
    bytes: Vec<u8>,
    mtime: u32,
}

impl GzipUnwrapper {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    fn decompress(parent_id: &str, stream: &mut dyn Read) -> UnwrapResult<Decompressed> {
        let mut decoder = GzDecoder::new(stream);
        let mut bytes = Vec::new();
        decoder
            .read_to_end(&mut bytes)
            .map_err(|e| UnwrapError::Format(format!("corrupt gzip stream: {}", e)))?;

        let header = decoder.header();
        let name = header
            .and_then(|h| h.filename())
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
            .filter(|name| !name.is_empty())
            .map_or_else(|| derived_name(parent_id), Ok)?;
        let mtime = header.map(|h| h.mtime()).unwrap_or(0);

        Ok(Decompressed { name, bytes, mtime })
    }

    fn describe(metadata: &mut dyn MetadataContainer, child: &Decompressed) {
        metadata.add(property::FILE_NAME, &child.name);
        metadata.add(property::FILE_SIZE, &child.bytes.len().to_string());
        if child.mtime > 0 {
            if let Some(modified) = DateTime::from_timestamp(i64::from(child.mtime), 0) {
                metadata.add(property::MODIFIED, &modified.to_rfc3339());
            }
        }
    }
}

impl Unwrapper for GzipUnwrapper {
    fn unwrap(
        &self,
        mut cx: UnwrapContext<'_>,
        stream: &mut dyn Read,
        handler: &mut dyn SubCrawlerHandler,
    ) -> UnwrapResult<()> {
        let child = Self::decompress(cx.id, stream)?;
        check_cancelled(&self.cancel)?;

        let child_id = cx.child_id(SCHEME, &child.name)?;
        let fingerprint = store::content_hash(&child.bytes);
        let mut metadata = handler.metadata_container(&child_id);
        Self::describe(metadata.as_mut(), &child);

        let resource = Resource::from_bytes(child_id, cx.source_id, metadata, child.bytes);
        cx.report(handler, resource, &fingerprint)?;
        Ok(())
    }

    fn fetch(
        &self,
        parent_id: &str,
        path: &str,
        stream: &mut dyn Read,
        source_id: &str,
        handler: &mut dyn SubCrawlerHandler,
    ) -> UnwrapResult<Resource> {
        let child = Self::decompress(parent_id, stream)?;
        if child.name != path {
            return Err(path_not_found(parent_id, path));
        }

        let child_id = id::compose(parent_id, SCHEME, &child.name)?;
        let mut metadata = handler.metadata_container(&child_id);
        Self::describe(metadata.as_mut(), &child);
        Ok(Resource::from_bytes(child_id, source_id, metadata, child.bytes))
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Derives the child name from the last segment of the container's name
fn derived_name(parent_id: &str) -> UnwrapResult<String> {
    let parent_name = match id::path(parent_id)? {
        Some(path) => path,
        None => parent_id.to_string(),
    };
    let base = parent_name
        .rsplit('/')
        .next()
        .unwrap_or(&parent_name)
        .to_string();

    let lower = base.to_ascii_lowercase();
    let name = if lower.ends_with(".tgz") {
        format!("{}.tar", &base[..base.len() - 4])
    } else if lower.ends_with(".gz") {
        base[..base.len() - 3].to_string()
    } else {
        base
    };

    if name.is_empty() {
        Ok(FALLBACK_NAME.to_string())
    } else {
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FingerprintMap;
    use crate::unwrap::testing::{read_text, RecordingHandler};
    use flate2::write::GzEncoder;
    use flate2::{Compression, GzBuilder};
    use std::io::{Cursor, Write};

    const PARENT: &str = "file:///data/notes.txt.gz";

    fn gzip(content: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    fn gzip_named(name: &str, content: &[u8]) -> Vec<u8> {
        let mut encoder = GzBuilder::new()
            .filename(name)
            .mtime(1_700_000_000)
            .write(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    fn unwrap_into(
        bytes: &[u8],
        fingerprints: Option<&mut FingerprintMap>,
    ) -> UnwrapResult<RecordingHandler> {
        let mut handler = RecordingHandler::default();
        let mut cx = UnwrapContext::new(PARENT, "test");
        if let Some(map) = fingerprints {
            cx = cx.with_fingerprints(map);
        }
        GzipUnwrapper::default().unwrap(cx, &mut Cursor::new(bytes), &mut handler)?;
        Ok(handler)
    }

    #[test]
    fn test_child_named_from_parent() {
        let mut handler = unwrap_into(&gzip(b"hello"), None).unwrap();

        assert_eq!(handler.new_ids(), vec!["gzip:file:///data/notes.txt.gz!/notes.txt"]);
        assert_eq!(read_text(&mut handler.new[0]), "hello");
    }

    #[test]
    fn test_child_named_from_header() {
        let handler = unwrap_into(&gzip_named("report.csv", b"a,b"), None).unwrap();
        let child = &handler.new[0];

        assert_eq!(child.id(), "gzip:file:///data/notes.txt.gz!/report.csv");
        assert_eq!(child.metadata().values(property::FILE_NAME), vec!["report.csv"]);
        assert_eq!(child.metadata().values(property::FILE_SIZE), vec!["3"]);
        assert_eq!(child.metadata().values(property::MODIFIED).len(), 1);
    }

    #[test]
    fn test_incremental_classification() {
        let mut map = FingerprintMap::new();

        let first = unwrap_into(&gzip(b"v1"), Some(&mut map)).unwrap();
        assert_eq!(first.new.len(), 1);

        let second = unwrap_into(&gzip(b"v1"), Some(&mut map)).unwrap();
        assert_eq!(second.not_modified.len(), 1);

        let third = unwrap_into(&gzip(b"v2"), Some(&mut map)).unwrap();
        assert_eq!(third.changed.len(), 1);
    }

    #[test]
    fn test_corrupt_stream() {
        let result = unwrap_into(b"\x1f\x8bnot really gzip", None);
        assert!(matches!(result, Err(UnwrapError::Format(_))));
    }

    #[test]
    fn test_cancelled_before_emitting() {
        let unwrapper = GzipUnwrapper::default();
        unwrapper.cancel();

        let mut handler = RecordingHandler::default();
        let result = unwrapper.unwrap(
            UnwrapContext::new(PARENT, "test"),
            &mut Cursor::new(gzip(b"x")),
            &mut handler,
        );
        assert!(matches!(result, Err(UnwrapError::Cancelled)));
        assert!(handler.new.is_empty());
    }

    #[test]
    fn test_fetch() {
        let bytes = gzip(b"hello");
        let mut handler = RecordingHandler::default();
        let unwrapper = GzipUnwrapper::default();

        let mut child = unwrapper
            .fetch(PARENT, "notes.txt", &mut Cursor::new(&bytes), "test", &mut handler)
            .unwrap();
        assert_eq!(read_text(&mut child), "hello");

        let missing =
            unwrapper.fetch(PARENT, "other.txt", &mut Cursor::new(&bytes), "test", &mut handler);
        assert!(matches!(missing, Err(UnwrapError::PathNotFound { .. })));
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(derived_name("file:///a/b.tgz").unwrap(), "b.tar");
        assert_eq!(derived_name("file:///a/B.GZ").unwrap(), "B");
        assert_eq!(derived_name("file:///a/plain").unwrap(), "plain");
        assert_eq!(derived_name("tar:file:///a.tar!/dir/x.gz").unwrap(), "x");
        assert_eq!(derived_name("file:///a/.gz").unwrap(), FALLBACK_NAME);
    }
}
