//! Zip archive unwrapper

use super::{
    check_cancelled, path_not_found, UnwrapContext, UnwrapError, UnwrapResult, Unwrapper,
    UnwrapperFactory,
};
use crate::crawler::{CancelToken, SubCrawlerHandler};
use crate::id;
use crate::resource::{property, MetadataContainer, Resource};
use crate::source::mime;
use crate::store;
use ::zip::read::ZipFile;
use ::zip::result::ZipError;
use ::zip::ZipArchive;
use std::collections::HashSet;
use std::io::{Cursor, Read};

pub const SCHEME: &str = "zip";

const CONTENT_TYPES: &[&str] = &[mime::ZIP];

#[derive(Debug, Clone, Copy, Default)]
pub struct ZipFactory;

impl UnwrapperFactory for ZipFactory {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn content_types(&self) -> &[&str] {
        CONTENT_TYPES
    }

    fn create(&self, cancel: CancelToken) -> Box<dyn Unwrapper> {
        Box::new(ZipUnwrapper::new(cancel))
    }
}

/// Unwraps a zip archive into one child per file
///
/// The central directory sits at the end of the archive, so the whole stream
/// is read before the first child is reported. Directory entries are skipped
/// and a path present twice is reported once, from its first entry.
#[derive(Debug, Clone, Default)]
pub struct ZipUnwrapper {
    cancel: CancelToken,
}

struct Member {
    path: String,
    bytes: Vec<u8>,
}

impl ZipUnwrapper {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    fn open(stream: &mut dyn Read) -> UnwrapResult<ZipArchive<Cursor<Vec<u8>>>> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        ZipArchive::new(Cursor::new(bytes)).map_err(format_error)
    }

    fn read_member(file: &mut ZipFile<'_>) -> UnwrapResult<Option<Member>> {
        if file.is_dir() {
            return Ok(None);
        }

        let path = file.name().trim_start_matches("./").to_string();
        if path.is_empty() {
            return Ok(None);
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| UnwrapError::Format(format!("corrupt zip entry {}: {}", path, e)))?;
        Ok(Some(Member { path, bytes }))
    }

    fn into_resource(
        member: Member,
        child_id: String,
        source_id: &str,
        handler: &mut dyn SubCrawlerHandler,
    ) -> Resource {
        let mut metadata = handler.metadata_container(&child_id);
        describe(metadata.as_mut(), &member);
        Resource::from_bytes(child_id, source_id, metadata, member.bytes)
    }
}

impl Unwrapper for ZipUnwrapper {
    fn unwrap(
        &self,
        mut cx: UnwrapContext<'_>,
        stream: &mut dyn Read,
        handler: &mut dyn SubCrawlerHandler,
    ) -> UnwrapResult<()> {
        let mut archive = Self::open(stream)?;

        let mut used_paths = HashSet::new();
        for index in 0..archive.len() {
            check_cancelled(&self.cancel)?;

            let mut file = archive.by_index(index).map_err(format_error)?;
            let Some(member) = Self::read_member(&mut file)? else {
                continue;
            };
            if !used_paths.insert(member.path.clone()) {
                tracing::debug!("Skipping repeated zip entry {} in {}", member.path, cx.id);
                continue;
            }

            let child_id = cx.child_id(SCHEME, &member.path)?;
            let fingerprint = store::content_hash(&member.bytes);
            let resource = Self::into_resource(member, child_id, cx.source_id, handler);
            cx.report(handler, resource, &fingerprint)?;
        }

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
        let mut archive = Self::open(stream)?;
        check_cancelled(&self.cancel)?;

        let mut file = match archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(path_not_found(parent_id, path)),
            Err(e) => return Err(format_error(e)),
        };
        match Self::read_member(&mut file)? {
            Some(member) => {
                let child_id = id::compose(parent_id, SCHEME, &member.path)?;
                Ok(Self::into_resource(member, child_id, source_id, handler))
            }
            None => Err(path_not_found(parent_id, path)),
        }
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

fn describe(metadata: &mut dyn MetadataContainer, member: &Member) {
    let name = member.path.rsplit('/').next().unwrap_or(&member.path);
    metadata.add(property::FILE_NAME, name);
    metadata.add(property::FILE_SIZE, &member.bytes.len().to_string());
}

fn format_error(e: ZipError) -> UnwrapError {
    UnwrapError::Format(format!("unreadable zip archive: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FingerprintMap;
    use crate::unwrap::testing::{read_text, RecordingHandler};
    use ::zip::write::FileOptions;
    use ::zip::ZipWriter;
    use std::io::Write;

    const PARENT: &str = "file:///data/f2.zip";

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in files {
            if path.ends_with('/') {
                writer.add_directory(*path, FileOptions::default()).unwrap();
            } else {
                writer.start_file(*path, FileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    fn unwrap_into(bytes: &[u8], map: &mut FingerprintMap) -> UnwrapResult<RecordingHandler> {
        let mut handler = RecordingHandler::default();
        let cx = UnwrapContext::new(PARENT, "test").with_fingerprints(map);
        ZipUnwrapper::default().unwrap(cx, &mut Cursor::new(bytes), &mut handler)?;
        Ok(handler)
    }

    #[test]
    fn test_one_child_per_file() {
        let bytes = archive(&[("x.txt", "x"), ("docs/", ""), ("docs/a b.txt", "ab")]);
        let mut map = FingerprintMap::new();
        let mut handler = unwrap_into(&bytes, &mut map).unwrap();

        assert_eq!(
            handler.new_ids(),
            vec!["zip:file:///data/f2.zip!/x.txt", "zip:file:///data/f2.zip!/docs/a+b.txt"]
        );
        assert_eq!(read_text(&mut handler.new[1]), "ab");
        assert_eq!(
            handler.new[1].metadata().values(property::FILE_NAME),
            vec!["a b.txt"]
        );
    }

    #[test]
    fn test_changed_and_unchanged_entries() {
        let mut map = FingerprintMap::new();
        unwrap_into(&archive(&[("x.txt", "x"), ("y.txt", "y")]), &mut map).unwrap();

        let handler =
            unwrap_into(&archive(&[("x.txt", "x"), ("y.txt", "Y")]), &mut map).unwrap();

        assert!(handler.new.is_empty());
        assert_eq!(handler.changed_ids(), vec!["zip:file:///data/f2.zip!/y.txt"]);
        assert_eq!(handler.not_modified, vec!["zip:file:///data/f2.zip!/x.txt"]);
    }

    #[test]
    fn test_not_a_zip_archive() {
        let mut map = FingerprintMap::new();
        let result = unwrap_into(b"plain text, not an archive", &mut map);
        assert!(matches!(result, Err(UnwrapError::Format(_))));
    }

    #[test]
    fn test_fetch_by_path() {
        let bytes = archive(&[("x.txt", "x"), ("y.txt", "yy")]);
        let mut handler = RecordingHandler::default();
        let unwrapper = ZipUnwrapper::default();

        let mut child = unwrapper
            .fetch(PARENT, "y.txt", &mut Cursor::new(&bytes), "test", &mut handler)
            .unwrap();
        assert_eq!(child.id(), "zip:file:///data/f2.zip!/y.txt");
        assert_eq!(read_text(&mut child), "yy");

        let missing =
            unwrapper.fetch(PARENT, "z.txt", &mut Cursor::new(&bytes), "test", &mut handler);
        assert!(matches!(missing, Err(UnwrapError::PathNotFound { .. })));
    }
}
