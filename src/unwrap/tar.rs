//! Tar archive unwrapper

use super::{
    check_cancelled, path_not_found, UnwrapContext, UnwrapError, UnwrapResult, Unwrapper,
    UnwrapperFactory,
};
use crate::crawler::{CancelToken, SubCrawlerHandler};
use crate::id;
use crate::resource::{property, MetadataContainer, Resource};
use crate::source::mime;
use crate::store;
use ::tar::{Archive, Entry, EntryType};
use chrono::DateTime;
use std::collections::HashSet;
use std::io::Read;

pub const SCHEME: &str = "tar";

const CONTENT_TYPES: &[&str] = &[mime::TAR];

#[derive(Debug, Clone, Copy, Default)]
pub struct TarFactory;

impl UnwrapperFactory for TarFactory {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn content_types(&self) -> &[&str] {
        CONTENT_TYPES
    }

    fn create(&self, cancel: CancelToken) -> Box<dyn Unwrapper> {
        Box::new(TarUnwrapper::new(cancel))
    }
}

/// Unwraps a tar archive into one child per regular file
///
/// Directories, links and special entries are skipped. Entry paths become
/// child paths unchanged. When an archive holds the same path more than once,
/// only the first member is reported, which is also the one `fetch` returns.
#[derive(Debug, Clone, Default)]
pub struct TarUnwrapper {
    cancel: CancelToken,
}

struct Member {
    path: String,
    bytes: Vec<u8>,
    mtime: Option<u64>,
}

impl TarUnwrapper {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Reads the next regular-file entry, or `None` for entries that are skipped
    fn read_member<R: Read>(entry: &mut Entry<'_, R>) -> UnwrapResult<Option<Member>> {
        if !entry.header().entry_type().is_file() {
            return Ok(None);
        }

        let path = entry
            .path()
            .map_err(|e| UnwrapError::Format(format!("invalid entry path: {}", e)))?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();
        if path.is_empty() {
            return Ok(None);
        }

        let mtime = entry.header().mtime().ok().filter(|&t| t > 0);
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;

        Ok(Some(Member { path, bytes, mtime }))
    }

    fn describe(metadata: &mut dyn MetadataContainer, member: &Member) {
        let name = member.path.rsplit('/').next().unwrap_or(&member.path);
        metadata.add(property::FILE_NAME, name);
        metadata.add(property::FILE_SIZE, &member.bytes.len().to_string());
        let modified = member
            .mtime
            .and_then(|t| i64::try_from(t).ok())
            .and_then(|t| DateTime::from_timestamp(t, 0));
        if let Some(modified) = modified {
            metadata.add(property::MODIFIED, &modified.to_rfc3339());
        }
    }

    fn into_resource(
        member: Member,
        child_id: String,
        source_id: &str,
        handler: &mut dyn SubCrawlerHandler,
    ) -> Resource {
        let mut metadata = handler.metadata_container(&child_id);
        Self::describe(metadata.as_mut(), &member);
        Resource::from_bytes(child_id, source_id, metadata, member.bytes)
    }
}

impl Unwrapper for TarUnwrapper {
    fn unwrap(
        &self,
        mut cx: UnwrapContext<'_>,
        stream: &mut dyn Read,
        handler: &mut dyn SubCrawlerHandler,
    ) -> UnwrapResult<()> {
        let mut archive = Archive::new(stream);
        let entries = archive
            .entries()
            .map_err(|e| UnwrapError::Format(format!("unreadable tar archive: {}", e)))?;

        let mut used_paths = HashSet::new();
        for entry in entries {
            check_cancelled(&self.cancel)?;

            let mut entry =
                entry.map_err(|e| UnwrapError::Format(format!("corrupt tar entry: {}", e)))?;
            let Some(member) = Self::read_member(&mut entry)? else {
                continue;
            };
            if !used_paths.insert(member.path.clone()) {
                tracing::debug!("Skipping repeated tar member {} in {}", member.path, cx.id);
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
        let mut archive = Archive::new(stream);
        let entries = archive
            .entries()
            .map_err(|e| UnwrapError::Format(format!("unreadable tar archive: {}", e)))?;

        for entry in entries {
            check_cancelled(&self.cancel)?;

            let mut entry =
                entry.map_err(|e| UnwrapError::Format(format!("corrupt tar entry: {}", e)))?;
            match Self::read_member(&mut entry)? {
                Some(member) if member.path == path => {
                    let child_id = id::compose(parent_id, SCHEME, &member.path)?;
                    return Ok(Self::into_resource(member, child_id, source_id, handler));
                }
                _ => continue,
            }
        }

        Err(path_not_found(parent_id, path))
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}
