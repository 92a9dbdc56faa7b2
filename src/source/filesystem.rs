//! Directory tree data source

use crate::config::SourceConfig;
use crate::resource::{Opener, ResourceStream};
use crate::source::{DataSource, Entries, SourceEntry, SourceError, SourceResult};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use url::Url;
use walkdir::{DirEntry, WalkDir};

/// Data source yielding every regular file below a root directory
///
/// Identifiers are `file://` URIs. The fingerprint of each file is its
/// modification time and size, so unchanged files are never opened.
#[derive(Debug, Clone)]
pub struct FileSystemSource {
    id: String,
    root: PathBuf,
    follow_symlinks: bool,
    include_hidden: bool,
}

impl FileSystemSource {
    /// Creates a source over `root` that skips hidden files and symlinks
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            id: format!("filesystem:{}", root.display()),
            root,
            follow_symlinks: false,
            include_hidden: false,
        }
    }

    /// Creates a source from the `[source]` configuration section
    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(&config.root)
            .follow_symlinks(config.follow_symlinks)
            .include_hidden(config.include_hidden)
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn canonical_root(&self) -> SourceResult<PathBuf> {
        let enumeration_error = |message: String| SourceError::Enumeration {
            root: self.root.display().to_string(),
            message,
        };

        let root = fs::canonicalize(&self.root).map_err(|e| enumeration_error(e.to_string()))?;
        if !root.is_dir() {
            return Err(enumeration_error("not a directory".to_string()));
        }
        Ok(root)
    }

    fn entry_for(path: &Path, metadata: &fs::Metadata) -> SourceResult<SourceEntry> {
        let id = Url::from_file_path(path)
            .map_err(|_| SourceError::InvalidPath(path.display().to_string()))?
            .to_string();

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let fingerprint = format!("{}:{}", modified, metadata.len());

        let path = path.to_path_buf();
        let opener: Opener = Box::new(move || {
            let file = File::open(&path)?;
            Ok(Box::new(BufReader::new(file)) as ResourceStream)
        });

        Ok(SourceEntry::new(id, opener).with_fingerprint(Some(fingerprint)))
    }

    fn is_visible(entry: &DirEntry) -> bool {
        entry.depth() == 0
            || !entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with('.'))
    }
}

impl DataSource for FileSystemSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn entries(&self) -> SourceResult<Entries<'_>> {
        let root = self.canonical_root()?;
        let include_hidden = self.include_hidden;

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| include_hidden || Self::is_visible(e))
            .filter_map(|result| match result {
                Ok(entry) if entry.file_type().is_file() => Some(
                    entry
                        .metadata()
                        .map_err(SourceError::from)
                        .and_then(|metadata| Self::entry_for(entry.path(), &metadata)),
                ),
                Ok(_) => None,
                Err(e) => Some(Err(SourceError::from(e))),
            });

        Ok(Box::new(walker))
    }

    fn open(&self, id: &str) -> SourceResult<SourceEntry> {
        let path = Url::parse(id)
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
            .ok_or_else(|| SourceError::InvalidPath(id.to_string()))?;

        let root = self.canonical_root()?;
        if !path.starts_with(&root) {
            return Err(SourceError::NotFound(id.to_string()));
        }

        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => Self::entry_for(&path, &metadata),
            Ok(_) => Err(SourceError::NotFound(id.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
