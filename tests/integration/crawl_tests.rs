//! Integration tests for the crawler
//!
//! These tests crawl real directory trees in temporary directories and keep
//! fingerprints in SQLite databases, rebuilding the crawler between runs the
//! way the command-line driver does.

use burrow::config::{Config, CrawlerConfig, SourceConfig, StateConfig};
use burrow::crawler::{Crawler, CrawlerHandler, SubCrawlerHandler};
use burrow::report::{CrawlReport, ExitCode};
use burrow::resource::Resource;
use burrow::store::{FingerprintStore, SqliteFingerprintStore};
use burrow::{id, source::FileSystemSource};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::TempDir;

/// Records the identifiers reported for each kind of event
#[derive(Default)]
struct Recorder {
    new: Vec<String>,
    changed: Vec<String>,
    unchanged: Vec<String>,
    removed: Vec<String>,
    stopped: Vec<ExitCode>,
}

impl SubCrawlerHandler for Recorder {
    fn object_new(&mut self, mut resource: Resource) {
        self.new.push(resource.id().to_string());
        resource.dispose();
    }

    fn object_changed(&mut self, mut resource: Resource) {
        self.changed.push(resource.id().to_string());
        resource.dispose();
    }

    fn object_not_modified(&mut self, id: &str) {
        self.unchanged.push(id.to_string());
    }
}

impl CrawlerHandler for Recorder {
    fn object_removed(&mut self, id: &str) {
        self.removed.push(id.to_string());
    }

    fn crawl_stopped(&mut self, exit_code: ExitCode) {
        self.stopped.push(exit_code);
    }
}

/// Creates a test configuration crawling `root` with state kept in `state`
fn create_test_config(root: &Path, state: &Path) -> Config {
    Config {
        crawler: CrawlerConfig::default(),
        source: SourceConfig {
            root: root.to_path_buf(),
            follow_symlinks: false,
            include_hidden: false,
        },
        state: StateConfig {
            fingerprint_path: state.join("fingerprints.db"),
            report_path: Some(state.join("last-report.toml")),
        },
    }
}

/// Workspace with a crawled directory and a state directory
struct Fixture {
    _dir: TempDir,
    root: std::path::PathBuf,
    config: Config,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path().join("documents");
        let state = dir.path().join("state");
        fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();
        let config = create_test_config(&root, &state);
        Self {
            _dir: dir,
            root,
            config,
        }
    }

    fn write(&self, name: &str, content: &[u8]) {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn id(&self, name: &str) -> String {
        url::Url::from_file_path(self.root.join(name))
            .expect("Absolute path")
            .to_string()
    }

    /// Runs one crawl with a freshly built crawler
    fn crawl(&self) -> Recorder {
        let mut crawler = Crawler::from_config(&self.config);
        let mut recorder = Recorder::default();
        crawler.crawl(&mut recorder).expect("Crawler was idle");
        recorder
    }
}

fn tar_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzip_bytes(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (path, content) in files {
        writer
            .start_file(*path, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

#[test]
fn test_archive_crawl_across_runs() {
    let fixture = Fixture::new();
    fixture.write("f1.txt", b"first file");
    fixture.write("f2.tar", &tar_bytes(&[("x.txt", "x"), ("y.txt", "y")]));

    let f1 = fixture.id("f1.txt");
    let f2 = fixture.id("f2.tar");
    let x = id::compose(&f2, "tar", "x.txt").unwrap();
    let y = id::compose(&f2, "tar", "y.txt").unwrap();

    let first = fixture.crawl();
    assert_eq!(first.new, vec![f1.clone(), f2.clone(), x.clone(), y.clone()]);
    assert_eq!(first.stopped, vec![ExitCode::Completed]);

    fs::remove_file(fixture.root.join("f1.txt")).unwrap();
    let second = fixture.crawl();

    assert!(second.new.is_empty());
    assert!(second.changed.is_empty());
    assert_eq!(second.removed, vec![f1]);
    assert_eq!(second.unchanged, vec![f2, x, y]);

    let report =
        CrawlReport::load(fixture.config.state.report_path.as_deref().unwrap()).unwrap();
    assert_eq!(report.removed_count, 1);
    assert_eq!(report.unchanged_count, 3);
    assert_eq!(report.exit_code, Some(ExitCode::Completed));
}

#[test]
fn test_zip_archive_sniffed_and_fetched() {
    let fixture = Fixture::new();
    fixture.write("f2.zip", &zip_bytes(&[("x.txt", "x"), ("docs/y.txt", "why")]));

    let f2 = fixture.id("f2.zip");
    let x = id::compose(&f2, "zip", "x.txt").unwrap();
    let y = id::compose(&f2, "zip", "docs/y.txt").unwrap();

    let first = fixture.crawl();
    assert_eq!(first.new, vec![f2.clone(), x.clone(), y.clone()]);

    let second = fixture.crawl();
    assert_eq!(sorted(second.unchanged), sorted(vec![f2, x, y.clone()]));

    let crawler = Crawler::from_config(&fixture.config);
    let mut resource = crawler.fetch(&y, &mut Recorder::default()).unwrap();
    let mut text = String::new();
    resource.stream().unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "why");
}

#[test]
fn test_fingerprints_persisted_to_sqlite() {
    let fixture = Fixture::new();
    fixture.write("notes/a.txt", b"alpha");
    fixture.crawl();

    let store = SqliteFingerprintStore::open(&fixture.config.state.fingerprint_path).unwrap();
    assert!(store.is_known(&fixture.id("notes/a.txt")));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_modified_archive_entry() {
    let fixture = Fixture::new();
    fixture.write("f2.tar", &tar_bytes(&[("x.txt", "x"), ("y.txt", "y")]));
    fixture.crawl();

    fixture.write(
        "f2.tar",
        &tar_bytes(&[("x.txt", "x"), ("y.txt", "longer y"), ("z.txt", "z")]),
    );
    let run = fixture.crawl();

    let f2 = fixture.id("f2.tar");
    assert_eq!(run.changed, vec![f2.clone(), id::compose(&f2, "tar", "y.txt").unwrap()]);
    assert_eq!(run.unchanged, vec![id::compose(&f2, "tar", "x.txt").unwrap()]);
    assert_eq!(run.new, vec![id::compose(&f2, "tar", "z.txt").unwrap()]);
    assert!(run.removed.is_empty());
}

#[test]
fn test_entry_names_with_spaces() {
    let fixture = Fixture::new();
    fixture.write("f2.tar", &tar_bytes(&[("a b.txt", "spaced")]));
    let run = fixture.crawl();

    let child = run.new.last().unwrap();
    assert!(child.ends_with("!/a+b.txt"));
    assert_eq!(id::path(child).unwrap().as_deref(), Some("a b.txt"));

    let crawler = Crawler::from_config(&fixture.config);
    let mut resource = crawler.fetch(child, &mut Recorder::default()).unwrap();
    let mut text = String::new();
    resource.stream().unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "spaced");
}

#[test]
fn test_compressed_archive_unwrapped_twice() {
    let fixture = Fixture::new();
    let archive = tar_bytes(&[("readme.txt", "inside")]);
    fixture.write("bundle.tgz", &gzip_bytes(&archive));

    let run = fixture.crawl();

    let bundle = fixture.id("bundle.tgz");
    let tar = id::compose(&bundle, "gzip", "bundle.tar").unwrap();
    let readme = id::compose(&tar, "tar", "readme.txt").unwrap();
    assert_eq!(run.new, vec![bundle, tar, readme.clone()]);

    let crawler = Crawler::from_config(&fixture.config);
    let mut resource = crawler.fetch(&readme, &mut Recorder::default()).unwrap();
    let mut text = String::new();
    resource.stream().unwrap().read_to_string(&mut text).unwrap();
    assert_eq!(text, "inside");
}

#[test]
fn test_mailbox_and_contacts() {
    let fixture = Fixture::new();
    fixture.write(
        "inbox.mbox",
        b"From a@example.com Mon Jan  1 00:00:00 2024\nMessage-ID: <m1@example.com>\nSubject: Hi\n\nHello\n",
    );
    fixture.write(
        "people.vcf",
        b"BEGIN:VCARD\r\nVERSION:3.0\r\nUID:alice\r\nFN:Alice\r\nREV:1\r\nEND:VCARD\r\n",
    );

    let first = fixture.crawl();
    let inbox = fixture.id("inbox.mbox");
    let people = fixture.id("people.vcf");
    assert_eq!(
        sorted(first.new),
        sorted(vec![
            inbox.clone(),
            id::compose(&inbox, "mbox", "m1@example.com").unwrap(),
            people.clone(),
            id::compose(&people, "vcard", "alice").unwrap(),
        ])
    );

    // A new revision stamp alone is not a change of the contact
    fixture.write(
        "people.vcf",
        b"BEGIN:VCARD\r\nVERSION:3.0\r\nUID:alice\r\nFN:Alice\r\nREV:20\r\nEND:VCARD\r\n",
    );
    let second = fixture.crawl();
    assert_eq!(second.changed, vec![people.clone()]);
    assert!(second
        .unchanged
        .contains(&id::compose(&people, "vcard", "alice").unwrap()));
}

#[test]
fn test_clear_then_crawl_reports_everything_new() {
    let fixture = Fixture::new();
    fixture.write("f1.txt", b"one");
    fixture.write("f2.tar", &tar_bytes(&[("x.txt", "x")]));
    fixture.crawl();

    let mut crawler = Crawler::from_config(&fixture.config);
    let code = crawler.clear(&mut Recorder::default()).unwrap();
    assert_eq!(code, ExitCode::Completed);

    let store = SqliteFingerprintStore::open(&fixture.config.state.fingerprint_path).unwrap();
    assert!(store.is_empty());

    let run = fixture.crawl();
    assert_eq!(run.new.len(), 3);
    assert!(run.removed.is_empty());
}

#[test]
fn test_missing_root_is_fatal_and_keeps_state() {
    let fixture = Fixture::new();
    fixture.write("f1.txt", b"one");
    fixture.crawl();

    fs::remove_dir_all(&fixture.root).unwrap();
    let run = fixture.crawl();

    assert_eq!(run.stopped, vec![ExitCode::FatalError]);
    assert!(run.removed.is_empty());

    let store = SqliteFingerprintStore::open(&fixture.config.state.fingerprint_path).unwrap();
    assert!(store.is_known(&fixture.id("f1.txt")));
}

#[test]
fn test_stop_before_crawl_ends_early() {
    let fixture = Fixture::new();
    fixture.write("f1.txt", b"one");
    fixture.write("f2.txt", b"two");

    let mut crawler = Crawler::from_config(&fixture.config);
    crawler.stop();
    let mut recorder = Recorder::default();

    assert_eq!(crawler.crawl(&mut recorder).unwrap(), ExitCode::StopRequested);
    assert!(recorder.new.is_empty());

    // The request does not outlive the run it stopped
    let mut recorder = Recorder::default();
    assert_eq!(crawler.crawl(&mut recorder).unwrap(), ExitCode::Completed);
    assert_eq!(recorder.new.len(), 2);
}

#[test]
fn test_hidden_files_skipped() {
    let fixture = Fixture::new();
    fixture.write(".hidden", b"secret");
    fixture.write("visible.txt", b"public");

    let source = FileSystemSource::from_config(&fixture.config.source);
    let mut crawler = Crawler::new(source, burrow::store::FingerprintMap::new());
    let mut recorder = Recorder::default();
    crawler.crawl(&mut recorder).unwrap();

    assert_eq!(recorder.new, vec![fixture.id("visible.txt")]);
}
