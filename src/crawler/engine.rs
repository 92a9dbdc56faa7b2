//! Crawl engine - incremental traversal of one data source
//!
//! One crawl run:
//! - Loads the fingerprints recorded by earlier runs
//! - Classifies every top-level resource as new, changed or unchanged
//! - Unwraps new and changed containers, child by child, through the registry
//! - Re-observes the children of unchanged containers from their referrals
//! - Leaves a container whose unwrapping was stopped to be unwrapped again
//!   by the next run
//! - Reports the resources that were not seen again, but only when the run
//!   completed
//! - Persists the fingerprints and the run's report

use crate::config::{Config, CrawlerConfig};
use crate::crawler::cancel::CancelToken;
use crate::crawler::handler::{CrawlerHandler, SubCrawlerHandler};
use crate::crawler::resolve;
use crate::crawler::state::{CrawlerState, StateWatcher};
use crate::id;
use crate::report::{CrawlReport, ExitCode};
use crate::resource::{MetadataContainer, Resource, ResourceStream};
use crate::source::{ContentSniffer, DataSource, FileSystemSource, MagicSniffer, SourceEntry};
use crate::store::{
    self, FingerprintStore, ScopedFingerprints, SqliteFingerprintStore, CONTENT_HASH_KEY,
    FINGERPRINT_KEY,
};
use crate::unwrap::{
    default_registry, UnwrapContext, UnwrapError, UnwrapperFactory, UnwrapperRegistry,
};
use crate::{CrawlError, Result};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

/// Incremental crawler over one data source
pub struct Crawler {
    source: Box<dyn DataSource>,
    store: Box<dyn FingerprintStore + Send>,
    registry: UnwrapperRegistry,
    sniffer: Box<dyn ContentSniffer>,
    settings: CrawlerConfig,
    report_path: Option<PathBuf>,
    cancel: CancelToken,
    state: StateWatcher,
    last_report: Option<CrawlReport>,
}

impl Crawler {
    /// Creates a crawler with the default registry and sniffer
    pub fn new(
        source: impl DataSource + 'static,
        store: impl FingerprintStore + Send + 'static,
    ) -> Self {
        Self {
            source: Box::new(source),
            store: Box::new(store),
            registry: default_registry(),
            sniffer: Box::new(MagicSniffer),
            settings: CrawlerConfig::default(),
            report_path: None,
            cancel: CancelToken::new(),
            state: StateWatcher::default(),
            last_report: None,
        }
    }

    /// Creates a crawler over the configured directory and fingerprint database
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            FileSystemSource::from_config(&config.source),
            SqliteFingerprintStore::new(&config.state.fingerprint_path),
        )
        .with_settings(config.crawler.clone())
        .with_report_path(config.state.report_path.clone())
    }

    pub fn with_registry(mut self, registry: UnwrapperRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_sniffer(mut self, sniffer: impl ContentSniffer + 'static) -> Self {
        self.sniffer = Box::new(sniffer);
        self
    }

    pub fn with_settings(mut self, settings: CrawlerConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Sets where the report of each run is saved
    pub fn with_report_path(mut self, path: Option<PathBuf>) -> Self {
        self.report_path = path;
        self
    }

    /// Returns a token that stops the current run when cancelled
    ///
    /// The token can be moved to another thread. A stop request is cleared
    /// when the run it interrupted ends.
    pub fn stop_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Requests the current run to stop
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> CrawlerState {
        self.state.get()
    }

    /// Returns a handle reporting the crawler's state from any thread
    pub fn state_watcher(&self) -> StateWatcher {
        self.state.clone()
    }

    /// Report of the most recent crawl run
    pub fn last_report(&self) -> Option<&CrawlReport> {
        self.last_report.as_ref()
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    pub fn fingerprints(&self) -> &dyn FingerprintStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &UnwrapperRegistry {
        &self.registry
    }

    /// Runs one incremental crawl
    ///
    /// Every event of the run goes to `handler`, ending with exactly one
    /// `crawl_stopped`. Fails only if the crawler is not idle, in which case
    /// nothing is reported.
    pub fn crawl(&mut self, handler: &mut dyn CrawlerHandler) -> Result<ExitCode> {
        self.state
            .transition(CrawlerState::Idle, CrawlerState::Running)
            .map_err(CrawlError::Busy)?;

        self.load_fingerprints();
        let mut report = CrawlReport::start();
        handler.crawl_started();
        tracing::info!(
            "Crawling {} with {} known resources",
            self.source.id(),
            self.store.len()
        );

        let source = self.source.as_ref();
        let deprecated = self.store.known_ids();
        let mut pass = Pass {
            store: self.store.as_mut(),
            registry: &self.registry,
            sniffer: self.sniffer.as_ref(),
            settings: &self.settings,
            cancel: &self.cancel,
            source_id: source.id(),
            handler: &mut *handler,
            report: &mut report,
            deprecated,
        };

        let exit_code = pass.run(source);
        if exit_code.is_complete() {
            self.state.set(CrawlerState::ReportingRemovals);
            pass.report_removals();
        } else if !pass.deprecated.is_empty() {
            tracing::info!(
                "Run ended with {}, keeping {} unseen resources",
                exit_code,
                pass.deprecated.len()
            );
        }

        if let Err(e) = self.store.store() {
            tracing::error!("Failed to persist fingerprints: {}", e);
        }

        report.finish(exit_code);
        tracing::info!(
            "Crawl finished with {}: {} new, {} changed, {} unchanged, {} removed",
            exit_code,
            report.new_count,
            report.changed_count,
            report.unchanged_count,
            report.removed_count
        );
        if let Some(path) = &self.report_path {
            if let Err(e) = report.save(path) {
                tracing::error!("Failed to save crawl report to {}: {}", path.display(), e);
            }
        }
        self.last_report = Some(report);

        handler.crawl_stopped(exit_code);
        self.finish_run();
        Ok(exit_code)
    }

    /// Forgets every fingerprint, forcing the next crawl to start over
    ///
    /// Each known resource is announced with `clearing_object` before it is
    /// dropped.
    pub fn clear(&mut self, handler: &mut dyn CrawlerHandler) -> Result<ExitCode> {
        self.state
            .transition(CrawlerState::Idle, CrawlerState::Clearing)
            .map_err(CrawlError::Busy)?;

        handler.clear_started();
        self.load_fingerprints();

        let mut exit_code = ExitCode::Completed;
        let mut cleared = 0usize;
        for id in self.store.known_ids() {
            if self.cancel.is_cancelled() {
                exit_code = ExitCode::StopRequested;
                break;
            }
            handler.clearing_object(&id);
            match self.store.remove(&id) {
                Ok(()) => cleared += 1,
                Err(e) => tracing::warn!("Failed to clear {}: {}", id, e),
            }
        }

        if let Err(e) = self.store.store() {
            tracing::error!("Failed to persist fingerprints: {}", e);
        }
        tracing::info!("Cleared {} resources ({})", cleared, exit_code);

        handler.clear_finished(exit_code);
        self.finish_run();
        Ok(exit_code)
    }

    /// Retrieves any resource by identifier, unwrapping containers on the way
    pub fn fetch(&self, id: &str, handler: &mut dyn SubCrawlerHandler) -> Result<Resource> {
        resolve::fetch(
            self.source.as_ref(),
            &self.registry,
            &self.cancel,
            id,
            handler,
        )
    }

    fn load_fingerprints(&mut self) {
        if let Err(e) = self.store.load() {
            tracing::error!(
                "Failed to load fingerprints, every resource will be reported as new: {}",
                e
            );
            for id in self.store.known_ids() {
                if let Err(e) = self.store.remove(&id) {
                    tracing::warn!("Failed to drop fingerprint of {}: {}", id, e);
                }
            }
        }
    }

    fn finish_run(&mut self) {
        self.cancel.reset();
        self.state.set(CrawlerState::Idle);
    }
}

/// Marker returned when a stop request interrupts a run
struct Stopped;

type Step = std::result::Result<(), Stopped>;

/// A container waiting to be unwrapped
struct Container {
    id: String,
    content_type: String,
    bytes: Arc<[u8]>,
    factory: Arc<dyn UnwrapperFactory>,
}

/// Content of a new or changed top-level resource
enum Payload {
    Stream(ResourceStream),
    Bytes(Arc<[u8]>),
}

/// State of one crawl run, borrowed from the crawler
struct Pass<'c> {
    store: &'c mut dyn FingerprintStore,
    registry: &'c UnwrapperRegistry,
    sniffer: &'c dyn ContentSniffer,
    settings: &'c CrawlerConfig,
    cancel: &'c CancelToken,
    source_id: &'c str,
    handler: &'c mut dyn CrawlerHandler,
    report: &'c mut CrawlReport,
    /// Known resources not seen again yet
    deprecated: BTreeSet<String>,
}

impl Pass<'_> {
    fn run(&mut self, source: &dyn DataSource) -> ExitCode {
        let entries = match source.entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to enumerate {}: {}", self.source_id, e);
                return ExitCode::FatalError;
            }
        };

        for entry in entries {
            if self.cancel.is_cancelled() {
                tracing::info!("Stop requested, ending crawl of {}", self.source_id);
                return ExitCode::StopRequested;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!("Enumeration of {} failed: {}", self.source_id, e);
                    return ExitCode::FatalError;
                }
            };

            if self.visit(entry).is_err() {
                tracing::info!("Stop requested, ending crawl of {}", self.source_id);
                return ExitCode::StopRequested;
            }
        }

        ExitCode::Completed
    }

    fn check_cancel(&self) -> Step {
        if self.cancel.is_cancelled() {
            Err(Stopped)
        } else {
            Ok(())
        }
    }

    /// Classifies one top-level resource and delivers it if it is new or changed
    fn visit(&mut self, entry: SourceEntry) -> Step {
        let id = entry.id.clone();
        self.deprecated.remove(&id);
        self.handler.accessing_object(&id);

        let previous = self.store.get(&id, FINGERPRINT_KEY).map(str::to_string);
        let content_type = entry.content_type.clone();

        let (fingerprint, payload) = match entry.fingerprint.clone() {
            Some(fingerprint) => {
                if previous.as_deref() == Some(fingerprint.as_str()) {
                    return self.not_modified(&id);
                }
                match entry.open() {
                    Ok(stream) => (fingerprint, Payload::Stream(stream)),
                    Err(e) => {
                        tracing::warn!("Failed to open {}: {}", id, e);
                        return self.skip(&id);
                    }
                }
            }
            None => {
                let bytes = match entry.open().and_then(read_all) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("Failed to read {}: {}", id, e);
                        return self.skip(&id);
                    }
                };
                let fingerprint = store::content_hash(&bytes);
                if previous.as_deref() == Some(fingerprint.as_str()) {
                    return self.not_modified(&id);
                }
                (fingerprint, Payload::Bytes(bytes))
            }
        };

        self.deliver(id, content_type, &fingerprint, previous, payload)
    }

    /// Records and reports a new or changed top-level resource, then unwraps it
    ///
    /// `previous` is the fingerprint recorded by an earlier run. It is put back
    /// if a stop request interrupts the unwrapping, so the next run unwraps the
    /// resource again.
    fn deliver(
        &mut self,
        id: String,
        declared_type: Option<String>,
        fingerprint: &str,
        previous: Option<String>,
        payload: Payload,
    ) -> Step {
        let changed = previous.is_some();
        let sniff_bytes = self.settings.sniff_bytes;

        let (content_type, content) = match payload {
            Payload::Bytes(bytes) => {
                let content_type = declared_type.or_else(|| {
                    let head = &bytes[..bytes.len().min(sniff_bytes)];
                    self.sniffer.identify(head, Some(id.as_str()))
                });
                (content_type, Payload::Bytes(bytes))
            }
            Payload::Stream(stream) => {
                let mut reader = BufReader::with_capacity(sniff_bytes, stream);
                let content_type = match declared_type {
                    Some(declared) => Some(declared),
                    None => match reader.fill_buf() {
                        Ok(head) => self.sniffer.identify(head, Some(id.as_str())),
                        Err(e) => {
                            tracing::warn!("Failed to read {}: {}", id, e);
                            return self.skip(&id);
                        }
                    },
                };
                (content_type, Payload::Stream(Box::new(reader)))
            }
        };

        let factory = content_type
            .as_deref()
            .and_then(|content_type| self.unwrapper_for(&id, content_type));

        // Containers are held in memory so they can be both reported and unwrapped
        let content = match (content, &factory) {
            (Payload::Stream(stream), Some(_)) => match read_all(stream) {
                Ok(bytes) => Payload::Bytes(bytes),
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", id, e);
                    return self.skip(&id);
                }
            },
            (content, _) => content,
        };

        if let Err(e) = self.store.put(&id, FINGERPRINT_KEY, fingerprint) {
            tracing::warn!("Failed to record fingerprint of {}: {}", id, e);
        }

        let bytes = match &content {
            Payload::Bytes(bytes) if factory.is_some() => Some(Arc::clone(bytes)),
            _ => None,
        };
        let metadata = self.handler.metadata_container(&id);
        let resource = match content {
            Payload::Bytes(bytes) => {
                Resource::from_bytes(id.as_str(), self.source_id, metadata, bytes)
            }
            Payload::Stream(stream) => {
                Resource::from_reader(id.as_str(), self.source_id, metadata, stream)
            }
        }
        .with_content_type(content_type.clone());
        self.notify(resource, changed);

        let (factory, content_type, bytes) = match (factory, content_type, bytes) {
            (Some(factory), Some(content_type), Some(bytes)) => (factory, content_type, bytes),
            _ => return Ok(()),
        };
        let root = Container {
            id: id.clone(),
            content_type,
            bytes,
            factory,
        };
        let unfinished = match self.expand(root) {
            Ok(()) => return Ok(()),
            Err(unfinished) => unfinished,
        };

        self.forget_expansion(&id, unfinished);
        let restored = match &previous {
            Some(previous) => self.store.put(&id, FINGERPRINT_KEY, previous),
            None => self.store.remove_key(&id, FINGERPRINT_KEY),
        };
        if let Err(e) = restored {
            tracing::warn!("Failed to restore fingerprint of {}: {}", id, e);
        }
        Err(Stopped)
    }

    /// Re-observes the recorded descendants of a resource that could not be
    /// read, so they are not reported as removed
    fn skip(&mut self, id: &str) -> Step {
        self.walk_descendants(id, false)
    }

    fn notify(&mut self, resource: Resource, changed: bool) {
        tracing::debug!(
            "{} {}",
            if changed { "Changed" } else { "New" },
            resource.id()
        );
        if changed {
            self.report.record_changed();
            self.handler.object_changed(resource);
        } else {
            self.report.record_new();
            self.handler.object_new(resource);
        }
    }

    /// Picks the first unwrapper for `content_type` unless `id` is nested too deeply
    fn unwrapper_for(&self, id: &str, content_type: &str) -> Option<Arc<dyn UnwrapperFactory>> {
        let factory = self.registry.by_content_type(content_type).into_iter().next()?;
        let depth = id::depth(id).ok()?;
        if depth >= self.settings.max_depth as usize {
            tracing::warn!(
                "Not unwrapping {}: nesting limit of {} reached",
                id,
                self.settings.max_depth
            );
            return None;
        }
        Some(factory)
    }

    /// Reports an unchanged resource and everything it contained
    fn not_modified(&mut self, id: &str) -> Step {
        tracing::debug!("Unchanged {}", id);
        self.report.record_unchanged();
        self.handler.object_not_modified(id);
        self.walk_descendants(id, true)
    }

    /// Marks the recorded descendants of `id` as seen, reporting each one as
    /// unchanged if `report` is set
    fn walk_descendants(&mut self, id: &str, report: bool) -> Step {
        let mut seen = HashSet::from([id.to_string()]);
        let mut pending = vec![id.to_string()];

        while let Some(current) = pending.pop() {
            let children: Vec<String> = match self.store.referred_ids(&current) {
                Some(children) => children.iter().cloned().collect(),
                None => continue,
            };

            for child in children {
                self.check_cancel()?;
                if !seen.insert(child.clone()) {
                    continue;
                }
                self.deprecated.remove(&child);
                if report {
                    self.report.record_unchanged();
                    self.handler.object_not_modified(&child);
                }
                pending.push(child);
            }
        }

        Ok(())
    }

    /// Unwraps a container and, in turn, every container among its children
    ///
    /// On a stop request, returns the containers whose children were not all
    /// delivered and the children that were classified but not delivered.
    fn expand(&mut self, root: Container) -> std::result::Result<(), Vec<String>> {
        let mut queue = VecDeque::from([root]);

        while let Some(container) = queue.pop_front() {
            if self.check_cancel().is_err() {
                return Err(interrupted(container, queue, Vec::new()));
            }

            let mut events = self.unwrap_container(&container).into_iter();
            while let Some(event) = events.next() {
                let undelivered = if self.check_cancel().is_err() {
                    Some(event)
                } else {
                    match self.child(&container.id, event) {
                        Ok(Some(child)) => {
                            queue.push_back(child);
                            continue;
                        }
                        Ok(None) => continue,
                        Err(Stopped) => None,
                    }
                };
                let rest = undelivered.into_iter().chain(events).collect();
                return Err(interrupted(container, queue, rest));
            }
        }

        Ok(())
    }

    /// Forgets the content hashes of `ids` and of their ancestors below the
    /// top-level resource `root`, so the next run reports them again
    fn forget_expansion(&mut self, root: &str, ids: Vec<String>) {
        let mut forgotten = BTreeSet::new();
        for id in ids {
            let mut current = Some(id);
            while let Some(id) = current.take() {
                if id == root || forgotten.contains(&id) {
                    continue;
                }
                current = id::parent_id(&id).ok().flatten().map(str::to_string);
                forgotten.insert(id);
            }
        }

        tracing::debug!(
            "Expansion of {} interrupted, forgetting {} nested resources",
            root,
            forgotten.len()
        );
        for id in forgotten {
            if let Err(e) = self.store.remove_key(&id, CONTENT_HASH_KEY) {
                tracing::warn!("Failed to forget content hash of {}: {}", id, e);
            }
        }
    }

    /// Runs the unwrapper and collects what it reported
    ///
    /// A failing unwrapper only loses the children it had not reported yet.
    fn unwrap_container(&mut self, container: &Container) -> Vec<ChildEvent> {
        if let Err(e) = self.store.remove_referred_ids(&container.id) {
            tracing::warn!("Failed to reset children of {}: {}", container.id, e);
        }

        let unwrapper = container.factory.create(self.cancel.child());
        let mut collector = ChildCollector::new(&mut *self.handler);
        let result = {
            let mut scoped = ScopedFingerprints::new(&mut *self.store, &container.id);
            let cx = UnwrapContext::new(&container.id, self.source_id)
                .with_content_type(Some(container.content_type.as_str()))
                .with_fingerprints(&mut scoped);
            unwrapper.unwrap(cx, &mut Cursor::new(&container.bytes[..]), &mut collector)
        };

        match result {
            Ok(()) => tracing::debug!(
                "Unwrapped {} children from {}",
                collector.events.len(),
                container.id
            ),
            Err(UnwrapError::Cancelled) => {
                tracing::debug!("Unwrapping of {} was cancelled", container.id)
            }
            Err(e) => tracing::warn!("Failed to unwrap {}: {}", container.id, e),
        }

        collector.events
    }

    /// Records and delivers one child, returning it if it must be unwrapped too
    fn child(
        &mut self,
        parent: &str,
        event: ChildEvent,
    ) -> std::result::Result<Option<Container>, Stopped> {
        let child_id = event.id().to_string();
        if let Err(e) = self.store.put_referred_id(parent, &child_id) {
            tracing::warn!("Failed to record {} as a child of {}: {}", child_id, parent, e);
        }
        self.deprecated.remove(&child_id);

        let (mut resource, changed) = match event {
            ChildEvent::NotModified(id) => {
                self.not_modified(&id)?;
                return Ok(None);
            }
            ChildEvent::New(resource) => (resource, false),
            ChildEvent::Changed(resource) => (resource, true),
        };

        let container = self.nested_container(&mut resource);
        self.notify(resource, changed);
        Ok(container)
    }

    /// Identifies a child's content type and selects its unwrapper, if any
    fn nested_container(&self, resource: &mut Resource) -> Option<Container> {
        if resource.content_type().is_none() {
            let head = match resource.buffer() {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", resource.id(), e);
                    return None;
                }
            };
            let head = &head[..head.len().min(self.settings.sniff_bytes)];
            let sniffed = self.sniffer.identify(head, Some(resource.id()));
            resource.set_content_type(sniffed);
        }

        let content_type = resource.content_type()?.to_string();
        let factory = self.unwrapper_for(resource.id(), &content_type)?;
        match resource.buffer() {
            Ok(bytes) => Some(Container {
                id: resource.id().to_string(),
                content_type,
                bytes,
                factory,
            }),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", resource.id(), e);
                None
            }
        }
    }

    /// Reports and forgets every known resource this run did not see
    fn report_removals(&mut self) {
        for id in std::mem::take(&mut self.deprecated) {
            if let Err(e) = self.store.remove(&id) {
                tracing::warn!("Failed to remove fingerprint of {}: {}", id, e);
                continue;
            }
            self.report.record_removed();
            self.handler.object_removed(&id);
        }
    }
}

/// Something an unwrapper reported about one child
enum ChildEvent {
    New(Resource),
    Changed(Resource),
    NotModified(String),
}

impl ChildEvent {
    fn id(&self) -> &str {
        match self {
            Self::New(resource) | Self::Changed(resource) => resource.id(),
            Self::NotModified(id) => id,
        }
    }
}

/// Handler given to unwrappers: queues child events for the crawler and
/// forwards metadata container requests to the real handler
struct ChildCollector<'h> {
    handler: &'h mut dyn CrawlerHandler,
    events: Vec<ChildEvent>,
}

impl<'h> ChildCollector<'h> {
    fn new(handler: &'h mut dyn CrawlerHandler) -> Self {
        Self {
            handler,
            events: Vec::new(),
        }
    }
}

impl SubCrawlerHandler for ChildCollector<'_> {
    fn object_new(&mut self, resource: Resource) {
        self.events.push(ChildEvent::New(resource));
    }

    fn object_changed(&mut self, resource: Resource) {
        self.events.push(ChildEvent::Changed(resource));
    }

    fn object_not_modified(&mut self, id: &str) {
        self.events.push(ChildEvent::NotModified(id.to_string()));
    }

    fn metadata_container(&mut self, id: &str) -> Box<dyn MetadataContainer> {
        self.handler.metadata_container(id)
    }
}

/// Identifiers to forget when the expansion of `current` is interrupted
fn interrupted(
    current: Container,
    queue: VecDeque<Container>,
    undelivered: Vec<ChildEvent>,
) -> Vec<String> {
    let mut ids = vec![current.id];
    ids.extend(queue.into_iter().map(|container| container.id));
    ids.extend(undelivered.into_iter().filter_map(|event| match event {
        ChildEvent::New(resource) | ChildEvent::Changed(resource) => {
            Some(resource.id().to_string())
        }
        ChildEvent::NotModified(_) => None,
    }));
    ids
}

fn read_all(mut stream: impl Read) -> std::io::Result<Arc<[u8]>> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    Ok(bytes.into())
}
