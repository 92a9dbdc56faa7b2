//! Event handlers receiving crawl results

use crate::report::ExitCode;
use crate::resource::{MetadataContainer, RecordMetadata, Resource};

/// Receiver of the resources an unwrapper produces
///
/// Resources handed over in [`object_new`](Self::object_new) and
/// [`object_changed`](Self::object_changed) belong to the handler, which
/// disposes them when done.
pub trait SubCrawlerHandler {
    /// A resource that was not known before
    fn object_new(&mut self, resource: Resource);

    /// A known resource whose fingerprint differs from the recorded one
    fn object_changed(&mut self, resource: Resource);

    /// A known resource with the recorded fingerprint
    fn object_not_modified(&mut self, id: &str);

    /// Supplies the metadata container for a resource about to be reported
    fn metadata_container(&mut self, id: &str) -> Box<dyn MetadataContainer> {
        let _ = id;
        Box::new(RecordMetadata::new())
    }
}

/// Receiver of the events of a whole crawl or clear run
#[allow(unused_variables)]
pub trait CrawlerHandler: SubCrawlerHandler {
    fn crawl_started(&mut self) {}

    /// A top-level resource is about to be inspected
    fn accessing_object(&mut self, id: &str) {}

    /// A resource seen by an earlier run no longer exists
    ///
    /// Only emitted after every other event of a completed run.
    fn object_removed(&mut self, id: &str) {}

    fn clear_started(&mut self) {}

    fn clearing_object(&mut self, id: &str) {}

    fn clear_finished(&mut self, exit_code: ExitCode) {}

    /// Emitted exactly once at the end of every crawl run
    fn crawl_stopped(&mut self, exit_code: ExitCode) {}
}
