//! On-demand retrieval of a single resource by identifier

use crate::crawler::cancel::CancelToken;
use crate::crawler::handler::SubCrawlerHandler;
use crate::id;
use crate::resource::Resource;
use crate::unwrap::{UnwrapError, UnwrapperRegistry};
use crate::Result;

/// Retrieves the resource `id` from `source`
///
/// A top-level identifier is opened directly. A nested one is reached by
/// unwrapping each ancestor in turn, starting from the root, with the
/// unwrapper registered for the scheme of that level. Nothing is classified
/// or recorded, and `handler` only supplies metadata containers.
pub fn fetch(
    source: &dyn crate::source::DataSource,
    registry: &UnwrapperRegistry,
    cancel: &CancelToken,
    id: &str,
    handler: &mut dyn SubCrawlerHandler,
) -> Result<Resource> {
    id::validate(id)?;
    let root = id::root_id(id)?;

    let entry = source.open(root)?;
    let content_type = entry.content_type.clone();
    let metadata = handler.metadata_container(root);
    let mut current = Resource::lazy(root, source.id(), metadata, entry.into_opener())
        .with_content_type(content_type);

    // Ancestors from the outermost nested level down to `id` itself
    let mut chain = Vec::new();
    let mut level = id;
    while let Some(parent) = id::parent_id(level)? {
        chain.push(level);
        level = parent;
    }

    for level in chain.into_iter().rev() {
        let (Some(scheme), Some(path), Some(parent)) =
            (id::scheme(level)?, id::path(level)?, id::parent_id(level)?)
        else {
            break;
        };

        let factory = registry
            .by_scheme(scheme)
            .into_iter()
            .next()
            .ok_or_else(|| UnwrapError::UnsupportedScheme(scheme.to_string()))?;

        tracing::debug!("Resolving {} inside {}", path, parent);
        let unwrapper = factory.create(cancel.child());
        let stream = current.stream()?;
        let next = unwrapper.fetch(parent, &path, stream, source.id(), handler)?;
        current.dispose();
        current = next;
    }

    Ok(current)
}
