//! Hierarchical resource identifiers
//!
//! Resources nested inside other resources are addressed by composing the
//! container's identifier with the scheme of the unwrapper that produced the
//! child and the child's path inside the container:
//!
//! ```text
//! tar:gzip:file:///data/a.tgz!/a.tar!/docs/read+me.txt
//! ```
//!
//! Every unwrap step adds one scheme prefix on the left and one `!/path`
//! segment on the right. A well-formed identifier therefore always carries
//! exactly one more scheme prefix than it has separators; anything else is
//! rejected with [`IdError::Malformed`] by every function in this module.
//!
//! The scheme of a root URI counts as its single prefix. Root URIs whose
//! opaque part itself starts with `token:` (for example `urn:isbn:…`) and root
//! URIs containing `!/` cannot be told apart from composite identifiers and
//! are rejected.

mod escape;

pub use escape::{escape_path, unescape_path};

use crate::{IdError, IdResult};

/// Separator between a container identifier and a child path
pub const SEPARATOR: &str = "!/";

/// Counts of the structural pieces of a validated identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    prefixes: usize,
    separators: usize,
}

/// Returns the byte offsets of the `:` terminating each leading scheme token
fn scheme_boundaries(id: &str) -> Vec<usize> {
    let bytes = id.as_bytes();
    let mut boundaries = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
        let mut end = pos + 1;
        while end < bytes.len() && is_scheme_char(bytes[end]) {
            end += 1;
        }
        if end < bytes.len() && bytes[end] == b':' {
            boundaries.push(end);
            pos = end + 1;
        } else {
            break;
        }
    }

    boundaries
}

fn is_scheme_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')
}

fn layout(id: &str) -> IdResult<(Layout, Vec<usize>)> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }

    let boundaries = scheme_boundaries(id);
    let layout = Layout {
        prefixes: boundaries.len(),
        separators: id.matches(SEPARATOR).count(),
    };

    if layout.prefixes == 0 {
        return Err(IdError::Malformed {
            id: id.to_string(),
            reason: "missing scheme prefix".to_string(),
        });
    }

    if layout.prefixes != layout.separators + 1 {
        return Err(IdError::Malformed {
            id: id.to_string(),
            reason: format!(
                "{} scheme prefixes for {} path separators",
                layout.prefixes, layout.separators
            ),
        });
    }

    Ok((layout, boundaries))
}

/// Checks that `id` is a well-formed identifier
pub fn validate(id: &str) -> IdResult<()> {
    layout(id).map(|_| ())
}

/// Checks that `scheme` can be used as an unwrapper scheme prefix
pub fn validate_scheme(scheme: &str) -> IdResult<()> {
    let bytes = scheme.as_bytes();
    let valid = !bytes.is_empty()
        && bytes[0].is_ascii_alphabetic()
        && bytes[1..].iter().all(|b| is_scheme_char(*b));

    if valid {
        Ok(())
    } else {
        Err(IdError::InvalidScheme(scheme.to_string()))
    }
}

/// Composes the identifier of a child resource
///
/// # Arguments
///
/// * `parent` - Identifier of the container
/// * `scheme` - Scheme of the unwrapper producing the child
/// * `path` - Unescaped path of the child inside the container
///
/// # Examples
///
/// ```
/// use burrow::id;
///
/// let child = id::compose("file:///data/f2", "tar", "a b.txt").unwrap();
/// assert_eq!(child, "tar:file:///data/f2!/a+b.txt");
/// assert_eq!(id::parent_id(&child).unwrap(), Some("file:///data/f2"));
/// assert_eq!(id::path(&child).unwrap().as_deref(), Some("a b.txt"));
/// ```
pub fn compose(parent: &str, scheme: &str, path: &str) -> IdResult<String> {
    validate(parent)?;
    validate_scheme(scheme)?;

    let escaped = escape_path(path);
    let mut id = String::with_capacity(scheme.len() + parent.len() + escaped.len() + 3);
    id.push_str(scheme);
    id.push(':');
    id.push_str(parent);
    id.push_str(SEPARATOR);
    id.push_str(&escaped);
    Ok(id)
}

/// Returns the bare URI of the top-level resource `id` was unwrapped from
pub fn root_id(id: &str) -> IdResult<&str> {
    let (layout, boundaries) = layout(id)?;

    let start = match layout.separators {
        0 => 0,
        n => boundaries[n - 1] + 1,
    };
    let end = id.find(SEPARATOR).unwrap_or(id.len());

    Ok(&id[start..end])
}

/// Returns the identifier of the container holding `id`
///
/// Returns `None` for root resources.
pub fn parent_id(id: &str) -> IdResult<Option<&str>> {
    let (layout, boundaries) = layout(id)?;
    if layout.separators == 0 {
        return Ok(None);
    }

    let start = boundaries[0] + 1;
    // layout() guarantees at least one separator exists
    let end = id.rfind(SEPARATOR).unwrap_or(id.len());
    Ok(Some(&id[start..end]))
}

/// Returns the scheme of the unwrapper that produced `id`
///
/// Returns `None` for root resources.
pub fn scheme(id: &str) -> IdResult<Option<&str>> {
    let (layout, boundaries) = layout(id)?;
    if layout.separators == 0 {
        return Ok(None);
    }
    Ok(Some(&id[..boundaries[0]]))
}

/// Returns the unescaped path of `id` inside its container
///
/// Returns `None` for root resources.
pub fn path(id: &str) -> IdResult<Option<String>> {
    let (layout, _) = layout(id)?;
    if layout.separators == 0 {
        return Ok(None);
    }

    let start = id.rfind(SEPARATOR).map(|i| i + SEPARATOR.len()).unwrap_or(0);
    unescape_path(&id[start..]).map(Some)
}

/// Returns true if `id` is a well-formed identifier of a nested resource
pub fn is_composite(id: &str) -> bool {
    matches!(layout(id), Ok((layout, _)) if layout.separators > 0)
}

/// Returns the number of unwrap steps between `id` and its root
pub fn depth(id: &str) -> IdResult<usize> {
    layout(id).map(|(layout, _)| layout.separators)
}

/// Returns true if `id` is `ancestor` itself or is nested somewhere below it
pub fn is_within(id: &str, ancestor: &str) -> bool {
    let mut current = Some(id);
    while let Some(candidate) = current {
        if candidate == ancestor {
            return true;
        }
        current = match parent_id(candidate) {
            Ok(parent) => parent,
            Err(_) => return false,
        };
    }
    false
}
