//! Mailbox unwrapper

use super::{
    check_cancelled, path_not_found, UnwrapContext, UnwrapError, UnwrapResult, Unwrapper,
    UnwrapperFactory,
};
use crate::crawler::{CancelToken, SubCrawlerHandler};
use crate::id;
use crate::resource::{property, MetadataContainer, Resource};
use crate::source::mime;
use crate::store;
use std::collections::HashSet;
use std::io::Read;

pub const SCHEME: &str = "mbox";

const CONTENT_TYPES: &[&str] = &[mime::MBOX];

const SEPARATOR_PREFIX: &str = "From ";

#[derive(Debug, Clone, Copy, Default)]
pub struct MboxFactory;

impl UnwrapperFactory for MboxFactory {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn content_types(&self) -> &[&str] {
        CONTENT_TYPES
    }

    fn create(&self, cancel: CancelToken) -> Box<dyn Unwrapper> {
        Box::new(MboxUnwrapper::new(cancel))
    }
}

/// Unwraps an mbox file into one `message/rfc822` child per message
///
/// Messages are addressed by their `Message-ID` without angle brackets, or
/// by `message-N` (counting from 1) when it is missing or repeated. Body
/// lines escaped as `>From ` are restored.
#[derive(Debug, Clone, Default)]
pub struct MboxUnwrapper {
    cancel: CancelToken,
}

#[derive(Debug)]
struct Message {
    path: String,
    text: String,
    headers: Vec<(String, String)>,
}

impl Message {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn describe(&self, metadata: &mut dyn MetadataContainer) {
        let headers = [
            ("Subject", property::SUBJECT),
            ("From", property::FROM),
            ("Date", property::DATE),
            ("Message-ID", property::MESSAGE_ID),
        ];
        for (header, key) in headers {
            if let Some(value) = self.header(header) {
                metadata.add(key, value);
            }
        }
    }

    fn into_resource(
        self,
        child_id: String,
        source_id: &str,
        handler: &mut dyn SubCrawlerHandler,
    ) -> Resource {
        let mut metadata = handler.metadata_container(&child_id);
        self.describe(metadata.as_mut());
        Resource::from_bytes(child_id, source_id, metadata, self.text.into_bytes())
            .with_content_type(Some(mime::RFC822.to_string()))
    }
}

impl MboxUnwrapper {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    fn messages(text: &str) -> UnwrapResult<Vec<Message>> {
        let mut blocks: Vec<Vec<&str>> = Vec::new();

        for line in text.lines() {
            if line.starts_with(SEPARATOR_PREFIX) {
                blocks.push(Vec::new());
            } else if let Some(block) = blocks.last_mut() {
                block.push(line);
            } else if !line.trim().is_empty() {
                return Err(UnwrapError::Format(
                    "mailbox does not start with a From line".to_string(),
                ));
            }
        }

        let mut used_paths = HashSet::new();
        let messages = blocks
            .into_iter()
            .enumerate()
            .map(|(i, lines)| Self::build(i + 1, lines, &mut used_paths))
            .collect();
        Ok(messages)
    }

    fn build(index: usize, mut lines: Vec<&str>, used_paths: &mut HashSet<String>) -> Message {
        // The blank line before the next separator belongs to the mailbox
        if lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }

        let lines: Vec<&str> = lines.into_iter().map(unescape_from).collect();
        let headers = parse_headers(&lines);

        let message_id = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("Message-ID"))
            .map(|(_, value)| value.trim_start_matches('<').trim_end_matches('>').to_string())
            .filter(|id| !id.is_empty());
        let path = match message_id {
            Some(id) if !used_paths.contains(&id) => id,
            _ => format!("message-{}", index),
        };
        used_paths.insert(path.clone());

        let mut text = lines.join("\n");
        text.push('\n');

        Message {
            path,
            text,
            headers,
        }
    }

    fn read_text(stream: &mut dyn Read) -> UnwrapResult<String> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Unwrapper for MboxUnwrapper {
    fn unwrap(
        &self,
        mut cx: UnwrapContext<'_>,
        stream: &mut dyn Read,
        handler: &mut dyn SubCrawlerHandler,
    ) -> UnwrapResult<()> {
        let text = Self::read_text(stream)?;

        for message in Self::messages(&text)? {
            check_cancelled(&self.cancel)?;

            let child_id = cx.child_id(SCHEME, &message.path)?;
            let fingerprint = store::content_hash(message.text.as_bytes());
            let resource = message.into_resource(child_id, cx.source_id, handler);
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
        let text = Self::read_text(stream)?;

        let message = Self::messages(&text)?
            .into_iter()
            .find(|message| message.path == path)
            .ok_or_else(|| path_not_found(parent_id, path))?;

        let child_id = id::compose(parent_id, SCHEME, &message.path)?;
        Ok(message.into_resource(child_id, source_id, handler))
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Removes one level of `>` quoting from a `>From ` line
fn unescape_from(line: &str) -> &str {
    let quoted = line.trim_start_matches('>');
    if line.starts_with('>') && quoted.starts_with(SEPARATOR_PREFIX) {
        &line[1..]
    } else {
        line
    }
}

/// Parses the header block, unfolding continuation lines
fn parse_headers(lines: &[&str]) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FingerprintMap;
    use crate::unwrap::testing::{read_text, RecordingHandler};
    use std::io::Cursor;

    const PARENT: &str = "file:///mail/inbox.mbox";

    const MAILBOX: &str = "From alice@example.com Mon Jan  1 00:00:00 2024
From: Alice <alice@example.com>
Subject: Quarterly
 numbers
Message-ID: <q1@example.com>

Numbers attached.
>From the archive.

From bob@example.com Mon Jan  1 01:00:00 2024
From: Bob <bob@example.com>
Subject: Lunch

Noon?
";

    fn unwrap_text(text: &str, map: &mut FingerprintMap) -> UnwrapResult<RecordingHandler> {
        let mut handler = RecordingHandler::default();
        let cx = UnwrapContext::new(PARENT, "test").with_fingerprints(map);
        MboxUnwrapper::default().unwrap(cx, &mut Cursor::new(text.as_bytes()), &mut handler)?;
        Ok(handler)
    }

    #[test]
    fn test_one_child_per_message() {
        let mut map = FingerprintMap::new();
        let mut handler = unwrap_text(MAILBOX, &mut map).unwrap();

        assert_eq!(
            handler.new_ids(),
            vec![
                "mbox:file:///mail/inbox.mbox!/q1@example.com",
                "mbox:file:///mail/inbox.mbox!/message-2",
            ]
        );

        let first = &mut handler.new[0];
        assert_eq!(first.content_type(), Some(mime::RFC822));
        assert_eq!(
            first.metadata().values(property::SUBJECT),
            vec!["Quarterly numbers"]
        );
        assert_eq!(
            first.metadata().values(property::MESSAGE_ID),
            vec!["<q1@example.com>"]
        );

        let body = read_text(first);
        assert!(body.contains("\nFrom the archive.\n"));
        assert!(body.ends_with("Numbers attached.\nFrom the archive.\n"));
    }

    #[test]
    fn test_unchanged_on_second_pass() {
        let mut map = FingerprintMap::new();
        unwrap_text(MAILBOX, &mut map).unwrap();

        let handler = unwrap_text(MAILBOX, &mut map).unwrap();
        assert!(handler.new.is_empty());
        assert_eq!(handler.not_modified.len(), 2);

        let edited = MAILBOX.replace("Noon?", "One?");
        let handler = unwrap_text(&edited, &mut map).unwrap();
        assert_eq!(
            handler.changed_ids(),
            vec!["mbox:file:///mail/inbox.mbox!/message-2"]
        );
    }

    #[test]
    fn test_not_a_mailbox() {
        let mut map = FingerprintMap::new();
        let result = unwrap_text("Subject: stray\n\nbody\n", &mut map);
        assert!(matches!(result, Err(UnwrapError::Format(_))));
    }

    #[test]
    fn test_unescape_from() {
        assert_eq!(unescape_from(">From here"), "From here");
        assert_eq!(unescape_from(">>From here"), ">From here");
        assert_eq!(unescape_from("> quoted"), "> quoted");
        assert_eq!(unescape_from("From here"), "From here");
    }

    #[test]
    fn test_fetch_by_message_id() {
        let mut handler = RecordingHandler::default();
        let unwrapper = MboxUnwrapper::default();

        let message = unwrapper
            .fetch(
                PARENT,
                "q1@example.com",
                &mut Cursor::new(MAILBOX.as_bytes()),
                "test",
                &mut handler,
            )
            .unwrap();
        assert_eq!(message.id(), "mbox:file:///mail/inbox.mbox!/q1@example.com");

        let missing = unwrapper.fetch(
            PARENT,
            "message-9",
            &mut Cursor::new(MAILBOX.as_bytes()),
            "test",
            &mut handler,
        );
        assert!(matches!(missing, Err(UnwrapError::PathNotFound { .. })));
    }
}
