//! vCard collection unwrapper

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

pub const SCHEME: &str = "vcard";

const CONTENT_TYPES: &[&str] = &[mime::VCARD, mime::X_VCARD];

#[derive(Debug, Clone, Copy, Default)]
pub struct VcardFactory;

impl UnwrapperFactory for VcardFactory {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn content_types(&self) -> &[&str] {
        CONTENT_TYPES
    }

    fn create(&self, cancel: CancelToken) -> Box<dyn Unwrapper> {
        Box::new(VcardUnwrapper::new(cancel))
    }
}

/// Unwraps a vCard file into one child per contact
///
/// A contact is addressed by its `UID`, or by `contact-N` (counting from 1)
/// when it has none. The fingerprint covers the unfolded card without its
/// `REV` line, so a new revision stamp alone is not a change.
#[derive(Debug, Clone, Default)]
pub struct VcardUnwrapper {
    cancel: CancelToken,
}

/// One `BEGIN:VCARD` .. `END:VCARD` block
#[derive(Debug)]
struct Card {
    path: String,
    raw: String,
    properties: Vec<(String, String)>,
}

impl Card {
    fn first(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(property, _)| property == name)
            .map(|(_, value)| value.as_str())
    }

    fn fingerprint(&self, unfolded: &[String]) -> String {
        let canonical: Vec<&str> = unfolded
            .iter()
            .filter(|line| property_name(line) != "REV")
            .map(String::as_str)
            .collect();
        store::content_hash(canonical.join("\n").as_bytes())
    }

    fn describe(&self, metadata: &mut dyn MetadataContainer) {
        if let Some(name) = self.first("FN") {
            metadata.add(property::FULL_NAME, name);
        }
        for (name, value) in &self.properties {
            if name == "EMAIL" {
                metadata.add(property::EMAIL, value);
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
        Resource::from_bytes(child_id, source_id, metadata, self.raw.into_bytes())
            .with_content_type(Some(mime::DIRECTORY.to_string()))
    }
}

impl VcardUnwrapper {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Splits the collection into cards paired with their fingerprints
    ///
    /// A card left open at the end of the input is an error; the cards
    /// before it are still returned first.
    fn cards(text: &str) -> Vec<UnwrapResult<(Card, String)>> {
        let mut cards = Vec::new();
        let mut used_paths = HashSet::new();
        let mut current: Option<(Vec<&str>, Vec<String>)> = None;

        for physical in text.lines() {
            let is_continuation = physical.starts_with([' ', '\t']);

            match current.as_mut() {
                None => {
                    if physical.trim().eq_ignore_ascii_case("BEGIN:VCARD") {
                        current = Some((vec![physical], vec![physical.trim().to_string()]));
                    }
                }
                Some((raw, unfolded)) => {
                    raw.push(physical);
                    if is_continuation {
                        if let Some(last) = unfolded.last_mut() {
                            last.push_str(&physical[1..]);
                        }
                        continue;
                    }

                    if physical.trim().eq_ignore_ascii_case("BEGIN:VCARD") {
                        cards.push(Err(UnwrapError::Format(
                            "BEGIN:VCARD inside an open card".to_string(),
                        )));
                        return cards;
                    }

                    unfolded.push(physical.to_string());
                    if physical.trim().eq_ignore_ascii_case("END:VCARD") {
                        if let Some((raw, unfolded)) = current.take() {
                            let index = cards.len() + 1;
                            let card = Self::build(index, &raw, &unfolded, &mut used_paths);
                            let fingerprint = card.fingerprint(&unfolded);
                            cards.push(Ok((card, fingerprint)));
                        }
                    }
                }
            }
        }

        if current.is_some() {
            cards.push(Err(UnwrapError::Format(
                "card not terminated by END:VCARD".to_string(),
            )));
        }
        cards
    }

    fn build(
        index: usize,
        raw: &[&str],
        unfolded: &[String],
        used_paths: &mut HashSet<String>,
    ) -> Card {
        let properties: Vec<(String, String)> = unfolded
            .iter()
            .filter_map(|line| {
                let (_, value) = line.split_once(':')?;
                Some((property_name(line), value.trim().to_string()))
            })
            .collect();

        let uid = properties
            .iter()
            .find(|(name, value)| name == "UID" && !value.is_empty())
            .map(|(_, value)| value.clone());
        let path = match uid {
            Some(uid) if !used_paths.contains(&uid) => uid,
            _ => format!("contact-{}", index),
        };
        used_paths.insert(path.clone());

        let mut text = raw.join("\r\n");
        text.push_str("\r\n");

        Card {
            path,
            raw: text,
            properties,
        }
    }

    fn read_text(stream: &mut dyn Read) -> UnwrapResult<String> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Unwrapper for VcardUnwrapper {
    fn unwrap(
        &self,
        mut cx: UnwrapContext<'_>,
        stream: &mut dyn Read,
        handler: &mut dyn SubCrawlerHandler,
    ) -> UnwrapResult<()> {
        let text = Self::read_text(stream)?;

        for card in Self::cards(&text) {
            check_cancelled(&self.cancel)?;

            let (card, fingerprint) = card?;
            let child_id = cx.child_id(SCHEME, &card.path)?;
            let resource = card.into_resource(child_id, cx.source_id, handler);
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

        for card in Self::cards(&text) {
            let (card, _) = card?;
            if card.path == path {
                let child_id = id::compose(parent_id, SCHEME, &card.path)?;
                return Ok(card.into_resource(child_id, source_id, handler));
            }
        }

        Err(path_not_found(parent_id, path))
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Upper-cased property name of a content line, without group or parameters
fn property_name(line: &str) -> String {
    let name = line
        .split([':', ';'])
        .next()
        .unwrap_or(line);
    let name = name.rsplit('.').next().unwrap_or(name);
    name.trim().to_ascii_uppercase()
}
