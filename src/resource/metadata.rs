use std::collections::BTreeMap;

/// Property names used by the built-in unwrappers
pub mod property {
    pub const FILE_NAME: &str = "file-name";
    pub const FILE_SIZE: &str = "file-size";
    pub const MODIFIED: &str = "modified";
    pub const FULL_NAME: &str = "full-name";
    pub const EMAIL: &str = "email";
    pub const SUBJECT: &str = "subject";
    pub const FROM: &str = "from";
    pub const DATE: &str = "date";
    pub const MESSAGE_ID: &str = "message-id";
}

/// Carrier for metadata describing one resource
///
/// Containers are supplied by the crawler handler, so the core never needs to
/// know how metadata is stored. Unwrappers add whatever their format exposes.
pub trait MetadataContainer: Send {
    /// Adds a value for `property`, keeping any values already present
    fn add(&mut self, property: &str, value: &str);

    /// Returns every value recorded for `property`
    fn values(&self, property: &str) -> Vec<String>;

    /// Releases anything the container holds on to
    fn dispose(&mut self) {}
}

/// Default metadata container: an ordered multimap of property values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordMetadata {
    properties: BTreeMap<String, Vec<String>>,
}

impl RecordMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value recorded for `property`
    pub fn first(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl MetadataContainer for RecordMetadata {
    fn add(&mut self, property: &str, value: &str) {
        self.properties
            .entry(property.to_string())
            .or_default()
            .push(value.to_string());
    }

    fn values(&self, property: &str) -> Vec<String> {
        self.properties.get(property).cloned().unwrap_or_default()
    }

    fn dispose(&mut self) {
        self.properties.clear();
    }
}
