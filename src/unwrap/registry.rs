//! Unwrapper lookup by content type and scheme

use super::{GzipFactory, MboxFactory, TarFactory, UnwrapperFactory, VcardFactory, ZipFactory};
use std::fmt;
use std::sync::Arc;

/// Registry of unwrapper factories
///
/// Lookups return every matching factory in registration order. Callers
/// conventionally use the first one.
#[derive(Clone, Default)]
pub struct UnwrapperRegistry {
    factories: Vec<Arc<dyn UnwrapperFactory>>,
}

impl UnwrapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn UnwrapperFactory>) {
        self.factories.push(factory);
    }

    /// Removes a previously registered factory, returning true if it was found
    pub fn unregister(&mut self, factory: &Arc<dyn UnwrapperFactory>) -> bool {
        let before = self.factories.len();
        self.factories
            .retain(|registered| !same_factory(registered, factory));
        self.factories.len() != before
    }

    /// Factories able to unwrap `content_type`
    ///
    /// Matching ignores case and any `;` parameters.
    pub fn by_content_type(&self, content_type: &str) -> Vec<Arc<dyn UnwrapperFactory>> {
        let wanted = essence(content_type);
        self.factories
            .iter()
            .filter(|factory| {
                factory
                    .content_types()
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(wanted))
            })
            .cloned()
            .collect()
    }

    /// Factories producing children with identifier scheme `scheme`
    pub fn by_scheme(&self, scheme: &str) -> Vec<Arc<dyn UnwrapperFactory>> {
        self.factories
            .iter()
            .filter(|factory| factory.scheme() == scheme)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for UnwrapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|factory| factory.scheme()))
            .finish()
    }
}

/// Creates a registry with every built-in unwrapper
pub fn default_registry() -> UnwrapperRegistry {
    let mut registry = UnwrapperRegistry::new();
    registry.register(Arc::new(GzipFactory));
    registry.register(Arc::new(TarFactory));
    registry.register(Arc::new(ZipFactory));
    registry.register(Arc::new(VcardFactory));
    registry.register(Arc::new(MboxFactory));
    registry
}

fn essence(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

fn same_factory(a: &Arc<dyn UnwrapperFactory>, b: &Arc<dyn UnwrapperFactory>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CancelToken;
    use crate::source::mime;
    use crate::unwrap::Unwrapper;

    struct NamedFactory(&'static str);

    impl UnwrapperFactory for NamedFactory {
        fn scheme(&self) -> &str {
            self.0
        }

        fn content_types(&self) -> &[&str] {
            &[mime::TAR]
        }

        fn create(&self, cancel: CancelToken) -> Box<dyn Unwrapper> {
            TarFactory.create(cancel)
        }
    }

    #[test]
    fn test_default_registry_lookups() {
        let registry = default_registry();
        assert_eq!(registry.len(), 5);

        assert_eq!(registry.by_content_type(mime::GZIP)[0].scheme(), "gzip");
        assert_eq!(registry.by_content_type(mime::X_GZIP)[0].scheme(), "gzip");
        assert_eq!(registry.by_content_type(mime::TAR)[0].scheme(), "tar");
        assert_eq!(registry.by_content_type(mime::ZIP)[0].scheme(), "zip");
        assert_eq!(registry.by_content_type(mime::VCARD)[0].scheme(), "vcard");
        assert_eq!(registry.by_content_type(mime::MBOX)[0].scheme(), "mbox");
        assert!(registry.by_content_type(mime::TEXT).is_empty());

        assert_eq!(registry.by_scheme("tar").len(), 1);
        assert!(registry.by_scheme("rar").is_empty());
    }

    #[test]
    fn test_content_type_parameters_and_case_ignored() {
        let registry = default_registry();
        let found = registry.by_content_type("Text/VCard; charset=utf-8");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].scheme(), "vcard");
    }

    #[test]
    fn test_registration_order() {
        let mut registry = default_registry();
        registry.register(Arc::new(NamedFactory("tar2")));

        let schemes: Vec<_> = registry
            .by_content_type(mime::TAR)
            .iter()
            .map(|f| f.scheme().to_string())
            .collect();
        assert_eq!(schemes, vec!["tar", "tar2"]);
    }

    #[test]
    fn test_unregister() {
        let mut registry = UnwrapperRegistry::new();
        let first: Arc<dyn UnwrapperFactory> = Arc::new(NamedFactory("a"));
        let second: Arc<dyn UnwrapperFactory> = Arc::new(NamedFactory("b"));
        registry.register(Arc::clone(&first));
        registry.register(Arc::clone(&second));

        assert!(registry.unregister(&first));
        assert!(!registry.unregister(&first));
        assert!(registry.by_scheme("a").is_empty());
        assert_eq!(registry.by_scheme("b").len(), 1);
    }
}
