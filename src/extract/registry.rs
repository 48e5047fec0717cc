//! Extractor registry — the fixed name → implementation table
//!
//! Built once at startup and passed by reference to the drivers, so tests
//! can swap in their own table. Registering two extractors under one name
//! is a programmer error and panics at construction time; looking up a
//! name nobody registered is a configuration error the caller must treat
//! as fatal.

use super::wrapper::{Extractor, ExtractorFn};
use std::collections::BTreeMap;
use thiserror::Error;

/// The dispatch config named an extractor that does not exist.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("no extractor registered under '{0}'")]
pub struct UnknownExtractor(pub String);

/// Immutable name → extractor table.
pub struct ExtractorRegistry {
    extractors: BTreeMap<&'static str, Extractor>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExtractorRegistry {
    /// An empty registry, for tests that bring their own extractors.
    pub fn empty() -> Self {
        Self { extractors: BTreeMap::new() }
    }

    /// The registry of all built-in extractors.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("poly_line_text_extractor", super::poly_line_text_extractor);
        registry.register("question_extractor", super::question_extractor);
        registry
    }

    pub fn register(&mut self, name: &'static str, extractor: ExtractorFn) {
        let previous = self.extractors.insert(name, Extractor::new(name, extractor));
        assert!(previous.is_none(), "extractor '{}' registered twice", name);
    }

    pub fn get(&self, name: &str) -> Result<&Extractor, UnknownExtractor> {
        self.extractors.get(name).ok_or_else(|| UnknownExtractor(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extractors.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_extractors_resolve() {
        let registry = ExtractorRegistry::builtin();
        assert!(registry.get("poly_line_text_extractor").is_ok());
        assert!(registry.get("question_extractor").is_ok());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = ExtractorRegistry::builtin();
        let err = registry.get("shape_extractor").unwrap_err();
        assert_eq!(err, UnknownExtractor("shape_extractor".into()));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut registry = ExtractorRegistry::builtin();
        registry.register("question_extractor", super::super::question_extractor);
    }
}
