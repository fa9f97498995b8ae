use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::SourceFailure;

/// A best-effort result: the merged value plus every source that did not
/// contribute to it, keyed by artifact name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Partial<T> {
    pub value: T,
    pub failed: BTreeMap<String, SourceFailure>,
}

impl<T> Partial<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            failed: BTreeMap::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record(&mut self, source: impl Into<String>, failure: SourceFailure) {
        self.failed.insert(source.into(), failure);
    }

    pub fn failure(&self, source: &str) -> Option<&SourceFailure> {
        self.failed.get(source)
    }

    /// Sources that degraded for any reason other than being absent.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &SourceFailure)> {
        self.failed
            .iter()
            .filter(|(_, f)| **f != SourceFailure::NotFound)
            .map(|(name, f)| (name.as_str(), f))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Partial<U> {
        Partial {
            value: f(self.value),
            failed: self.failed,
        }
    }
}
