//! Per-application index routing.
//!
//! A static two-level lookup: the application's mapped index if one was
//! configured, otherwise the default index. Built once at startup from
//! `DEVLOGS_FORWARD_INDEX_MAP_KV` and never mutated.

use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct IndexRouter {
    map: HashMap<String, String>,
    default_index: String,
}

impl IndexRouter {
    #[must_use]
    pub fn new(map: HashMap<String, String>, default_index: String) -> Self {
        Self { map, default_index }
    }

    /// Target index for an application. Unmapped applications always
    /// land in the default index; there is no further fallback chain.
    #[must_use]
    pub fn resolve(&self, application: &str) -> &str {
        self.map
            .get(application)
            .map_or(self.default_index.as_str(), String::as_str)
    }

    #[must_use]
    pub fn default_index(&self) -> &str {
        &self.default_index
    }

    #[must_use]
    pub fn mapped_applications(&self) -> usize {
        self.map.len()
    }
}
