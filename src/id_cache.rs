//! Memoization of decoded paths.
//!
//! A device's path vocabulary is bounded by its schema (hundreds of
//! distinct strings), so the cache never evicts.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::path::{self, Identifier};

/// Per-device cache of `raw path → decoded identifiers`. Guarded by its own
/// lock, independent of the tree's.
#[derive(Debug, Default)]
pub struct IdentifierCache {
    cache: RwLock<HashMap<String, Arc<[Identifier]>>>,
}

impl IdentifierCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `path`, serving repeated lookups from the cache.
    pub fn resolve(&self, path: &str) -> Arc<[Identifier]> {
        if let Some(ids) = self.lookup(path) {
            return ids;
        }

        let ids: Arc<[Identifier]> = path::decode(path).into();
        self.set(path, ids.clone());
        ids
    }

    pub fn lookup(&self, path: &str) -> Option<Arc<[Identifier]>> {
        self.cache.read().get(path).cloned()
    }

    pub fn set(&self, path: &str, ids: Arc<[Identifier]>) {
        self.cache.write().insert(path.to_string(), ids);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }
}
