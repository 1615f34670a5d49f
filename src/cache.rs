//! Memoization of parsed files, raw assets and assembled pages
//!
//! All tiers sit behind one reader/writer lock that is held only for the map
//! access itself. Two threads missing on the same key both do the work and
//! the later insert wins. Entries live as long as the cache.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::assets::Asset;
use crate::page::Page;
use crate::template::ParsedFile;

#[derive(Debug, Default)]
struct Tiers {
    files: HashMap<String, Arc<ParsedFile>>,
    assets: HashMap<String, Arc<Asset>>,
    pages: HashMap<String, Arc<Page>>,
}

/// Shared cache; a disabled cache never hits and never stores
#[derive(Debug, Default)]
pub struct Cache {
    enabled: bool,
    tiers: RwLock<Tiers>,
}

impl Cache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            tiers: RwLock::default(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Page cache key: main name and includes joined in request order
    pub fn page_key(main: &str, includes: &[&str]) -> String {
        let mut key = String::from(main);
        for include in includes {
            key.push('\n');
            key.push_str(include);
        }
        key
    }

    fn read<T>(&self, f: impl FnOnce(&Tiers) -> Option<T>) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let tiers = self.tiers.read().unwrap_or_else(PoisonError::into_inner);
        f(&tiers)
    }

    fn write(&self, f: impl FnOnce(&mut Tiers)) {
        if !self.enabled {
            return;
        }
        let mut tiers = self.tiers.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut tiers);
    }

    pub fn file(&self, name: &str) -> Option<Arc<ParsedFile>> {
        let hit = self.read(|t| t.files.get(name).cloned());
        tracing::trace!(name, hit = hit.is_some(), "file cache");
        hit
    }

    pub fn insert_file(&self, name: &str, file: Arc<ParsedFile>) {
        self.write(|t| {
            t.files.insert(name.to_string(), file);
        });
    }

    pub fn asset(&self, name: &str) -> Option<Arc<Asset>> {
        let hit = self.read(|t| t.assets.get(name).cloned());
        tracing::trace!(name, hit = hit.is_some(), "asset cache");
        hit
    }

    pub fn insert_asset(&self, name: &str, asset: Arc<Asset>) {
        self.write(|t| {
            t.assets.insert(name.to_string(), asset);
        });
    }

    pub fn page(&self, key: &str) -> Option<Arc<Page>> {
        let hit = self.read(|t| t.pages.get(key).cloned());
        tracing::debug!(key, hit = hit.is_some(), "page cache");
        hit
    }

    pub fn insert_page(&self, key: String, page: Arc<Page>) {
        self.write(|t| {
            t.pages.insert(key, page);
        });
    }
}
