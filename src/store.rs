//! Byte stores keyed by hierarchical names
//!
//! A [`MuxStore`] wraps a default store plus named alternates. A name carrying
//! a marker selects an alternate and the marker is stripped before lookup:
//! `~plugin/app.css` with [`Marker::Tilde`], `plugin::app.css` with
//! [`Marker::DoubleColon`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

/// Errors reading from a store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {name}")]
    NotFound { name: String },

    #[error("invalid file name: {name}")]
    InvalidName { name: String },

    #[error("error reading {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// An addressable byte store
pub trait Store: Send + Sync + std::fmt::Debug {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError>;
}

/// Files under a directory on disk
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name.trim_start_matches('/'));
        // names must stay inside the root
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(StoreError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl Store for DirStore {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(name)?;
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound {
                name: name.to_string(),
            },
            _ => StoreError::Io {
                name: name.to_string(),
                source,
            },
        })
    }
}

/// An in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    files: HashMap<String, Arc<[u8]>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, replacing any previous content
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        self.files.insert(name.into(), Arc::from(data));
    }

    /// Builder-style [`MemStore::insert`]
    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(name, data);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

impl Store for MemStore {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.files
            .get(name)
            .map(|data| data.to_vec())
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
            })
    }
}

/// Syntax used to address an alternate store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Marker {
    /// `~store/path`
    #[default]
    Tilde,
    /// `store::path`
    DoubleColon,
}

impl Marker {
    /// Split a name into (alternate store, path); `None` when unmarked
    pub fn split<'a>(&self, name: &'a str) -> (Option<&'a str>, &'a str) {
        match self {
            Marker::Tilde => {
                let Some(rest) = name.strip_prefix('~') else {
                    return (None, name);
                };
                match rest.find('/') {
                    Some(i) if i > 0 => (Some(&rest[..i]), &rest[i + 1..]),
                    _ => (None, name),
                }
            }
            Marker::DoubleColon => match name.find("::") {
                Some(i) if i > 0 => (Some(&name[..i]), &name[i + 2..]),
                _ => (None, name),
            },
        }
    }

    /// Build a name addressing `path` inside store `store`
    pub fn qualify(&self, store: &str, path: &str) -> String {
        match self {
            Marker::Tilde => format!("~{}/{}", store, path),
            Marker::DoubleColon => format!("{}::{}", store, path),
        }
    }
}

/// A default store plus named alternates selected by marker
#[derive(Debug, Clone)]
pub struct MuxStore {
    default: Arc<dyn Store>,
    alternates: HashMap<String, Arc<dyn Store>>,
    marker: Marker,
}

impl MuxStore {
    pub fn new(default: Arc<dyn Store>, marker: Marker) -> Self {
        Self {
            default,
            alternates: HashMap::new(),
            marker,
        }
    }

    /// Mount an alternate store, replacing any store with the same name
    pub fn mount(&mut self, name: impl Into<String>, store: Arc<dyn Store>) {
        self.alternates.insert(name.into(), store);
    }

    pub fn marker(&self) -> Marker {
        self.marker
    }

    pub fn set_marker(&mut self, marker: Marker) {
        self.marker = marker;
    }

    /// Pick the store a name addresses and the path inside it.
    ///
    /// An unknown alternate falls back to the default store with the marker
    /// stripped.
    pub fn route<'a>(&self, name: &'a str) -> (&Arc<dyn Store>, &'a str) {
        match self.marker.split(name) {
            (Some(store), path) => match self.alternates.get(store) {
                Some(alt) => (alt, path),
                None => (&self.default, path),
            },
            (None, path) => (&self.default, path),
        }
    }
}

impl Store for MuxStore {
    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let (store, path) = self.route(name);
        store.read(path).map_err(|err| match err {
            // report the name the caller asked for
            StoreError::NotFound { .. } => StoreError::NotFound {
                name: name.to_string(),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mux(marker: Marker) -> MuxStore {
        let mut mux = MuxStore::new(
            Arc::new(MemStore::new().with_file("app.css", "default")),
            marker,
        );
        mux.mount("plug", Arc::new(MemStore::new().with_file("app.css", "plugin")));
        mux
    }

    #[test]
    fn test_tilde_marker_selects_alternate() {
        let mux = mux(Marker::Tilde);
        assert_eq!(mux.read("~plug/app.css").unwrap(), b"plugin");
        assert_eq!(mux.read("app.css").unwrap(), b"default");
    }

    #[test]
    fn test_double_colon_marker_selects_alternate() {
        let mux = mux(Marker::DoubleColon);
        assert_eq!(mux.read("plug::app.css").unwrap(), b"plugin");
        // tilde is an ordinary character under this marker
        assert!(mux.read("~plug/app.css").is_err());
    }

    #[test]
    fn test_unknown_alternate_falls_back_to_default() {
        let mux = mux(Marker::Tilde);
        assert_eq!(mux.read("~nothere/app.css").unwrap(), b"default");
    }

    #[test]
    fn test_not_found_reports_requested_name() {
        let mux = mux(Marker::Tilde);
        let err = mux.read("~plug/missing.css").unwrap_err();
        assert!(err.to_string().contains("~plug/missing.css"));
    }

    #[test]
    fn test_qualify_round_trips_through_split() {
        for marker in [Marker::Tilde, Marker::DoubleColon] {
            let name = marker.qualify("abc", "dir/x.js");
            assert_eq!(marker.split(&name), (Some("abc"), "dir/x.js"));
        }
    }

    #[test]
    fn test_dir_store_reads_and_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/site.css"), "body{}").unwrap();

        let store = DirStore::new(dir.path());
        assert_eq!(store.read("css/site.css").unwrap(), b"body{}");
        assert!(matches!(
            store.read("../etc/passwd"),
            Err(StoreError::InvalidName { .. })
        ));
        assert!(matches!(
            store.read("css/none.css"),
            Err(StoreError::NotFound { .. })
        ));
    }
}
