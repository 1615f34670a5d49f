//! Engine configuration, loadable from TOML
//!
//! ```toml
//! [cache]
//! enabled = true
//!
//! [assets]
//! inline = true
//! url_prefix = "static"
//!
//! [store]
//! marker = "tilde"   # or "double-colon"
//!
//! [render]
//! buffer_pool_size = 64
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::store::Marker;

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Configuration for an [`Engine`](crate::Engine)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub assets: AssetsConfig,
    pub store: StoreConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Memoize parsed fragments, raw assets and assembled pages
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Inline asset bytes; when false, reference them under `url_prefix`
    pub inline: bool,
    pub url_prefix: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            inline: true,
            url_prefix: "static".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Syntax selecting an alternate store
    pub marker: Marker,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Idle render buffers kept for reuse
    pub buffer_pool_size: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 64,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string; missing keys take defaults
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Turn all caching on or off
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache.enabled = enabled;
        self
    }

    /// Inline assets or link them
    pub fn with_inline_assets(mut self, inline: bool) -> Self {
        self.assets.inline = inline;
        self
    }

    /// Set the URL prefix for linked assets
    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.assets.url_prefix = prefix.into();
        self
    }

    /// Set the alternate-store marker syntax
    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.store.marker = marker;
        self
    }

    pub fn with_buffer_pool_size(mut self, size: usize) -> Self {
        self.render.buffer_pool_size = size;
        self
    }
}
