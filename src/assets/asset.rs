//! Content-addressed CSS/JS assets

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest as _, Sha256};

/// SHA-256 digest of an asset's bytes
pub type Digest = [u8; 32];

/// Compute the SHA-256 digest of some bytes
pub fn sha256(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// CSP hash source for a digest: `'sha256-<base64>'`
pub fn hash_source(digest: &Digest) -> String {
    format!("'sha256-{}'", STANDARD.encode(digest))
}

/// What an include file contributes to a page, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncludeKind {
    Template,
    Css,
    Js,
}

impl IncludeKind {
    /// `.css` and `.js` (any case) are assets; everything else is a template
    pub fn of(name: &str) -> Self {
        let file = name.rsplit('/').next().unwrap_or(name);
        let ext = match file.rfind('.') {
            Some(i) => file[i + 1..].to_ascii_lowercase(),
            None => return IncludeKind::Template,
        };
        match ext.as_str() {
            "css" => IncludeKind::Css,
            "js" => IncludeKind::Js,
            _ => IncludeKind::Template,
        }
    }
}

/// A named, immutable blob of CSS or JS.
///
/// Identity is the content hash: two assets with the same bytes are the
/// same asset whatever their names.
#[derive(Debug, Clone)]
pub struct Asset {
    name: String,
    data: Arc<[u8]>,
    hash: Digest,
}

impl Asset {
    /// Create an asset, hashing its bytes
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        let hash = sha256(&data);
        Self {
            name: name.into(),
            data: Arc::from(data),
            hash,
        }
    }

    /// Name the asset is addressed by in the store
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn hash(&self) -> &Digest {
        &self.hash
    }

    /// CSP hash source for this asset's bytes
    pub fn hash_source(&self) -> String {
        hash_source(&self.hash)
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Asset {}
