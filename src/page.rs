//! Assembled pages

use std::sync::Arc;

use crate::assets::{Asset, EnvFn, Hook};
use crate::renderer::{AssetMode, BufferPool};
use crate::template::TemplateSet;

/// The immutable result of one lookup: a private fragment set rooted at the
/// main fragment, plus the deduplicated CSS, JS, hooks and env functions it needs.
///
/// A page carries no request state, so one `Arc<Page>` can be rendered by
/// any number of threads at once.
#[derive(Debug, Clone)]
pub struct Page {
    pub(crate) main: String,
    pub(crate) templates: TemplateSet,
    pub(crate) css: Vec<Arc<Asset>>,
    pub(crate) js: Vec<Arc<Asset>>,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) env: Vec<EnvFn>,
    pub(crate) inline: bool,
    pub(crate) url_prefix: String,
    pub(crate) pool: Arc<BufferPool>,
}

impl Page {
    /// Name of the fragment rendering starts from
    pub fn main(&self) -> &str {
        &self.main
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    pub fn css(&self) -> &[Arc<Asset>] {
        &self.css
    }

    pub fn js(&self) -> &[Arc<Asset>] {
        &self.js
    }

    /// Hooks in the order they run
    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// Functions feeding the `window.Env` script, evaluated per render
    pub fn env_fns(&self) -> &[EnvFn] {
        &self.env
    }

    /// How assets are emitted, honouring a per-render override
    pub fn asset_mode(&self, inline: Option<bool>) -> AssetMode {
        if inline.unwrap_or(self.inline) {
            AssetMode::Inline
        } else {
            AssetMode::External {
                url_prefix: self.url_prefix.clone(),
            }
        }
    }
}
