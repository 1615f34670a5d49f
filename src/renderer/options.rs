//! Per-request render options

use serde_json::{Map, Value};

use super::csp::ContentSecurityPolicy;

/// Knobs for a single render call
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Key/value map exposed to client scripts through `window.Env`
    pub jsenv: Map<String, Value>,
    /// Overrides the engine's inline setting when set
    pub inline_assets: Option<bool>,
    /// Directives merged into the CSP before asset hashes are added
    pub csp: ContentSecurityPolicy,
    /// Write the post-hook data as JSON instead of executing the template
    pub json_data: bool,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `window.Env` entry
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.jsenv.insert(key.into(), value.into());
        self
    }

    /// Inline assets (`true`) or reference them by URL (`false`)
    pub fn inline_assets(mut self, inline: bool) -> Self {
        self.inline_assets = Some(inline);
        self
    }

    /// Add tokens to a CSP directive
    pub fn with_csp<I, S>(mut self, directive: &str, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.csp.append(directive, tokens);
        self
    }

    pub fn json_data(mut self, json: bool) -> Self {
        self.json_data = json;
        self
    }
}
