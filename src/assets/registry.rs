//! Asset registry - CSS, JS and hooks keyed by the scope they apply to

use std::collections::HashMap;
use std::sync::Arc;

use super::asset::Asset;
use super::plugin::{EnvFn, Hook};

/// Where a contribution applies
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every page
    Global,
    /// Pages whose resolved fragment closure contains this fragment
    Fragment(String),
}

impl Scope {
    pub fn fragment(name: impl Into<String>) -> Self {
        Scope::Fragment(name.into())
    }
}

#[derive(Debug, Clone, Default)]
struct Contributions {
    css: Vec<Arc<Asset>>,
    js: Vec<Arc<Asset>>,
    hooks: Vec<Hook>,
    env: Vec<EnvFn>,
}

/// Scoped contributions, in registration order.
///
/// The registry itself does not deduplicate; page assembly does, by content
/// hash for assets and by function for hooks and env functions.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    scopes: HashMap<Scope, Contributions>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, scope: Scope) -> &mut Contributions {
        self.scopes.entry(scope).or_default()
    }

    pub fn add_css(&mut self, scope: Scope, asset: Arc<Asset>) {
        self.entry(scope).css.push(asset);
    }

    pub fn add_js(&mut self, scope: Scope, asset: Arc<Asset>) {
        self.entry(scope).js.push(asset);
    }

    pub fn add_hook(&mut self, scope: Scope, hook: Hook) {
        self.entry(scope).hooks.push(hook);
    }

    pub fn add_env(&mut self, scope: Scope, env: EnvFn) {
        self.entry(scope).env.push(env);
    }

    /// CSS and JS contributed to a scope; empty when nothing was registered
    pub fn assets_for(&self, scope: &Scope) -> (&[Arc<Asset>], &[Arc<Asset>]) {
        match self.scopes.get(scope) {
            Some(c) => (&c.css, &c.js),
            None => (&[], &[]),
        }
    }

    pub fn hooks_for(&self, scope: &Scope) -> &[Hook] {
        self.scopes
            .get(scope)
            .map(|c| c.hooks.as_slice())
            .unwrap_or(&[])
    }

    pub fn env_for(&self, scope: &Scope) -> &[EnvFn] {
        self.scopes
            .get(scope)
            .map(|c| c.env.as_slice())
            .unwrap_or(&[])
    }

    pub fn global_assets(&self) -> (&[Arc<Asset>], &[Arc<Asset>]) {
        self.assets_for(&Scope::Global)
    }

    pub fn global_hooks(&self) -> &[Hook] {
        self.hooks_for(&Scope::Global)
    }

    /// Fold another registry's contributions in after this one's
    pub fn extend(&mut self, other: AssetRegistry) {
        for (scope, contributions) in other.scopes {
            let entry = self.entry(scope);
            entry.css.extend(contributions.css);
            entry.js.extend(contributions.js);
            entry.hooks.extend(contributions.hooks);
            entry.env.extend(contributions.env);
        }
    }
}
