//! Engine setup and page assembly
//!
//! Setup happens once on an [`EngineBuilder`]: global assets and templates
//! are read, plugins are registered, and the result is frozen into an
//! [`Engine`]. After that the engine is only read from, by any number of
//! request threads at once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use http::Request;
use serde_json::Value;
use thiserror::Error;

use crate::assets::{Asset, AssetRegistry, Digest, EnvFn, Hook, IncludeKind, Plugin, Scope};
use crate::cache::Cache;
use crate::config::EngineConfig;
use crate::page::Page;
use crate::renderer::{BufferPool, RenderError, RenderOptions, ResponseWriter};
use crate::store::{MemStore, MuxStore, Store, StoreError};
use crate::template::{
    resolve, Fragment, FragmentLookup, ParsedFile, ResolveError, TemplateError, TemplateSet,
};

/// Errors during engine setup; any of them aborts the whole call
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("plugin \"{plugin}\": {source}")]
    PluginTemplate {
        plugin: String,
        #[source]
        source: TemplateError,
    },

    #[error("plugin \"{plugin}\" has no fragment named \"{name}\"")]
    UnknownFragment { plugin: String, name: String },

    #[error("plugin \"{plugin}\" has no asset named \"{name}\"")]
    UnknownAsset { plugin: String, name: String },

    #[error("plugin \"{plugin}\" has no hook named \"{name}\"")]
    UnknownHook { plugin: String, name: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors assembling a page; each names the offending file or fragment
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Errors from [`Engine::page`]
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Setup phase of an [`Engine`]
#[derive(Debug)]
pub struct EngineBuilder {
    config: EngineConfig,
    store: MuxStore,
    base: TemplateSet,
    components: TemplateSet,
    assets: AssetRegistry,
}

impl EngineBuilder {
    /// Start setup over a default store
    pub fn new(store: impl Store + 'static, config: EngineConfig) -> Self {
        let store = MuxStore::new(Arc::new(store), config.store.marker);
        Self {
            config,
            store,
            base: TemplateSet::new(),
            components: TemplateSet::new(),
            assets: AssetRegistry::new(),
        }
    }

    /// Mount an alternate store, addressed with the configured marker
    pub fn alt_store(mut self, name: impl Into<String>, store: impl Store + 'static) -> Self {
        self.store.mount(name, Arc::new(store));
        self
    }

    /// Read CSS files from the store and include them in every page
    pub fn global_css<I, S>(mut self, names: I) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for asset in self.read_assets(names)? {
            self.assets.add_css(Scope::Global, asset);
        }
        Ok(self)
    }

    /// Read JS files from the store and include them in every page
    pub fn global_js<I, S>(mut self, names: I) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for asset in self.read_assets(names)? {
            self.assets.add_js(Scope::Global, asset);
        }
        Ok(self)
    }

    fn read_assets<I, S>(&self, names: I) -> Result<Vec<Arc<Asset>>, SetupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| -> Result<Arc<Asset>, SetupError> {
                let name = name.as_ref();
                let data = self.store.read(name)?;
                Ok(Arc::new(Asset::new(name, data)))
            })
            .collect()
    }

    /// Parse template files from the store into the base set every page
    /// starts from
    pub fn global_templates<I, S>(mut self, names: I) -> Result<Self, SetupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut files = Vec::new();
        for name in names {
            let name = name.as_ref();
            let data = self.store.read(name)?;
            files.push(ParsedFile::parse_bytes(name, &data)?);
        }
        for file in &files {
            self.base.merge_file(file);
        }
        Ok(self)
    }

    /// Hooks run on every page, in order
    pub fn global_hooks(mut self, hooks: impl IntoIterator<Item = Hook>) -> Self {
        for hook in hooks {
            self.assets.add_hook(Scope::Global, hook);
        }
        self
    }

    /// `window.Env` functions evaluated on every page, in order
    pub fn global_env(mut self, env: impl IntoIterator<Item = EnvFn>) -> Self {
        for env in env {
            self.assets.add_env(Scope::Global, env);
        }
        self
    }

    /// Register plugins.
    ///
    /// Every plugin is validated before anything is committed, so a failure
    /// leaves no trace of any plugin in the call.
    pub fn plugins(mut self, plugins: impl IntoIterator<Item = Plugin>) -> Result<Self, SetupError> {
        let marker = self.store.marker();
        let mut staged = Vec::new();
        for plugin in plugins {
            staged.push(StagedPlugin::stage(plugin, |id, path| marker.qualify(id, path))?);
        }
        for plugin in staged {
            tracing::debug!(
                plugin = %plugin.name,
                id = %plugin.id,
                fragments = plugin.fragments.len(),
                "registered plugin"
            );
            self.store.mount(plugin.id, Arc::new(plugin.store));
            for fragment in plugin.fragments {
                self.components.insert(fragment);
            }
            for fragment in plugin.global_fragments {
                self.base.insert(fragment);
            }
            self.assets.extend(plugin.assets);
        }
        Ok(self)
    }

    /// Finish setup
    pub fn build(self) -> Engine {
        let pool = Arc::new(BufferPool::new(self.config.render.buffer_pool_size));
        let cache = Cache::new(self.config.cache.enabled);
        Engine {
            config: self.config,
            store: self.store,
            base: self.base,
            components: self.components,
            assets: self.assets,
            cache,
            pool,
        }
    }
}

/// A plugin checked and converted, ready to commit
struct StagedPlugin {
    name: String,
    id: String,
    store: MemStore,
    fragments: Vec<Arc<Fragment>>,
    global_fragments: Vec<Arc<Fragment>>,
    assets: AssetRegistry,
}

impl StagedPlugin {
    fn stage(plugin: Plugin, qualify: impl Fn(&str, &str) -> String) -> Result<Self, SetupError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let name = plugin.name;

        let mut fragments: Vec<Arc<Fragment>> = Vec::new();
        for (file, source) in &plugin.fragments {
            let parsed = ParsedFile::parse(file, source).map_err(|source| {
                SetupError::PluginTemplate {
                    plugin: name.clone(),
                    source,
                }
            })?;
            fragments.extend(parsed.fragments.iter().cloned());
        }
        let known = |fragment: &str| -> Result<Arc<Fragment>, SetupError> {
            fragments
                .iter()
                .rev()
                .find(|f| f.name == fragment)
                .cloned()
                .ok_or_else(|| SetupError::UnknownFragment {
                    plugin: name.clone(),
                    name: fragment.to_string(),
                })
        };

        let mut store = MemStore::new();
        let mut assets_by_name: HashMap<&str, Arc<Asset>> = HashMap::new();
        for (path, data) in &plugin.assets {
            store.insert(path.clone(), data.clone());
            assets_by_name.insert(path, Arc::new(Asset::new(qualify(&id, path), data.clone())));
        }
        let asset = |path: &str| -> Result<Arc<Asset>, SetupError> {
            assets_by_name
                .get(path)
                .cloned()
                .ok_or_else(|| SetupError::UnknownAsset {
                    plugin: name.clone(),
                    name: path.to_string(),
                })
        };

        let hooks_by_name: HashMap<&str, Hook> = plugin
            .hooks
            .iter()
            .map(|(local, hook)| (local.as_str(), hook.renamed(format!("{}::{}", id, local))))
            .collect();
        let hook = |local: &str| -> Result<Hook, SetupError> {
            hooks_by_name
                .get(local)
                .cloned()
                .ok_or_else(|| SetupError::UnknownHook {
                    plugin: name.clone(),
                    name: local.to_string(),
                })
        };

        let mut registry = AssetRegistry::new();
        for path in &plugin.global_css {
            registry.add_css(Scope::Global, asset(path)?);
        }
        for path in &plugin.global_js {
            registry.add_js(Scope::Global, asset(path)?);
        }
        for local in &plugin.global_hooks {
            registry.add_hook(Scope::Global, hook(local)?);
        }
        for env in &plugin.env {
            registry.add_env(Scope::Global, env.clone());
        }
        for component in &plugin.components {
            known(&component.fragment)?;
            let scope = Scope::fragment(component.fragment.clone());
            for path in &component.css {
                registry.add_css(scope.clone(), asset(path)?);
            }
            for path in &component.js {
                registry.add_js(scope.clone(), asset(path)?);
            }
            for local in &component.hooks {
                registry.add_hook(scope.clone(), hook(local)?);
            }
            for env in &component.env {
                registry.add_env(scope.clone(), env.clone());
            }
        }
        let global_fragments = plugin
            .global_fragments
            .iter()
            .map(|fragment| known(fragment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            id,
            store,
            fragments,
            global_fragments,
            assets: registry,
        })
    }
}

/// Serving phase: immutable setup plus the shared cache
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: MuxStore,
    base: TemplateSet,
    components: TemplateSet,
    assets: AssetRegistry,
    cache: Cache,
    pool: Arc<BufferPool>,
}

/// Page fragments first, then plugin fragments not shadowed by them
struct Layered<'a> {
    page: &'a TemplateSet,
    components: &'a TemplateSet,
}

impl FragmentLookup for Layered<'_> {
    fn fragment(&self, name: &str) -> Option<Arc<Fragment>> {
        self.page
            .fragment(name)
            .or_else(|| self.components.fragment(name))
    }
}

/// Ordered lists that keep only the first occurrence of each identity
#[derive(Default)]
struct Collected {
    css: Vec<Arc<Asset>>,
    js: Vec<Arc<Asset>>,
    hooks: Vec<Hook>,
    env: Vec<EnvFn>,
    seen_css: HashSet<Digest>,
    seen_js: HashSet<Digest>,
    seen_hooks: HashSet<usize>,
    seen_env: HashSet<usize>,
}

impl Collected {
    fn css(&mut self, assets: &[Arc<Asset>]) {
        for asset in assets {
            if self.seen_css.insert(*asset.hash()) {
                self.css.push(Arc::clone(asset));
            }
        }
    }

    fn js(&mut self, assets: &[Arc<Asset>]) {
        for asset in assets {
            if self.seen_js.insert(*asset.hash()) {
                self.js.push(Arc::clone(asset));
            }
        }
    }

    fn hooks(&mut self, hooks: &[Hook]) {
        for hook in hooks {
            if self.seen_hooks.insert(hook.identity()) {
                self.hooks.push(hook.clone());
            }
        }
    }

    fn env(&mut self, env: &[EnvFn]) {
        for env in env {
            if self.seen_env.insert(env.identity()) {
                self.env.push(env.clone());
            }
        }
    }

    fn scope(&mut self, registry: &AssetRegistry, scope: &Scope) {
        let (css, js) = registry.assets_for(scope);
        self.css(css);
        self.js(js);
        self.hooks(registry.hooks_for(scope));
        self.env(registry.env_for(scope));
    }
}

impl Engine {
    /// Start setup over a default store with the default configuration
    pub fn builder(store: impl Store + 'static) -> EngineBuilder {
        EngineBuilder::new(store, EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Scoped assets and hooks registered at setup
    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    /// Read a file through the store, alternate markers included; used to
    /// serve linked assets
    pub fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.store.read(name)
    }

    /// Assemble the page for `main` plus `includes`.
    ///
    /// Includes ending in `.css` or `.js` are read as raw assets and come
    /// after every fragment-scoped asset; anything else is parsed as a
    /// template file and merged into the page.
    pub fn lookup(&self, main: &str, includes: &[&str]) -> Result<Arc<Page>, LookupError> {
        let key = Cache::page_key(main, includes);
        if let Some(page) = self.cache.page(&key) {
            return Ok(page);
        }

        let mut templates = vec![main];
        let mut css = Vec::new();
        let mut js = Vec::new();
        for &name in includes {
            match IncludeKind::of(name) {
                IncludeKind::Template => templates.push(name),
                IncludeKind::Css => css.push(name),
                IncludeKind::Js => js.push(name),
            }
        }

        // each page grafts onto its own copy of the base set
        let mut set = self.base.clone();
        for name in templates {
            let file = self.load_file(name)?;
            set.merge_file(&file);
        }

        let resolved = resolve(
            main,
            &Layered {
                page: &set,
                components: &self.components,
            },
        )?;

        let mut collected = Collected::default();
        collected.scope(&self.assets, &Scope::Global);
        for fragment in &resolved {
            if !set.contains(&fragment.name) {
                set.insert(Arc::clone(fragment));
            }
            collected.scope(&self.assets, &Scope::fragment(fragment.name.clone()));
        }
        for name in css {
            let asset = self.load_asset(name)?;
            collected.css(&[asset]);
        }
        for name in js {
            let asset = self.load_asset(name)?;
            collected.js(&[asset]);
        }

        let page = Arc::new(Page {
            main: main.to_string(),
            templates: set,
            css: collected.css,
            js: collected.js,
            hooks: collected.hooks,
            env: collected.env,
            inline: self.config.assets.inline,
            url_prefix: self.config.assets.url_prefix.clone(),
            pool: Arc::clone(&self.pool),
        });
        tracing::debug!(
            main,
            fragments = resolved.len(),
            css = page.css.len(),
            js = page.js.len(),
            hooks = page.hooks.len(),
            env = page.env.len(),
            "assembled page"
        );
        self.cache.insert_page(key, Arc::clone(&page));
        Ok(page)
    }

    /// Look up and render in one step
    pub fn page(
        &self,
        writer: &mut dyn ResponseWriter,
        request: &Request<()>,
        main: &str,
        includes: &[&str],
        data: Value,
        options: &RenderOptions,
    ) -> Result<(), PageError> {
        let page = self.lookup(main, includes)?;
        page.render(writer, request, data, options)?;
        Ok(())
    }

    fn load_file(&self, name: &str) -> Result<Arc<ParsedFile>, LookupError> {
        if let Some(file) = self.cache.file(name) {
            return Ok(file);
        }
        let data = self.store.read(name)?;
        let file = Arc::new(ParsedFile::parse_bytes(name, &data)?);
        self.cache.insert_file(name, Arc::clone(&file));
        Ok(file)
    }

    fn load_asset(&self, name: &str) -> Result<Arc<Asset>, LookupError> {
        if let Some(asset) = self.cache.asset(name) {
            return Ok(asset);
        }
        let data = self.store.read(name)?;
        let asset = Arc::new(Asset::new(name, data));
        self.cache.insert_asset(name, Arc::clone(&asset));
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Component;
    use crate::store::Marker;
    use pretty_assertions::assert_eq;

    fn names(assets: &[Arc<Asset>]) -> Vec<String> {
        assets.iter().map(|a| a.name().to_string()).collect()
    }

    fn store() -> MemStore {
        MemStore::new()
            .with_file("index.html", r#"<body>{{ template "header" }}</body>"#)
            .with_file("site.css", "body{}")
            .with_file("app.js", "app()")
    }

    fn header_plugin() -> Plugin {
        Plugin::new("chrome")
            .with_fragment("header.html", r#"{{ define "header" }}<h1>hi</h1>{{ end }}"#)
            .with_asset("H.css", "h1{}")
            .with_asset("G.js", "g()")
            .with_component(Component::new("header").with_css("H.css"))
            .with_global_js("G.js")
    }

    #[test]
    fn test_plugin_assets_are_namespaced() {
        let engine = Engine::builder(store())
            .plugins([header_plugin()])
            .unwrap()
            .build();
        let page = engine.lookup("index.html", &[]).unwrap();
        let css = names(page.css());
        assert_eq!(css.len(), 1);
        let (store, path) = Marker::Tilde.split(&css[0]);
        assert!(store.is_some());
        assert_eq!(path, "H.css");
        // the qualified name reads back through the engine store
        assert_eq!(engine.read(&css[0]).unwrap(), b"h1{}");
    }

    #[test]
    fn test_unknown_component_asset_fails_whole_call() {
        let broken = Plugin::new("broken")
            .with_fragment("x.html", "x")
            .with_component(Component::new("x.html").with_css("missing.css"));
        let result = Engine::builder(store()).plugins([header_plugin(), broken]);
        assert!(matches!(
            result,
            Err(SetupError::UnknownAsset { ref plugin, ref name }) if plugin == "broken" && name == "missing.css"
        ));
    }

    #[test]
    fn test_unknown_component_fragment_fails() {
        let broken = Plugin::new("broken").with_component(Component::new("nowhere"));
        let result = Engine::builder(store()).plugins([broken]);
        assert!(matches!(result, Err(SetupError::UnknownFragment { .. })));
    }

    #[test]
    fn test_unknown_hook_fails() {
        let broken = Plugin::new("broken").with_global_hook("auth");
        let result = Engine::builder(store()).plugins([broken]);
        assert!(matches!(result, Err(SetupError::UnknownHook { .. })));
    }

    #[test]
    fn test_malformed_plugin_fragment_fails() {
        let broken = Plugin::new("broken").with_fragment("bad.html", "{{ if .x }}");
        let result = Engine::builder(store()).plugins([broken]);
        assert!(matches!(result, Err(SetupError::PluginTemplate { .. })));
    }

    #[test]
    fn test_includes_are_categorized() {
        let engine = Engine::builder(
            store().with_file("header.html", r#"{{ define "header" }}h{{ end }}"#),
        )
        .build();
        let page = engine
            .lookup("index.html", &["site.css", "header.html", "app.js"])
            .unwrap();
        assert_eq!(names(page.css()), vec!["site.css"]);
        assert_eq!(names(page.js()), vec!["app.js"]);
        assert!(page.templates().contains("header"));
    }

    #[test]
    fn test_missing_fragment_named() {
        let engine = Engine::builder(store()).build();
        let err = engine.lookup("index.html", &[]).unwrap_err();
        match err {
            LookupError::Resolve(err) => assert_eq!(err.missing_name(), "header"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_include_named() {
        let engine = Engine::builder(store().with_file("plain.html", "plain")).build();
        let err = engine.lookup("plain.html", &["nope.css"]).unwrap_err();
        assert!(err.to_string().contains("nope.css"));
    }

    #[test]
    fn test_global_templates_and_hooks() {
        let engine = Engine::builder(
            store().with_file("layout.html", r#"{{ define "header" }}<h1/>{{ end }}"#),
        )
        .global_templates(["layout.html"])
        .unwrap()
        .global_css(["site.css"])
        .unwrap()
        .global_hooks([Hook::with_id("h", |_, _, d| Ok(d))])
        .build();
        let page = engine.lookup("index.html", &[]).unwrap();
        assert_eq!(names(page.css()), vec!["site.css"]);
        assert_eq!(page.hooks().len(), 1);
    }

    #[test]
    fn test_distinct_hooks_sharing_an_id_both_run() {
        let engine = Engine::builder(store().with_file("ab.html", "{{ .a }}-{{ .b }}"))
            .global_hooks([
                Hook::with_id("h", |_, _, mut d| {
                    d["a"] = 1.into();
                    Ok(d)
                }),
                Hook::with_id("h", |_, _, mut d| {
                    d["b"] = 2.into();
                    Ok(d)
                }),
            ])
            .build();
        let page = engine.lookup("ab.html", &[]).unwrap();
        assert_eq!(page.hooks().len(), 2);

        let mut out: Vec<u8> = Vec::new();
        page.render(&mut out, &Request::new(()), Value::Null, &RenderOptions::new())
            .unwrap();
        assert_eq!(out, b"1-2");
    }

    #[test]
    fn test_same_hook_registered_twice_runs_once() {
        let hook = Hook::with_id("h", |_, _, d| Ok(d));
        let engine = Engine::builder(store().with_file("plain.html", "plain"))
            .global_hooks([hook.clone(), hook])
            .build();
        let page = engine.lookup("plain.html", &[]).unwrap();
        assert_eq!(page.hooks().len(), 1);
    }

    #[test]
    fn test_component_env_follows_its_fragment() {
        let plugin = header_plugin()
            .with_env_fn("theme", |_| Ok("dark".into()))
            .with_component(Component::new("header").with_env_fn("user", |_| Ok("ann".into())));
        let engine = Engine::builder(store().with_file("plain.html", "plain"))
            .plugins([plugin])
            .unwrap()
            .build();

        let keys = |page: &Page| -> Vec<String> {
            page.env_fns().iter().map(|e| e.key().to_string()).collect()
        };
        let page = engine.lookup("index.html", &[]).unwrap();
        assert_eq!(keys(&page), vec!["theme", "user"]);
        let plain = engine.lookup("plain.html", &[]).unwrap();
        assert_eq!(keys(&plain), vec!["theme"]);
    }

    #[test]
    fn test_cached_page_is_shared() {
        let engine = Engine::builder(store()).plugins([header_plugin()]).unwrap().build();
        let a = engine.lookup("index.html", &["site.css"]).unwrap();
        let b = engine.lookup("index.html", &["site.css"]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_uncached_pages_are_rebuilt() {
        let engine = EngineBuilder::new(store(), EngineConfig::new().with_cache(false))
            .plugins([header_plugin()])
            .unwrap()
            .build();
        let a = engine.lookup("index.html", &[]).unwrap();
        let b = engine.lookup("index.html", &[]).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(names(a.css()), names(b.css()));
    }

    #[test]
    fn test_alt_store_templates() {
        let engine = Engine::builder(MemStore::new())
            .alt_store("theme", MemStore::new().with_file("page.html", "themed"))
            .build();
        let page = engine.lookup("~theme/page.html", &[]).unwrap();
        assert_eq!(page.main(), "~theme/page.html");
    }
}
