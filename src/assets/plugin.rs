//! Plugins, components and pre-render hooks

use std::fmt;
use std::sync::Arc;

use http::Request;
use serde_json::Value;

use crate::renderer::ResponseWriter;

/// Error returned by a hook; aborts the render it happens in
#[derive(Debug)]
pub struct HookError(Box<dyn std::error::Error + Send + Sync>);

impl HookError {
    /// Wrap any error
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }

    /// Build an error from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into().into())
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for HookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Signature of a pre-render hook: receives the writer, the request and the
/// current data, returns the data for the next hook
pub type HookFn =
    dyn Fn(&mut dyn ResponseWriter, &Request<()>, Value) -> Result<Value, HookError> + Send + Sync;

/// A pre-render hook.
///
/// Pages deduplicate hooks by the function they wrap, so the same hook
/// reachable through several fragments runs once. The id only names the
/// hook in errors and logs.
#[derive(Clone)]
pub struct Hook {
    id: Arc<str>,
    func: Arc<HookFn>,
}

impl Hook {
    /// Wrap a function as an anonymous hook with a fresh unique id
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&mut dyn ResponseWriter, &Request<()>, Value) -> Result<Value, HookError>
            + Send
            + Sync
            + 'static,
    {
        Self::with_id(uuid::Uuid::new_v4().simple().to_string(), func)
    }

    /// Wrap a function under an explicit id
    pub fn with_id<F>(id: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut dyn ResponseWriter, &Request<()>, Value) -> Result<Value, HookError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            id: Arc::from(id.into()),
            func: Arc::new(func),
        }
    }

    /// Same function under another id
    pub(crate) fn renamed(&self, id: impl Into<String>) -> Self {
        Self {
            id: Arc::from(id.into()),
            func: Arc::clone(&self.func),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address of the wrapped function, shared by clones and renamed copies
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.func) as *const () as usize
    }

    pub fn call(
        &self,
        writer: &mut dyn ResponseWriter,
        request: &Request<()>,
        data: Value,
    ) -> Result<Value, HookError> {
        (self.func)(writer, request, data)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("id", &self.id).finish()
    }
}

/// Signature of an env function: derives one `window.Env` value from the
/// request being rendered
pub type EnvValueFn = dyn Fn(&Request<()>) -> Result<Value, HookError> + Send + Sync;

/// A request-derived entry of the page's `window.Env` script
#[derive(Clone)]
pub struct EnvFn {
    key: Arc<str>,
    func: Arc<EnvValueFn>,
}

impl EnvFn {
    pub fn new<F>(key: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Request<()>) -> Result<Value, HookError> + Send + Sync + 'static,
    {
        Self {
            key: Arc::from(key.into()),
            func: Arc::new(func),
        }
    }

    /// Name the value is published under in `window.Env`
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn call(&self, request: &Request<()>) -> Result<Value, HookError> {
        (self.func)(request)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.func) as *const () as usize
    }
}

impl fmt::Debug for EnvFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvFn").field("key", &self.key).finish()
    }
}

/// Assets and hooks attached to one plugin fragment.
///
/// They are only pulled into a page when that fragment is reachable from
/// the page's main fragment.
#[derive(Debug, Clone, Default)]
pub struct Component {
    pub fragment: String,
    pub css: Vec<String>,
    pub js: Vec<String>,
    pub hooks: Vec<String>,
    pub env: Vec<EnvFn>,
}

impl Component {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            ..Self::default()
        }
    }

    /// Attach a plugin CSS asset by name
    pub fn with_css(mut self, name: impl Into<String>) -> Self {
        self.css.push(name.into());
        self
    }

    /// Attach a plugin JS asset by name
    pub fn with_js(mut self, name: impl Into<String>) -> Self {
        self.js.push(name.into());
        self
    }

    /// Attach a plugin hook by name
    pub fn with_hook(mut self, name: impl Into<String>) -> Self {
        self.hooks.push(name.into());
        self
    }

    /// Publish a request-derived value in `window.Env` on pages that reach
    /// this fragment
    pub fn with_env_fn<F>(mut self, key: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Request<()>) -> Result<Value, HookError> + Send + Sync + 'static,
    {
        self.env.push(EnvFn::new(key, func));
        self
    }
}

/// A bundle of fragments, assets and hooks registered together at setup.
///
/// Names inside a plugin are local to it: registration namespaces them under
/// a process-unique plugin id so two plugins may both ship `style.css`.
#[derive(Debug, Clone, Default)]
pub struct Plugin {
    pub name: String,
    /// (file name, source); every `define` inside becomes a fragment too
    pub fragments: Vec<(String, String)>,
    pub assets: Vec<(String, Vec<u8>)>,
    pub hooks: Vec<(String, Hook)>,
    pub components: Vec<Component>,
    pub global_css: Vec<String>,
    pub global_js: Vec<String>,
    pub global_hooks: Vec<String>,
    /// Env functions evaluated for every page
    pub env: Vec<EnvFn>,
    /// Fragments merged into every page rather than pulled in on reference
    pub global_fragments: Vec<String>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_fragment(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.fragments.push((name.into(), source.into()));
        self
    }

    pub fn with_asset(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.assets.push((name.into(), data.into()));
        self
    }

    pub fn with_hook(mut self, name: impl Into<String>, hook: Hook) -> Self {
        self.hooks.push((name.into(), hook));
        self
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_global_css(mut self, name: impl Into<String>) -> Self {
        self.global_css.push(name.into());
        self
    }

    pub fn with_global_js(mut self, name: impl Into<String>) -> Self {
        self.global_js.push(name.into());
        self
    }

    pub fn with_global_hook(mut self, name: impl Into<String>) -> Self {
        self.global_hooks.push(name.into());
        self
    }

    pub fn with_global_fragment(mut self, name: impl Into<String>) -> Self {
        self.global_fragments.push(name.into());
        self
    }

    /// Publish a request-derived value in `window.Env` on every page
    pub fn with_env_fn<F>(mut self, key: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Request<()>) -> Result<Value, HookError> + Send + Sync + 'static,
    {
        self.env.push(EnvFn::new(key, func));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_hooks_get_distinct_ids() {
        let a = Hook::new(|_, _, data| Ok(data));
        let b = Hook::new(|_, _, data| Ok(data));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_renamed_hook_shares_function() {
        let hook = Hook::with_id("local", |_, _, _| Ok(Value::Bool(true)));
        let renamed = hook.renamed("plugin::local");
        assert_eq!(renamed.id(), "plugin::local");
        let mut out = Vec::new();
        let request = Request::new(());
        assert_eq!(
            renamed.call(&mut out, &request, Value::Null).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_identity_follows_the_function() {
        let hook = Hook::with_id("h", |_, _, d| Ok(d));
        let other = Hook::with_id("h", |_, _, d| Ok(d));
        assert_eq!(hook.identity(), hook.clone().identity());
        assert_eq!(hook.identity(), hook.renamed("p::h").identity());
        assert_ne!(hook.identity(), other.identity());
    }

    #[test]
    fn test_env_fn_reads_request() {
        let env = EnvFn::new("path", |request| Ok(Value::from(request.uri().path())));
        let request = Request::builder().uri("/account").body(()).unwrap();
        assert_eq!(env.key(), "path");
        assert_eq!(env.call(&request).unwrap(), Value::from("/account"));
    }

    #[test]
    fn test_hook_error_message() {
        let err = HookError::msg("not signed in");
        assert_eq!(err.to_string(), "not signed in");
    }
}
