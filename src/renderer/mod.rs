//! Page rendering
//!
//! Rendering runs the page's hooks over the request data, builds the CSS and
//! JS blocks together with the CSP that allows them, then executes the main
//! fragment into a pooled buffer. Nothing reaches the writer's body unless
//! execution succeeds.

pub mod blocks;
pub mod csp;
pub mod exec;
mod options;
mod pool;
mod writer;

use http::header::{HeaderValue, InvalidHeaderValue, CONTENT_TYPE};
use http::Request;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::assets::HookError;
use crate::page::Page;

pub use blocks::AssetMode;
pub use csp::ContentSecurityPolicy;
pub use exec::{ExecError, Slots};
pub use options::RenderOptions;
pub use pool::BufferPool;
pub use writer::{Response, ResponseWriter};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Errors that abort a render
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("hook {id} failed: {source}")]
    Hook {
        id: String,
        #[source]
        source: HookError,
    },

    #[error("env function {key} failed: {source}")]
    Env {
        key: String,
        #[source]
        source: HookError,
    },

    #[error("error executing template \"{name}\": {source}")]
    Exec {
        name: String,
        #[source]
        source: ExecError,
    },

    #[error("invalid Content-Security-Policy: {0}")]
    Header(#[from] InvalidHeaderValue),

    #[error("error serializing data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error writing response: {0}")]
    Io(#[from] std::io::Error),
}

impl Page {
    /// Render the page for one request.
    ///
    /// Hooks run in page order, each receiving the data the previous one
    /// returned; the first failure stops the render before any template
    /// output. A null `data` becomes an empty object.
    pub fn render(
        &self,
        writer: &mut dyn ResponseWriter,
        request: &Request<()>,
        data: Value,
        options: &RenderOptions,
    ) -> Result<(), RenderError> {
        let mut data = match data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        for hook in &self.hooks {
            data = hook
                .call(writer, request, data)
                .map_err(|source| RenderError::Hook {
                    id: hook.id().to_string(),
                    source,
                })?;
        }

        let mut buffer = self.pool.get();
        let result = self.render_into(writer, request, &mut buffer, &data, options);
        self.pool.put(buffer);
        result
    }

    fn render_into(
        &self,
        writer: &mut dyn ResponseWriter,
        request: &Request<()>,
        buffer: &mut Vec<u8>,
        data: &Value,
        options: &RenderOptions,
    ) -> Result<(), RenderError> {
        if options.json_data {
            serde_json::to_writer(&mut *buffer, data)?;
            if let Some(headers) = writer.headers_mut() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
            }
            writer.write_all(buffer.as_slice())?;
            return Ok(());
        }

        let mut policy = writer
            .headers_mut()
            .map(|headers| ContentSecurityPolicy::from_headers(headers))
            .unwrap_or_default();
        policy.merge(&options.csp);

        let mode = self.asset_mode(options.inline_assets);
        let css = blocks::css_block(&self.css, &mode, &mut policy);
        let env = self.env(request, &options.jsenv)?;
        let js = blocks::js_block(&self.js, &env, &mode, &mut policy)?;
        let slots = Slots {
            css,
            js,
            csp: policy.meta_tag().into_bytes(),
        };

        exec::execute(&self.templates, &self.main, data, &slots, buffer).map_err(|source| {
            RenderError::Exec {
                name: self.main.clone(),
                source,
            }
        })?;

        if let Some(headers) = writer.headers_mut() {
            policy.write_headers(headers)?;
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
        }
        writer.write_all(buffer.as_slice())?;
        tracing::trace!(page = %self.main, bytes = buffer.len(), "rendered page");
        Ok(())
    }

    /// Values from the page's env functions, then the caller's `jsenv`,
    /// which wins on a shared key
    fn env(
        &self,
        request: &Request<()>,
        jsenv: &Map<String, Value>,
    ) -> Result<Map<String, Value>, RenderError> {
        let mut env = Map::new();
        for func in &self.env {
            let value = func.call(request).map_err(|source| RenderError::Env {
                key: func.key().to_string(),
                source,
            })?;
            env.insert(func.key().to_string(), value);
        }
        env.extend(jsenv.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{hash_source, sha256, Asset, EnvFn, Hook};
    use crate::template::{ParsedFile, TemplateSet};
    use http::header::CONTENT_SECURITY_POLICY;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn page(source: &str, css: &[&str], js: &[&str], hooks: Vec<Hook>) -> Page {
        let mut templates = TemplateSet::new();
        templates.merge_file(&ParsedFile::parse("index", source).unwrap());
        Page {
            main: "index".to_string(),
            templates,
            css: css.iter().map(|c| Arc::new(Asset::new("a.css", *c))).collect(),
            js: js.iter().map(|j| Arc::new(Asset::new("a.js", *j))).collect(),
            hooks,
            env: Vec::new(),
            inline: true,
            url_prefix: "static".to_string(),
            pool: Arc::new(BufferPool::new(4)),
        }
    }

    fn request() -> Request<()> {
        Request::new(())
    }

    #[test]
    fn test_renders_blocks_and_headers() {
        let page = page("{{ css }}{{ js }}<p>{{ .msg }}</p>", &["body{color:red}"], &["go()"], vec![]);
        let mut response = Response::new();
        page.render(&mut response, &request(), json!({"msg": "hi"}), &RenderOptions::new())
            .unwrap();

        assert_eq!(
            response.body_str().unwrap(),
            "<style>body{color:red}</style><script>go()</script><p>hi</p>"
        );
        assert_eq!(response.header("content-type"), Some(HTML_CONTENT_TYPE));
        let policy = ContentSecurityPolicy::parse(response.header("content-security-policy").unwrap());
        assert!(policy.contains("style-src", &Asset::new("x", "body{color:red}").hash_source()));
        assert!(policy.contains("script-src", &Asset::new("x", "go()").hash_source()));
    }

    #[test]
    fn test_existing_directive_is_extended() {
        let page = page("{{ css }}", &["a{}"], &[], vec![]);
        let mut response = Response::new();
        response
            .headers
            .insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static("style-src 'self'"));
        page.render(&mut response, &request(), Value::Null, &RenderOptions::new())
            .unwrap();
        let header = response.header("content-security-policy").unwrap();
        assert_eq!(header.matches("style-src").count(), 1);
        assert!(header.starts_with("style-src 'self' 'sha256-"));
    }

    #[test]
    fn test_meta_tag_without_headers() {
        let page = page("{{ csp }}", &["a{}"], &[], vec![]);
        let mut out: Vec<u8> = Vec::new();
        page.render(&mut out, &request(), Value::Null, &RenderOptions::new())
            .unwrap();
        let html = String::from_utf8(out).unwrap();
        assert!(html.starts_with(r#"<meta http-equiv="Content-Security-Policy" content="style-src 'sha256-"#));
    }

    #[test]
    fn test_hooks_chain_data() {
        let hooks = vec![
            Hook::with_id("one", |_, _, mut data| {
                data["n"] = json!(1);
                Ok(data)
            }),
            Hook::with_id("two", |_, _, mut data| {
                let n = data["n"].as_i64().unwrap_or(0);
                data["n"] = json!(n + 1);
                Ok(data)
            }),
        ];
        let page = page("{{ .n }}", &[], &[], hooks);
        let mut out: Vec<u8> = Vec::new();
        page.render(&mut out, &request(), Value::Null, &RenderOptions::new())
            .unwrap();
        assert_eq!(out, b"2");
    }

    #[test]
    fn test_failing_hook_stops_render() {
        let ran = Arc::new(AtomicUsize::new(0));
        let hooks: Vec<Hook> = (0..5)
            .map(|i| {
                let ran = Arc::clone(&ran);
                Hook::with_id(format!("h{i}"), move |_, _, data| {
                    ran.fetch_add(1, Ordering::SeqCst);
                    if i == 2 {
                        Err(HookError::msg("denied"))
                    } else {
                        Ok(data)
                    }
                })
            })
            .collect();
        let page = page("body", &[], &[], hooks);
        let mut out: Vec<u8> = Vec::new();
        let err = page
            .render(&mut out, &request(), Value::Null, &RenderOptions::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Hook { ref id, .. } if id == "h2"));
        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert!(out.is_empty());
    }

    #[test]
    fn test_exec_failure_writes_nothing() {
        let page = page("partial output {{ template \"missing\" }}", &[], &[], vec![]);
        let mut response = Response::new();
        let err = page
            .render(&mut response, &request(), Value::Null, &RenderOptions::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Exec { .. }));
        assert!(response.body.is_empty());
        assert!(response.header("content-type").is_none());
    }

    #[test]
    fn test_external_mode_override() {
        let page = page("{{ css }}", &["a{}"], &[], vec![]);
        let mut response = Response::new();
        page.render(
            &mut response,
            &request(),
            Value::Null,
            &RenderOptions::new().inline_assets(false),
        )
        .unwrap();
        assert_eq!(
            response.body_str().unwrap(),
            r#"<link rel="stylesheet" href="/static/a.css">"#
        );
        assert_eq!(response.header("content-security-policy"), Some("style-src 'self'"));
    }

    #[test]
    fn test_non_utf8_css_is_allowed_by_its_hash() {
        let data = b"a{}\xE9".to_vec();
        let mut page = page("{{ css }}", &[], &[], vec![]);
        page.css = vec![Arc::new(Asset::new("a.css", data.clone()))];
        let mut response = Response::new();
        page.render(&mut response, &request(), Value::Null, &RenderOptions::new())
            .unwrap();

        assert_eq!(response.body, [b"<style>".as_slice(), data.as_slice(), b"</style>".as_slice()].concat());
        let policy = ContentSecurityPolicy::parse(response.header("content-security-policy").unwrap());
        assert!(policy.contains("style-src", &hash_source(&sha256(&data))));
    }

    #[test]
    fn test_env_fns_feed_env_script() {
        let mut page = page("{{ js }}", &[], &[], vec![]);
        page.env = vec![
            EnvFn::new("user", |request| {
                let user = request
                    .headers()
                    .get("x-user")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("anon");
                Ok(json!(user))
            }),
            EnvFn::new("mode", |_| Ok(json!("plugin"))),
        ];
        let request = Request::builder().header("x-user", "ann").body(()).unwrap();
        let options = RenderOptions::new().with_env("mode", "request");
        let mut response = Response::new();
        page.render(&mut response, &request, Value::Null, &options).unwrap();

        let mut env = Map::new();
        env.insert("user".to_string(), json!("ann"));
        env.insert("mode".to_string(), json!("request"));
        let script = blocks::env_script(&env).unwrap();
        assert_eq!(response.body_str().unwrap(), format!("<script>{}</script>", script));
        let policy = ContentSecurityPolicy::parse(response.header("content-security-policy").unwrap());
        assert!(policy.contains("script-src", &hash_source(&sha256(script.as_bytes()))));
    }

    #[test]
    fn test_failing_env_fn_writes_nothing() {
        let mut page = page("{{ js }}", &[], &[], vec![]);
        page.env = vec![EnvFn::new("user", |_| Err(HookError::msg("no session")))];
        let mut response = Response::new();
        let err = page
            .render(&mut response, &request(), Value::Null, &RenderOptions::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Env { ref key, .. } if key == "user"));
        assert!(response.body.is_empty());
        assert!(response.header("content-security-policy").is_none());
    }

    #[test]
    fn test_json_data_skips_template() {
        let hooks = vec![Hook::with_id("fill", |_, _, _| Ok(json!({"ok": true})))];
        let page = page("{{ .ok }}", &[], &[], hooks);
        let mut response = Response::new();
        page.render(&mut response, &request(), Value::Null, &RenderOptions::new().json_data(true))
            .unwrap();
        assert_eq!(response.body_str(), Some(r#"{"ok":true}"#));
        assert_eq!(response.header("content-type"), Some(JSON_CONTENT_TYPE));
    }

    #[test]
    fn test_extra_csp_directives_are_merged() {
        let page = page("x", &[], &[], vec![]);
        let mut response = Response::new();
        let options = RenderOptions::new().with_csp("img-src", ["'self'", "data:"]);
        page.render(&mut response, &request(), Value::Null, &options)
            .unwrap();
        assert_eq!(
            response.header("content-security-policy"),
            Some("img-src 'self' data:")
        );
    }
}
