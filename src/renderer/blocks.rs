//! CSS and JS blocks plus the CSP tokens that allow them

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::assets::{hash_source, sha256, Asset};

use super::csp::ContentSecurityPolicy;

/// How assets reach the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetMode {
    /// Asset bytes inside `<style>`/`<script>`, allowed by hash
    Inline,
    /// `<link>`/`<script src>` under a URL prefix, allowed by `'self'`
    External { url_prefix: String },
}

impl AssetMode {
    fn url(url_prefix: &str, name: &str) -> String {
        let prefix = url_prefix.trim_matches('/');
        let name = name.trim_start_matches('/');
        if prefix.is_empty() {
            format!("/{}", name)
        } else {
            format!("/{}/{}", prefix, name)
        }
    }
}

/// Render the CSS block and add its sources to `style-src`.
///
/// Inline assets are copied byte for byte, so the bytes on the page are the
/// bytes the hash covers.
pub fn css_block(
    assets: &[Arc<Asset>],
    mode: &AssetMode,
    policy: &mut ContentSecurityPolicy,
) -> Vec<u8> {
    let mut html = Vec::new();
    match mode {
        AssetMode::Inline => {
            for asset in assets {
                push_line(&mut html);
                wrap(&mut html, "<style>", asset.data(), "</style>");
            }
            policy.append("style-src", assets.iter().map(|a| a.hash_source()));
        }
        AssetMode::External { url_prefix } => {
            for asset in assets {
                push_line(&mut html);
                html.extend_from_slice(
                    format!(
                        r#"<link rel="stylesheet" href="{}">"#,
                        escape_attr(&AssetMode::url(url_prefix, asset.name()))
                    )
                    .as_bytes(),
                );
            }
            if !assets.is_empty() {
                policy.append("style-src", ["'self'"]);
            }
        }
    }
    html
}

/// Render the JS block, led by the `window.Env` script when `env` has
/// entries, and add its sources to `script-src`
pub fn js_block(
    assets: &[Arc<Asset>],
    env: &Map<String, Value>,
    mode: &AssetMode,
    policy: &mut ContentSecurityPolicy,
) -> Result<Vec<u8>, serde_json::Error> {
    let mut html = Vec::new();
    let mut sources = Vec::new();

    if !env.is_empty() {
        let script = env_script(env)?;
        sources.push(hash_source(&sha256(script.as_bytes())));
        wrap(&mut html, "<script>", script.as_bytes(), "</script>");
    }

    match mode {
        AssetMode::Inline => {
            for asset in assets {
                push_line(&mut html);
                wrap(&mut html, "<script>", asset.data(), "</script>");
                sources.push(asset.hash_source());
            }
        }
        AssetMode::External { url_prefix } => {
            if !assets.is_empty() {
                sources.insert(0, "'self'".to_string());
            }
            for asset in assets {
                push_line(&mut html);
                html.extend_from_slice(
                    format!(
                        r#"<script src="{}"></script>"#,
                        escape_attr(&AssetMode::url(url_prefix, asset.name()))
                    )
                    .as_bytes(),
                );
            }
        }
    }

    policy.append("script-src", sources);
    Ok(html)
}

/// Script defining `window.Env(key)` over a fixed JSON map
pub fn env_script(env: &Map<String, Value>) -> Result<String, serde_json::Error> {
    // keep the payload from closing the surrounding <script>
    let json = serde_json::to_string(env)?.replace("</", "<\\/");
    Ok(format!(
        "window.Env = (function () {{ const env = {}; return function (key) {{ return env[key]; }}; }})();",
        json
    ))
}

fn push_line(html: &mut Vec<u8>) {
    if !html.is_empty() {
        html.push(b'\n');
    }
}

fn wrap(html: &mut Vec<u8>, open: &str, body: &[u8], close: &str) {
    html.extend_from_slice(open.as_bytes());
    html.extend_from_slice(body);
    html.extend_from_slice(close.as_bytes());
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
