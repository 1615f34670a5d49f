//! Pagecomposer - server-side page composition
//!
//! Given a main template and a set of include files, the engine resolves
//! every fragment the page invokes, collects the CSS, JS and pre-render hooks
//! attached to those fragments, deduplicates them by content hash and renders
//! the page with a Content-Security-Policy built from the same hashes.
//!
//! # Example
//!
//! ```rust
//! use pagecomposer::{Component, Engine, MemStore, Plugin, RenderOptions, Response};
//!
//! let store = MemStore::new()
//!     .with_file("index.html", r#"<html>{{ css }}{{ template "header" . }}</html>"#);
//!
//! let nav = Plugin::new("nav")
//!     .with_fragment("header.html", r#"{{ define "header" }}<h1>{{ .title }}</h1>{{ end }}"#)
//!     .with_asset("header.css", "h1{color:red}")
//!     .with_component(Component::new("header").with_css("header.css"));
//!
//! let engine = Engine::builder(store).plugins([nav]).unwrap().build();
//! let page = engine.lookup("index.html", &[]).unwrap();
//!
//! let mut response = Response::new();
//! let request = http::Request::new(());
//! let data = serde_json::json!({ "title": "Hello" });
//! page.render(&mut response, &request, data, &RenderOptions::new()).unwrap();
//!
//! assert!(response.body_str().unwrap().contains("<h1>Hello</h1>"));
//! assert!(response.header("content-security-policy").unwrap().starts_with("style-src 'sha256-"));
//! ```

pub mod assets;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod page;
pub mod parser;
pub mod renderer;
pub mod store;
pub mod template;

pub use assets::{Asset, AssetRegistry, Component, EnvFn, Hook, HookError, Plugin, Scope};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineBuilder, LookupError, PageError, SetupError};
pub use error::ParseError;
pub use page::Page;
pub use parser::{parse, Document};
pub use renderer::{
    ContentSecurityPolicy, ExecError, RenderError, RenderOptions, Response, ResponseWriter,
};
pub use store::{DirStore, Marker, MemStore, MuxStore, Store, StoreError};
pub use template::{resolve, Fragment, ResolveError, TemplateError, TemplateRegistry};
