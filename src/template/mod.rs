//! Fragment registry and invocation-graph resolution
//!
//! Fragments are named template units. One source file parses into a root
//! fragment plus any fragments it declares with `define` or `block`:
//!
//! ```text
//! <html>{{ template "header" . }}{{ block "content" . }}{{ end }}</html>
//! {{ define "header" }}<h1>{{ .title }}</h1>{{ end }}
//! ```
//!
//! `{{ template "name" }}` and `{{ block "name" }}` are invocation edges;
//! [`resolve`] walks them to list every fragment a page needs.

mod registry;
mod resolver;

pub use registry::{
    Fragment, FragmentLookup, ParsedFile, TemplateError, TemplateRegistry, TemplateSet,
};
pub use resolver::{resolve, resolve_names, ResolveError};
