//! Template registry for storing and retrieving parsed fragments

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::error::ParseError;
use crate::parser::{self, Body, Node, Spanned};

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Fragment not found in registry
    #[error("template not found: {name}")]
    NotFound { name: String },

    /// Malformed fragment source
    #[error("parse error in {name}: {}", format_parse_errors(.errors))]
    Parse {
        name: String,
        errors: Vec<ParseError>,
    },

    /// Fragment source is not UTF-8
    #[error("template {name} is not valid UTF-8")]
    InvalidUtf8 { name: String },
}

fn format_parse_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A named, parsed template unit
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub name: String,
    pub body: Body,
}

impl Fragment {
    pub fn new(name: impl Into<String>, body: Body) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Names of fragments this fragment invokes directly, in source order.
    ///
    /// This is a static walk over invocation nodes, including the ones nested
    /// in control flow; other fragments are not followed.
    pub fn invocations(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_invocations(&self.body, &mut names);
        names
    }
}

fn collect_invocations<'a>(body: &'a [Spanned<Node>], names: &mut Vec<&'a str>) {
    for node in body {
        match &node.node {
            Node::Invoke { name, .. } => names.push(name),
            Node::Block { name, body, .. } => {
                names.push(name);
                collect_invocations(body, names);
            }
            Node::If {
                then, otherwise, ..
            } => {
                collect_invocations(then, names);
                collect_invocations(otherwise, names);
            }
            Node::Range {
                body, otherwise, ..
            }
            | Node::With {
                body, otherwise, ..
            } => {
                collect_invocations(body, names);
                collect_invocations(otherwise, names);
            }
            Node::Define { body, .. } => collect_invocations(body, names),
            Node::Text(_) | Node::Output(_) | Node::Slot(_) => {}
        }
    }
}

/// Every fragment produced by parsing one source file.
///
/// The root fragment, named after the file, comes first; fragments declared
/// with `define` or `block` follow in source order.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub(crate) name: String,
    pub(crate) fragments: Vec<Arc<Fragment>>,
}

impl ParsedFile {
    /// Parse a source file into its fragments
    pub fn parse(name: &str, source: &str) -> Result<Self, TemplateError> {
        let doc = parser::parse(source).map_err(|errors| TemplateError::Parse {
            name: name.to_string(),
            errors,
        })?;

        let mut definitions = Vec::new();
        let root = split_definitions(doc.nodes, &mut definitions);

        let mut fragments = Vec::with_capacity(definitions.len() + 1);
        fragments.push(Arc::new(Fragment::new(name, root)));
        fragments.extend(definitions.into_iter().map(Arc::new));

        Ok(Self {
            name: name.to_string(),
            fragments,
        })
    }

    /// Parse raw bytes, which must be UTF-8
    pub fn parse_bytes(name: &str, source: &[u8]) -> Result<Self, TemplateError> {
        let source = std::str::from_utf8(source).map_err(|_| TemplateError::InvalidUtf8 {
            name: name.to_string(),
        })?;
        Self::parse(name, source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root first, then definitions in source order
    pub fn fragments(&self) -> &[Arc<Fragment>] {
        &self.fragments
    }

    /// The fragment named after the file
    pub fn root(&self) -> &Arc<Fragment> {
        // parse always pushes the root before any definition
        &self.fragments[0]
    }
}

/// Pull `define` bodies out into their own fragments and turn `block` into
/// a definition plus an invocation.
fn split_definitions(body: Body, definitions: &mut Vec<Fragment>) -> Body {
    let mut kept = Vec::with_capacity(body.len());
    for Spanned { node, span } in body {
        let node = match node {
            Node::Define { name, body } => {
                let body = split_definitions(body, definitions);
                definitions.push(Fragment::new(name, body));
                continue;
            }
            Node::Block { name, arg, body } => {
                let body = split_definitions(body, definitions);
                definitions.push(Fragment::new(name.clone(), body));
                Node::Invoke { name, arg }
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => Node::If {
                cond,
                then: split_definitions(then, definitions),
                otherwise: split_definitions(otherwise, definitions),
            },
            Node::Range {
                over,
                body,
                otherwise,
            } => Node::Range {
                over,
                body: split_definitions(body, definitions),
                otherwise: split_definitions(otherwise, definitions),
            },
            Node::With {
                value,
                body,
                otherwise,
            } => Node::With {
                value,
                body: split_definitions(body, definitions),
                otherwise: split_definitions(otherwise, definitions),
            },
            other => other,
        };
        kept.push(Spanned::new(node, span));
    }
    kept
}

/// Anything fragments can be looked up in by name
pub trait FragmentLookup {
    fn fragment(&self, name: &str) -> Option<Arc<Fragment>>;
}

/// A flat name -> fragment namespace.
///
/// Cloning a set is shallow: fragments are shared read-only, so a page can
/// graft fragments onto its own copy without touching anyone else's.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    fragments: HashMap<String, Arc<Fragment>>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every fragment of a parsed file; names collide last-write-wins
    pub fn merge_file(&mut self, file: &ParsedFile) {
        for fragment in &file.fragments {
            self.insert(Arc::clone(fragment));
        }
    }

    pub fn insert(&mut self, fragment: Arc<Fragment>) {
        self.fragments.insert(fragment.name.clone(), fragment);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Fragment>> {
        self.fragments.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(|s| s.as_str())
    }
}

impl FragmentLookup for TemplateSet {
    fn fragment(&self, name: &str) -> Option<Arc<Fragment>> {
        self.fragments.get(name).cloned()
    }
}

/// Registry for storing parsed fragments under one namespace
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    set: TemplateSet,
}

impl TemplateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source` and register every fragment it declares.
    ///
    /// A parse failure registers nothing.
    pub fn register(&mut self, name: &str, source: &str) -> Result<Arc<ParsedFile>, TemplateError> {
        let file = Arc::new(ParsedFile::parse(name, source)?);
        self.set.merge_file(&file);
        Ok(file)
    }

    /// Register an already parsed file
    pub fn register_file(&mut self, file: &ParsedFile) {
        self.set.merge_file(file);
    }

    /// Get a fragment by name
    pub fn lookup(&self, name: &str) -> Result<Arc<Fragment>, TemplateError> {
        self.set
            .fragment(name)
            .ok_or_else(|| TemplateError::NotFound {
                name: name.to_string(),
            })
    }

    /// Check if a fragment exists
    pub fn contains(&self, name: &str) -> bool {
        self.set.contains(name)
    }

    /// The underlying namespace
    pub fn set(&self) -> &TemplateSet {
        &self.set
    }
}

impl FragmentLookup for TemplateRegistry {
    fn fragment(&self, name: &str) -> Option<Arc<Fragment>> {
        self.set.fragment(name)
    }
}
