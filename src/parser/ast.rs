//! Abstract Syntax Tree types for the fragment language

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// A field path such as `.`, `.user.name` or `$.title`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    /// Path starts at the root data (`$`) rather than at dot
    pub from_root: bool,
    pub fields: Vec<String>,
}

impl Path {
    /// The bare dot path
    pub fn dot() -> Self {
        Self {
            from_root: false,
            fields: Vec::new(),
        }
    }

    pub fn new(from_root: bool, fields: Vec<String>) -> Self {
        Self { from_root, fields }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from_root {
            f.write_str("$")?;
        }
        if self.fields.is_empty() && !self.from_root {
            return f.write_str(".");
        }
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

/// A sequence of nodes
pub type Body = Vec<Spanned<Node>>;

/// One node of a fragment body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text outside of actions
    Text(String),
    /// `{{ .path }}`, HTML-escaped on output
    Output(Path),
    /// `{{ css }}`: a trusted slot filled in by the renderer, emitted raw
    Slot(String),
    /// `{{ template "name" .arg }}`
    Invoke { name: String, arg: Option<Path> },
    /// `{{ if .cond }} ... {{ else }} ... {{ end }}`
    If {
        cond: Path,
        then: Body,
        otherwise: Body,
    },
    /// `{{ range .items }} ... {{ else }} ... {{ end }}`
    Range {
        over: Path,
        body: Body,
        otherwise: Body,
    },
    /// `{{ with .value }} ... {{ else }} ... {{ end }}`
    With {
        value: Path,
        body: Body,
        otherwise: Body,
    },
    /// `{{ define "name" }} ... {{ end }}`
    Define { name: String, body: Body },
    /// `{{ block "name" .arg }} ... {{ end }}`: define and invoke in place
    Block {
        name: String,
        arg: Option<Path>,
        body: Body,
    },
}

/// A parsed source file: its top-level body, definitions still inline
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub nodes: Body,
}
