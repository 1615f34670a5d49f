//! Fragment execution against JSON data

use serde_json::Value;
use thiserror::Error;

use crate::parser::{Node, Path, Spanned};
use crate::template::TemplateSet;

/// Deepest chain of nested `template`/`block` invocations before execution
/// gives up. Each level costs several native frames, so this has to stay
/// well inside a default 2 MiB thread stack.
pub const MAX_DEPTH: usize = 100;

static NULL: Value = Value::Null;

/// Errors raised while executing a fragment
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("template \"{name}\" is not defined")]
    MissingFragment { name: String },

    #[error("unknown slot \"{slot}\" in template \"{fragment}\"")]
    UnknownSlot { slot: String, fragment: String },

    #[error("range can't iterate over {path} in template \"{fragment}\"")]
    NotIterable { path: String, fragment: String },

    #[error("exceeded maximum template depth ({MAX_DEPTH})")]
    TooDeep,
}

/// Trusted HTML made available to fragments as `{{ css }}`, `{{ js }}` and
/// `{{ csp }}`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots {
    pub css: Vec<u8>,
    pub js: Vec<u8>,
    pub csp: Vec<u8>,
}

impl Slots {
    fn get(&self, name: &str) -> Option<&[u8]> {
        match name {
            "css" => Some(&self.css),
            "js" => Some(&self.js),
            "csp" => Some(&self.csp),
            _ => None,
        }
    }
}

/// Execute fragment `name` from `set` with `data` as both root and dot
pub fn execute(
    set: &TemplateSet,
    name: &str,
    data: &Value,
    slots: &Slots,
    out: &mut Vec<u8>,
) -> Result<(), ExecError> {
    let mut executor = Executor {
        set,
        slots,
        root: data,
        out,
    };
    executor.invoke(name, data, 0)
}

struct Executor<'a> {
    set: &'a TemplateSet,
    slots: &'a Slots,
    root: &'a Value,
    out: &'a mut Vec<u8>,
}

impl<'a> Executor<'a> {
    fn invoke(&mut self, name: &str, dot: &Value, depth: usize) -> Result<(), ExecError> {
        if depth >= MAX_DEPTH {
            return Err(ExecError::TooDeep);
        }
        let set = self.set;
        let fragment = set.get(name).ok_or_else(|| ExecError::MissingFragment {
            name: name.to_string(),
        })?;
        self.body(&fragment.name, &fragment.body, dot, depth)
    }

    fn body(
        &mut self,
        fragment: &str,
        body: &[Spanned<Node>],
        dot: &Value,
        depth: usize,
    ) -> Result<(), ExecError> {
        for node in body {
            self.node(fragment, &node.node, dot, depth)?;
        }
        Ok(())
    }

    fn node(&mut self, fragment: &str, node: &Node, dot: &Value, depth: usize) -> Result<(), ExecError> {
        match node {
            Node::Text(text) => self.out.extend_from_slice(text.as_bytes()),
            Node::Output(path) => {
                let value = self.eval(path, dot);
                self.out
                    .extend_from_slice(escape_html(&display(value)).as_bytes());
            }
            Node::Slot(slot) => {
                let html = self.slots.get(slot).ok_or_else(|| ExecError::UnknownSlot {
                    slot: slot.clone(),
                    fragment: fragment.to_string(),
                })?;
                self.out.extend_from_slice(html);
            }
            Node::Invoke { name, arg } | Node::Block { name, arg, .. } => {
                let value = match arg {
                    Some(path) => self.eval(path, dot),
                    None => &NULL,
                };
                self.invoke(name, value, depth + 1)?;
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                if truthy(self.eval(cond, dot)) {
                    self.body(fragment, then, dot, depth)?;
                } else {
                    self.body(fragment, otherwise, dot, depth)?;
                }
            }
            Node::With {
                value,
                body,
                otherwise,
            } => {
                let value = self.eval(value, dot);
                if truthy(value) {
                    self.body(fragment, body, value, depth)?;
                } else {
                    self.body(fragment, otherwise, dot, depth)?;
                }
            }
            Node::Range {
                over,
                body,
                otherwise,
            } => {
                let value = self.eval(over, dot);
                match value {
                    Value::Array(items) if !items.is_empty() => {
                        for item in items {
                            self.body(fragment, body, item, depth)?;
                        }
                    }
                    Value::Object(map) if !map.is_empty() => {
                        for item in map.values() {
                            self.body(fragment, body, item, depth)?;
                        }
                    }
                    Value::Null | Value::Array(_) | Value::Object(_) => {
                        self.body(fragment, otherwise, dot, depth)?;
                    }
                    _ => {
                        return Err(ExecError::NotIterable {
                            path: over.to_string(),
                            fragment: fragment.to_string(),
                        })
                    }
                }
            }
            // definitions are split out at parse time
            Node::Define { .. } => {}
        }
        Ok(())
    }

    /// Follow a path; missing fields and out-of-range indexes are null
    fn eval<'v>(&self, path: &Path, dot: &'v Value) -> &'v Value
    where
        'a: 'v,
    {
        let mut value = if path.from_root { self.root } else { dot };
        for field in &path.fields {
            value = match value {
                Value::Object(map) => map.get(field).unwrap_or(&NULL),
                Value::Array(items) => field
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i))
                    .unwrap_or(&NULL),
                _ => &NULL,
            };
        }
        value
    }
}

/// `null`, `false`, `0`, `""` and empty collections are false
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}
