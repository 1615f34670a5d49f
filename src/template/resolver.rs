//! Dependency resolution - lists every fragment a root fragment needs

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use super::registry::{Fragment, FragmentLookup};

/// Errors that can occur while walking the invocation graph
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The root fragment itself is not registered
    #[error("no such template \"{name}\"")]
    MissingRoot { name: String },

    /// An invocation edge points at an unregistered fragment
    #[error("{{{{ template \"{name}\" }}}} was referenced by \"{referenced_by}\", but was not found")]
    Missing { name: String, referenced_by: String },
}

impl ResolveError {
    /// Name of the fragment that could not be found
    pub fn missing_name(&self) -> &str {
        match self {
            ResolveError::MissingRoot { name } | ResolveError::Missing { name, .. } => name,
        }
    }
}

/// Walk the invocation graph from `root` breadth-first.
///
/// Returns every reachable fragment exactly once, root first, in
/// first-discovered order. Cycles terminate through the visited set. Any
/// unresolved name fails the whole walk.
pub fn resolve(root: &str, lookup: &impl FragmentLookup) -> Result<Vec<Arc<Fragment>>, ResolveError> {
    let root_fragment = lookup
        .fragment(root)
        .ok_or_else(|| ResolveError::MissingRoot {
            name: root.to_string(),
        })?;

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(root.to_string());

    let mut queue: VecDeque<(String, String)> = root_fragment
        .invocations()
        .into_iter()
        .map(|name| (name.to_string(), root.to_string()))
        .collect();

    let mut resolved = vec![root_fragment];

    while let Some((name, referenced_by)) = queue.pop_front() {
        if !visited.insert(name.clone()) {
            continue;
        }
        let fragment = lookup
            .fragment(&name)
            .ok_or_else(|| ResolveError::Missing {
                name: name.clone(),
                referenced_by,
            })?;
        queue.extend(
            fragment
                .invocations()
                .into_iter()
                .map(|target| (target.to_string(), name.clone())),
        );
        resolved.push(fragment);
    }

    tracing::trace!(root, count = resolved.len(), "resolved fragment closure");
    Ok(resolved)
}

/// Same as [`resolve`], returning just the names
pub fn resolve_names(root: &str, lookup: &impl FragmentLookup) -> Result<Vec<String>, ResolveError> {
    Ok(resolve(root, lookup)?
        .into_iter()
        .map(|f| f.name.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ParsedFile, TemplateSet};
    use pretty_assertions::assert_eq;

    fn set(files: &[(&str, &str)]) -> TemplateSet {
        let mut set = TemplateSet::new();
        for (name, source) in files {
            set.merge_file(&ParsedFile::parse(name, source).unwrap());
        }
        set
    }

    #[test]
    fn test_breadth_first_order() {
        let set = set(&[
            ("index", r#"{{ template "a" }}{{ template "b" }}"#),
            ("a", r#"{{ template "c" }}"#),
            ("b", r#"{{ template "d" }}"#),
            ("c", "c"),
            ("d", "d"),
        ]);
        assert_eq!(
            resolve_names("index", &set).unwrap(),
            vec!["index", "a", "b", "c", "d"]
        );
    }

    #[test]
    fn test_diamond_listed_once() {
        let set = set(&[
            ("index", r#"{{ template "a" }}{{ template "b" }}"#),
            ("a", r#"{{ template "shared" }}"#),
            ("b", r#"{{ template "shared" }}"#),
            ("shared", "s"),
        ]);
        assert_eq!(
            resolve_names("index", &set).unwrap(),
            vec!["index", "a", "b", "shared"]
        );
    }

    #[test]
    fn test_self_reference_terminates() {
        let set = set(&[("tree", r#"{{ range .children }}{{ template "tree" . }}{{ end }}"#)]);
        assert_eq!(resolve_names("tree", &set).unwrap(), vec!["tree"]);
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let set = set(&[
            ("index", r#"{{ template "ping" }}"#),
            ("ping", r#"{{ template "pong" }}"#),
            ("pong", r#"{{ template "ping" }}{{ template "index" }}"#),
        ]);
        assert_eq!(
            resolve_names("index", &set).unwrap(),
            vec!["index", "ping", "pong"]
        );
    }

    #[test]
    fn test_missing_fragment_is_named() {
        let set = set(&[
            ("index", r#"{{ template "a" }}"#),
            ("a", r#"{{ template "X" }}"#),
        ]);
        let err = resolve("index", &set).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Missing {
                name: "X".to_string(),
                referenced_by: "a".to_string(),
            }
        );
        assert!(err.to_string().contains("\"X\""));
    }

    #[test]
    fn test_missing_root() {
        let set = TemplateSet::new();
        let err = resolve("index", &set).unwrap_err();
        assert_eq!(err.missing_name(), "index");
    }

    #[test]
    fn test_unreachable_fragments_excluded() {
        let set = set(&[("index", "plain"), ("orphan", "o")]);
        assert_eq!(resolve_names("index", &set).unwrap(), vec!["index"]);
    }
}
