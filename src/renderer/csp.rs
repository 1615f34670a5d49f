//! Content-Security-Policy building
//!
//! Policies are `name token token; name token`. Appending to a directive that
//! already exists extends it in place instead of adding a second directive of
//! the same name, since browsers ignore all but the first.

use std::fmt;

use http::header::{HeaderMap, HeaderValue, InvalidHeaderValue, CONTENT_SECURITY_POLICY};

/// Directives that have no effect inside a `<meta>` policy
const META_EXCLUDED: &[&str] = &["frame-ancestors", "report-uri", "sandbox"];

/// One `name token...` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub tokens: Vec<String>,
}

/// An ordered list of directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    directives: Vec<Directive>,
}

impl ContentSecurityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a header value; empty segments are skipped
    pub fn parse(header: &str) -> Self {
        let directives = header
            .split(';')
            .filter_map(|segment| {
                let mut parts = segment.split_whitespace();
                let name = parts.next()?;
                Some(Directive {
                    name: name.to_string(),
                    tokens: parts.map(str::to_string).collect(),
                })
            })
            .collect();
        Self { directives }
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Tokens of a directive, matched case-insensitively
    pub fn directive(&self, name: &str) -> Option<&[String]> {
        self.position(name).map(|i| self.directives[i].tokens.as_slice())
    }

    pub fn contains(&self, name: &str, token: &str) -> bool {
        self.directive(name)
            .is_some_and(|tokens| tokens.iter().any(|t| t == token))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.directives
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Add tokens to `name`, creating the directive at the end if missing.
    ///
    /// Tokens already present in the directive are not repeated. Nothing is
    /// created when `tokens` is empty.
    pub fn append<I, S>(&mut self, name: &str, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens = tokens.into_iter().peekable();
        if tokens.peek().is_none() {
            return;
        }
        let index = match self.position(name) {
            Some(i) => i,
            None => {
                self.directives.push(Directive {
                    name: name.to_string(),
                    tokens: Vec::new(),
                });
                self.directives.len() - 1
            }
        };
        let existing = &mut self.directives[index].tokens;
        for token in tokens {
            let token = token.as_ref();
            if !existing.iter().any(|t| t == token) {
                existing.push(token.to_string());
            }
        }
    }

    /// Merge every directive of `other` into this policy
    pub fn merge(&mut self, other: &ContentSecurityPolicy) {
        for directive in &other.directives {
            if directive.tokens.is_empty() && self.position(&directive.name).is_none() {
                self.directives.push(directive.clone());
            } else {
                self.append(&directive.name, &directive.tokens);
            }
        }
    }

    /// The policy as a `<meta http-equiv>` tag, minus directives a meta
    /// policy cannot carry
    pub fn meta_tag(&self) -> String {
        let content = self
            .directives
            .iter()
            .filter(|d| {
                !META_EXCLUDED
                    .iter()
                    .any(|excluded| d.name.eq_ignore_ascii_case(excluded))
            })
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        format!(
            r#"<meta http-equiv="Content-Security-Policy" content="{}">"#,
            escape_attr(&content)
        )
    }

    /// Read the policy out of response headers; empty when absent
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CONTENT_SECURITY_POLICY)
            .and_then(|v| v.to_str().ok())
            .map(Self::parse)
            .unwrap_or_default()
    }

    /// Store the policy as the response's only CSP header
    pub fn write_headers(&self, headers: &mut HeaderMap) -> Result<(), InvalidHeaderValue> {
        if self.directives.is_empty() {
            return Ok(());
        }
        let value = HeaderValue::from_str(&self.to_string())?;
        headers.insert(CONTENT_SECURITY_POLICY, value);
        Ok(())
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for token in &self.tokens {
            write!(f, " {}", token)?;
        }
        Ok(())
    }
}

impl fmt::Display for ContentSecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, directive) in self.directives.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", directive)?;
        }
        Ok(())
    }
}

/// Append tokens to a directive of a raw header value
pub fn append<I, S>(header: &str, directive: &str, tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut policy = ContentSecurityPolicy::parse(header);
    policy.append(directive, tokens);
    policy.to_string()
}

/// Append tokens to a directive of the CSP header in `headers`
pub fn append_header<I, S>(
    headers: &mut HeaderMap,
    directive: &str,
    tokens: I,
) -> Result<(), InvalidHeaderValue>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut policy = ContentSecurityPolicy::from_headers(headers);
    policy.append(directive, tokens);
    policy.write_headers(headers)
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_append_into_existing_directive() {
        assert_eq!(
            append("style-src 'self'", "style-src", ["'sha256-abc='"]),
            "style-src 'self' 'sha256-abc='"
        );
    }

    #[test]
    fn test_append_creates_new_directive() {
        assert_eq!(
            append("default-src 'none'", "style-src", ["'sha256-abc='"]),
            "default-src 'none'; style-src 'sha256-abc='"
        );
        assert_eq!(append("", "script-src", ["'self'"]), "script-src 'self'");
    }

    #[test]
    fn test_append_keeps_surrounding_directives() {
        let header = "default-src 'self'; style-src 'self'; img-src *";
        assert_eq!(
            append(header, "style-src", ["'sha256-x='"]),
            "default-src 'self'; style-src 'self' 'sha256-x='; img-src *"
        );
    }

    #[test]
    fn test_append_skips_duplicate_tokens() {
        let mut policy = ContentSecurityPolicy::parse("script-src 'self'");
        policy.append("script-src", ["'self'", "'sha256-a='"]);
        policy.append("script-src", ["'sha256-a='"]);
        assert_eq!(policy.to_string(), "script-src 'self' 'sha256-a='");
    }

    #[test]
    fn test_directive_names_match_case_insensitively() {
        let mut policy = ContentSecurityPolicy::parse("Style-Src 'self'");
        policy.append("style-src", ["x"]);
        assert_eq!(policy.directives().len(), 1);
        assert!(policy.contains("STYLE-SRC", "x"));
    }

    #[test]
    fn test_empty_append_creates_nothing() {
        let mut policy = ContentSecurityPolicy::new();
        policy.append("style-src", Vec::<String>::new());
        assert!(policy.directives().is_empty());
    }

    #[test]
    fn test_meta_tag_strips_header_only_directives() {
        let policy = ContentSecurityPolicy::parse(
            "frame-ancestors 'none'; style-src 'self'; report-uri /r; sandbox; script-src 'self'",
        );
        assert_eq!(
            policy.meta_tag(),
            r#"<meta http-equiv="Content-Security-Policy" content="style-src 'self'; script-src 'self'">"#
        );
    }

    #[test]
    fn test_header_round_trip() {
        let mut headers = HeaderMap::new();
        append_header(&mut headers, "style-src", ["'self'"]).unwrap();
        append_header(&mut headers, "style-src", ["'sha256-a='"]).unwrap();
        append_header(&mut headers, "script-src", ["'sha256-b='"]).unwrap();
        assert_eq!(
            headers.get(CONTENT_SECURITY_POLICY).unwrap().to_str().unwrap(),
            "style-src 'self' 'sha256-a='; script-src 'sha256-b='"
        );
    }

    #[test]
    fn test_merge_extends_and_adds() {
        let mut policy = ContentSecurityPolicy::parse("style-src 'self'");
        policy.merge(&ContentSecurityPolicy::parse("style-src https:; upgrade-insecure-requests"));
        assert_eq!(
            policy.to_string(),
            "style-src 'self' https:; upgrade-insecure-requests"
        );
    }
}
