//! Error types for parsing fragment sources

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    pub(crate) fn unclosed(span: Span, what: &str) -> Self {
        ParseError::Syntax {
            span,
            message: format!("unclosed {}", what),
            expected: vec!["'}}'".to_string()],
        }
    }

    /// Byte range the error points at
    pub fn span(&self) -> &Span {
        match self {
            ParseError::Syntax { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        match self {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };

                let written = Report::build(ReportKind::Error, filename, span.start)
                    .with_message(message)
                    .with_label(
                        Label::new((filename, span.clone()))
                            .with_message(format!("{}{}", message, expected_str))
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((filename, Source::from(source)), &mut buf);
                if written.is_err() {
                    return format!("{}: {}", filename, self);
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::parser::lexer::Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, crate::parser::lexer::Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of input".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of input".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &crate::parser::lexer::Token) -> String {
    use crate::parser::lexer::Token;
    match tok {
        Token::Text(_) => "text".to_string(),
        Token::Open => "'{{'".to_string(),
        Token::Close => "'}}'".to_string(),
        Token::Define => "keyword 'define'".to_string(),
        Token::Template => "keyword 'template'".to_string(),
        Token::Block => "keyword 'block'".to_string(),
        Token::If => "keyword 'if'".to_string(),
        Token::Else => "keyword 'else'".to_string(),
        Token::Range => "keyword 'range'".to_string(),
        Token::With => "keyword 'with'".to_string(),
        Token::End => "keyword 'end'".to_string(),
        Token::Field(fields) => format!("field '.{}'", fields.join(".")),
        Token::Root(fields) if fields.is_empty() => "'$'".to_string(),
        Token::Root(fields) => format!("field '$.{}'", fields.join(".")),
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_includes_filename_and_message() {
        let err = ParseError::unclosed(6..8, "action");
        let report = err.format("hello {{ .x", "index.html");
        assert!(report.contains("index.html"));
        assert!(report.contains("unclosed action"));
    }

    #[test]
    fn test_grammar_error_names_unexpected_token() {
        let errs = crate::parser::parse("{{ end }}").unwrap_err();
        assert!(errs[0].to_string().contains("Unexpected"));
    }
}
