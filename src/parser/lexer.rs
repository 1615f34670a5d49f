//! Lexer for the fragment language
//!
//! Source text is split into literal text and `{{ ... }}` actions by a small
//! scanner; the inside of each action is tokenized with logos.

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const COMMENT_OPEN: &str = "{{/*";
const COMMENT_CLOSE: &str = "*/}}";

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Produced by the scanner, never by logos
    Text(String),
    Open,
    Close,

    #[token("define")]
    Define,
    #[token("template")]
    Template,
    #[token("block")]
    Block,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("range")]
    Range,
    #[token("with")]
    With,
    #[token("end")]
    End,

    // `.`, `.a`, `.a.b`
    #[regex(r"\.([a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*)?", |lex| split_fields(&lex.slice()[1..]))]
    Field(Vec<String>),

    // `$`, `$.a`, `$.a.b`
    #[regex(r"\$(\.[a-zA-Z_][a-zA-Z0-9_]*)*", |lex| split_fields(lex.slice().trim_start_matches('$').trim_start_matches('.')))]
    Root(Vec<String>),

    // Identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(&lex.slice()[1..lex.slice().len() - 1]))]
    String(String),
}

fn split_fields(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split('.').map(str::to_string).collect()
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Tokenize a whole fragment source
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, ParseError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let Some(found) = input[pos..].find(OPEN) else {
            tokens.push((Token::Text(input[pos..].to_string()), pos..input.len()));
            break;
        };
        let open = pos + found;
        if open > pos {
            tokens.push((Token::Text(input[pos..open].to_string()), pos..open));
        }

        if input[open..].starts_with(COMMENT_OPEN) {
            let body = open + COMMENT_OPEN.len();
            let end = input[body..]
                .find(COMMENT_CLOSE)
                .ok_or_else(|| ParseError::unclosed(open..open + COMMENT_OPEN.len(), "comment"))?;
            pos = body + end + COMMENT_CLOSE.len();
            continue;
        }

        let inner_start = open + OPEN.len();
        let inner_len = find_close(&input[inner_start..])
            .ok_or_else(|| ParseError::unclosed(open..inner_start, "action"))?;
        let inner_end = inner_start + inner_len;

        tokens.push((Token::Open, open..inner_start));
        lex_action(&input[inner_start..inner_end], inner_start, &mut tokens)?;
        tokens.push((Token::Close, inner_end..inner_end + CLOSE.len()));
        pos = inner_end + CLOSE.len();
    }

    Ok(tokens)
}

/// Offset of the first `}}` that is not inside a string literal
fn find_close(action: &str) -> Option<usize> {
    let bytes = action.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_string => i += 1,
            b'"' => in_string = !in_string,
            b'}' if !in_string && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn lex_action(
    action: &str,
    offset: usize,
    tokens: &mut Vec<(Token, Span)>,
) -> Result<(), ParseError> {
    for (tok, span) in Token::lexer(action).spanned() {
        let span = span.start + offset..span.end + offset;
        match tok {
            Ok(t) => tokens.push((t, span)),
            Err(()) => {
                return Err(ParseError::Syntax {
                    message: format!("unexpected character in action: {:?}", &action[span.start - offset..span.end - offset]),
                    span,
                    expected: Vec::new(),
                })
            }
        }
    }
    Ok(())
}
