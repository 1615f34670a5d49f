//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::Token;

/// Parse fragment source into an AST
pub fn parse(input: &str) -> Result<Document, Vec<crate::ParseError>> {
    let len = input.len();

    let tokens = crate::parser::lexer::lex(input).map_err(|e| vec![e])?;
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Turn the token iterator into a stream that chumsky can use
    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    document_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn document_parser<'a, I>() -> impl Parser<'a, I, Document, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let string_literal = select! {
        Token::String(s) => s,
    };

    let path = select! {
        Token::Field(fields) => Path::new(false, fields),
        Token::Root(fields) => Path::new(true, fields),
    };

    let open = just(Token::Open);
    let close = just(Token::Close);

    let end_action = open
        .clone()
        .then(just(Token::End))
        .then(close.clone())
        .ignored();

    let else_action = open
        .clone()
        .then(just(Token::Else))
        .then(close.clone())
        .ignored();

    let node = recursive(|node| {
        let body = node.clone().repeated().collect::<Vec<_>>();

        // Optional `{{ else }}` branch shared by if/range/with
        let else_branch = else_action
            .clone()
            .ignore_then(body.clone())
            .or_not()
            .map(Option::unwrap_or_default);

        let text = select! {
            Token::Text(s) => Node::Text(s),
        };

        let output = path
            .clone()
            .delimited_by(open.clone(), close.clone())
            .map(Node::Output);

        let slot = select! {
            Token::Ident(s) => s,
        }
        .delimited_by(open.clone(), close.clone())
        .map(Node::Slot);

        let invoke = just(Token::Template)
            .ignore_then(string_literal.clone())
            .then(path.clone().or_not())
            .delimited_by(open.clone(), close.clone())
            .map(|(name, arg)| Node::Invoke { name, arg });

        let define = just(Token::Define)
            .ignore_then(string_literal.clone())
            .delimited_by(open.clone(), close.clone())
            .then(body.clone())
            .then_ignore(end_action.clone())
            .map(|(name, body)| Node::Define { name, body });

        let block = just(Token::Block)
            .ignore_then(string_literal.clone())
            .then(path.clone().or_not())
            .delimited_by(open.clone(), close.clone())
            .then(body.clone())
            .then_ignore(end_action.clone())
            .map(|((name, arg), body)| Node::Block { name, arg, body });

        let if_node = just(Token::If)
            .ignore_then(path.clone())
            .delimited_by(open.clone(), close.clone())
            .then(body.clone())
            .then(else_branch.clone())
            .then_ignore(end_action.clone())
            .map(|((cond, then), otherwise)| Node::If {
                cond,
                then,
                otherwise,
            });

        let range = just(Token::Range)
            .ignore_then(path.clone())
            .delimited_by(open.clone(), close.clone())
            .then(body.clone())
            .then(else_branch.clone())
            .then_ignore(end_action.clone())
            .map(|((over, body), otherwise)| Node::Range {
                over,
                body,
                otherwise,
            });

        let with = just(Token::With)
            .ignore_then(path.clone())
            .delimited_by(open.clone(), close.clone())
            .then(body)
            .then(else_branch)
            .then_ignore(end_action.clone())
            .map(|((value, body), otherwise)| Node::With {
                value,
                body,
                otherwise,
            });

        choice((text, output, slot, invoke, define, block, if_node, range, with))
            .map_with(|n, e| Spanned::new(n, span_range(&e.span())))
            .boxed()
    });

    // A document is a list of nodes
    node.repeated()
        .collect()
        .then_ignore(end())
        .map(|nodes| Document { nodes })
}
