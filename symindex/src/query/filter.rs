// OData filter parsing - comparisons, and/or/not, function calls, literals

use crate::error::{IndexerError, Result};
use chumsky::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Property,
    StringLiteral,
    Number,
    Boolean,
    Null,
    Function,
    /// `and`, `or`, `not`
    Logical,
    /// `eq`, `ne`, `gt`, `ge`, `lt`, `le`
    Comparison,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text; string literals keep their quotes.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNode {
    pub token: Token,
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    fn leaf(kind: TokenKind, value: impl Into<String>) -> Self {
        ParseNode {
            token: Token {
                kind,
                value: value.into(),
            },
            children: Vec::new(),
        }
    }
}

const COMPARISONS: &[&str] = &["eq", "ne", "gt", "ge", "lt", "le"];

type Extra<'a> = extra::Err<Rich<'a, char>>;

/// Identifiers and property paths (`display_name`, `address/city`).
fn word<'a>() -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    any()
        .filter(|c: &char| c.is_alphabetic() || *c == '_')
        .then(
            any()
                .filter(|c: &char| c.is_alphanumeric() || matches!(c, '_' | '.' | '/'))
                .repeated(),
        )
        .to_slice()
}

fn keyword<'a>(kw: &'static str) -> impl Parser<'a, &'a str, &'a str, Extra<'a>> + Clone {
    word().filter(move |w: &&str| *w == kw).padded()
}

fn binary(kind: TokenKind, op: &str, left: ParseNode, right: ParseNode) -> ParseNode {
    ParseNode {
        token: Token {
            kind,
            value: op.to_string(),
        },
        children: vec![left, right],
    }
}

fn fold_logical(first: ParseNode, rest: Vec<(&str, ParseNode)>) -> ParseNode {
    rest.into_iter()
        .fold(first, |left, (op, right)| binary(TokenKind::Logical, op, left, right))
}

// or < and < not < comparison < primary
fn expression<'a>() -> impl Parser<'a, &'a str, ParseNode, Extra<'a>> {
    recursive(|expr| {
        // '' is an escaped quote inside the literal
        let string = just('\'')
            .then(choice((just("''").ignored(), none_of("'").ignored())).repeated())
            .then(just('\''))
            .to_slice()
            .map(|s: &str| ParseNode::leaf(TokenKind::StringLiteral, s));

        let number = just('-')
            .or_not()
            .then(text::digits(10))
            .then(just('.').then(text::digits(10)).or_not())
            .to_slice()
            .map(|s: &str| ParseNode::leaf(TokenKind::Number, s));

        let call = word()
            .then(
                expr.clone()
                    .separated_by(just(',').padded())
                    .collect::<Vec<_>>()
                    .delimited_by(just('(').padded(), just(')')),
            )
            .map(|(name, children): (&str, Vec<ParseNode>)| ParseNode {
                token: Token {
                    kind: TokenKind::Function,
                    value: name.to_string(),
                },
                children,
            });

        let name = word().map(|w: &str| match w {
            "true" | "false" => ParseNode::leaf(TokenKind::Boolean, w),
            "null" => ParseNode::leaf(TokenKind::Null, w),
            _ => ParseNode::leaf(TokenKind::Property, w),
        });

        let group = expr.delimited_by(just('(').padded(), just(')'));

        let primary = choice((group, string, number, call, name)).padded().boxed();

        let comparison_op = word()
            .filter(|w: &&str| COMPARISONS.contains(w))
            .padded();
        let comparison = primary
            .clone()
            .then(comparison_op.then(primary).or_not())
            .map(|(left, rest)| match rest {
                Some((op, right)) => binary(TokenKind::Comparison, op, left, right),
                None => left,
            });

        let unary = keyword("not")
            .repeated()
            .collect::<Vec<_>>()
            .then(comparison)
            .map(|(nots, operand): (Vec<&str>, ParseNode)| {
                nots.into_iter().rev().fold(operand, |inner, op| ParseNode {
                    token: Token {
                        kind: TokenKind::Logical,
                        value: op.to_string(),
                    },
                    children: vec![inner],
                })
            })
            .boxed();

        let and_expr = unary
            .clone()
            .then(keyword("and").then(unary).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_logical(first, rest))
            .boxed();

        and_expr
            .clone()
            .then(keyword("or").then(and_expr).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| fold_logical(first, rest))
    })
}

/// Parse a filter string into its expression tree.
pub fn parse(filter: &str) -> Result<ParseNode> {
    if filter.trim().is_empty() {
        return Err(IndexerError::Filter("empty filter".into()));
    }
    expression()
        .padded()
        .then_ignore(end())
        .parse(filter)
        .into_result()
        .map_err(|errs| {
            let reasons: Vec<String> = errs.iter().map(|e| e.to_string()).collect();
            IndexerError::Filter(format!("'{filter}': {}", reasons.join("; ")))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(node: &ParseNode) -> Vec<(TokenKind, String)> {
        let mut out = vec![(node.token.kind, node.token.value.clone())];
        for child in &node.children {
            out.extend(kinds(child));
        }
        out
    }

    #[test]
    fn test_parse_comparison() {
        let node = parse("on_premises_sam_account_name eq 'MrDootDoot'").unwrap();
        assert_eq!(
            kinds(&node),
            vec![
                (TokenKind::Comparison, "eq".to_string()),
                (TokenKind::Property, "on_premises_sam_account_name".to_string()),
                (TokenKind::StringLiteral, "'MrDootDoot'".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_function() {
        let node = parse("startswith(display_name,'Mr')").unwrap();
        assert_eq!(node.token.kind, TokenKind::Function);
        assert_eq!(node.token.value, "startswith");
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[1].token.value, "'Mr'");
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        let node = parse("a eq 1 or b eq 2 and c eq 3").unwrap();
        assert_eq!(node.token.value, "or");
        assert_eq!(node.children[0].token.value, "eq");
        assert_eq!(node.children[1].token.value, "and");
    }

    #[test]
    fn test_parentheses_and_not() {
        let node = parse("not (a eq 1 or b eq -2.5)").unwrap();
        assert_eq!(node.token.value, "not");
        assert_eq!(node.children[0].token.value, "or");
        assert_eq!(node.children[0].children[1].children[1].token.value, "-2.5");
    }

    #[test]
    fn test_escaped_quote_and_literals() {
        let node = parse("name eq 'O''Brien'").unwrap();
        assert_eq!(node.children[1].token.value, "'O''Brien'");

        let node = parse("enabled eq true").unwrap();
        assert_eq!(node.children[1].token.kind, TokenKind::Boolean);
        let node = parse("mail ne null").unwrap();
        assert_eq!(node.children[1].token.kind, TokenKind::Null);
    }

    #[test]
    fn test_keywords_need_word_boundaries() {
        let node = parse("order eq 'x' or  notes eq 'y'").unwrap();
        assert_eq!(node.token.value, "or");
        assert_eq!(node.children[0].children[0].token.value, "order");
        assert_eq!(node.children[1].children[0].token.value, "notes");

        let node = parse("startswith( display_name , 'Mr' )").unwrap();
        assert_eq!(node.children[0].token.kind, TokenKind::Property);
    }

    #[test]
    fn test_malformed_filters() {
        for bad in [
            "",
            "name eq 'open",
            "startswith(name, 'a'",
            "name eq",
            "(name eq 'a'",
            "name eq 'a' 'b'",
            "name # 'a'",
        ] {
            assert!(
                matches!(parse(bad), Err(IndexerError::Filter(_))),
                "{bad:?} should not parse"
            );
        }
    }
}
