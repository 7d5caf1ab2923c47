//! Attribute value templates: literal text with `{expression}` holes and
//! `{{` / `}}` escapes.

use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::stylesheet::QueryKey;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{is_not, tag, take_while},
    character::complete::{char, none_of},
    combinator::{all_consuming, map, recognize, value},
    multi::{many0, many1},
    sequence::delimited,
};

#[derive(Debug, Clone, PartialEq)]
pub enum AvtPart {
    Literal(String),
    Expression(QueryKey),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Avt {
    pub parts: Vec<AvtPart>,
}

#[derive(Debug, PartialEq)]
enum RawPart<'a> {
    Literal(String),
    Expression(&'a str),
}

fn literal(input: &str) -> IResult<&str, RawPart<'_>> {
    map(
        many1(alt((value('{', tag("{{")), value('}', tag("}}")), none_of("{}")))),
        |chars: Vec<char>| RawPart::Literal(chars.into_iter().collect()),
    )
    .parse(input)
}

fn single_quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('\''), take_while(|c: char| c != '\''), char('\''))).parse(input)
}

fn double_quoted(input: &str) -> IResult<&str, &str> {
    recognize(delimited(char('"'), take_while(|c: char| c != '"'), char('"'))).parse(input)
}

fn expression(input: &str) -> IResult<&str, RawPart<'_>> {
    map(
        delimited(
            char('{'),
            recognize(many0(alt((double_quoted, single_quoted, is_not("}\"'"))))),
            char('}'),
        ),
        RawPart::Expression,
    )
    .parse(input)
}

fn parse_parts(input: &str) -> Option<Vec<RawPart<'_>>> {
    all_consuming(many0(alt((literal, expression))))
        .parse(input)
        .ok()
        .map(|(_, parts)| parts)
}

impl Avt {
    pub(crate) fn compile(compiler: &mut Compiler, text: &str) -> Result<Self, CompileError> {
        let raw = parse_parts(text).ok_or_else(|| CompileError::InvalidAvt(text.to_string()))?;
        let mut parts = Vec::with_capacity(raw.len());
        for part in raw {
            parts.push(match part {
                RawPart::Literal(s) => AvtPart::Literal(s),
                RawPart::Expression(expr) => AvtPart::Expression(compiler.add_query(expr)?),
            });
        }
        Ok(Self { parts })
    }

    /// The literal value when the template has no expressions.
    pub fn as_literal(&self) -> Option<String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                AvtPart::Literal(s) => out.push_str(s),
                AvtPart::Expression(_) => return None,
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parts() {
        assert_eq!(
            parse_parts("a{b}c").unwrap(),
            vec![
                RawPart::Literal("a".into()),
                RawPart::Expression("b"),
                RawPart::Literal("c".into())
            ]
        );
        assert_eq!(parse_parts("{{x}}").unwrap(), vec![RawPart::Literal("{x}".into())]);
        assert_eq!(
            parse_parts("{concat('}', \"{\")}").unwrap(),
            vec![RawPart::Expression("concat('}', \"{\")")]
        );
        assert!(parse_parts("").unwrap().is_empty());
    }

    #[test]
    fn test_unbalanced_braces_are_rejected() {
        assert!(parse_parts("a}b").is_none());
        assert!(parse_parts("{open").is_none());
    }
}
