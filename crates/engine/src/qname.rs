//! Qualified-name parsing for names written in stylesheet attributes and in
//! string arguments such as `key('p:k', ...)`.

use crate::error::NameError;
use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::{all_consuming, opt, recognize},
    sequence::{pair, terminated},
};
use xform_tree::{ExpandedName, XML_NAMESPACE};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

fn ncname(input: &str) -> IResult<&str, &str> {
    recognize(pair(take_while1(is_name_start), take_while(is_name_char))).parse(input)
}

fn qname(input: &str) -> IResult<&str, (Option<&str>, &str)> {
    pair(opt(terminated(ncname, char(':'))), ncname).parse(input)
}

pub fn is_ncname(text: &str) -> bool {
    all_consuming(ncname).parse(text).is_ok()
}

/// Splits `prefix:local` into its parts; the prefix is empty when absent.
pub fn split_qname(text: &str) -> Result<(&str, &str), NameError> {
    let trimmed = text.trim();
    match all_consuming(qname).parse(trimmed) {
        Ok((_, (prefix, local))) => Ok((prefix.unwrap_or(""), local)),
        Err(_) => Err(NameError::InvalidQName(text.to_string())),
    }
}

/// Resolves a lexical QName. Unprefixed names are in no namespace, as for
/// every XSLT name other than element names.
pub fn resolve_qname(
    text: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ExpandedName, NameError> {
    let (prefix, local) = split_qname(text)?;
    let namespace = match prefix {
        "" => String::new(),
        "xml" => XML_NAMESPACE.to_string(),
        p => lookup(p).ok_or_else(|| NameError::UndefinedPrefix(p.to_string()))?,
    };
    Ok(ExpandedName::new(namespace, local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("a:b").unwrap(), ("a", "b"));
        assert_eq!(split_qname(" local ").unwrap(), ("", "local"));
        assert!(split_qname("a:").is_err());
        assert!(split_qname("1abc").is_err());
        assert!(split_qname("a:b:c").is_err());
    }

    #[test]
    fn test_resolve_qname() {
        let lookup = |p: &str| (p == "e").then(|| "urn:e".to_string());
        assert_eq!(
            resolve_qname("e:name", lookup).unwrap(),
            ExpandedName::new("urn:e", "name")
        );
        assert_eq!(resolve_qname("name", lookup).unwrap(), ExpandedName::local("name"));
        assert_eq!(
            resolve_qname("z:name", lookup),
            Err(NameError::UndefinedPrefix("z".into()))
        );
    }

    #[test]
    fn test_ncname() {
        assert!(is_ncname("_a-b.c"));
        assert!(!is_ncname("a:b"));
        assert!(!is_ncname(""));
    }
}
