//! Namespace-qualified names.

use std::fmt;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// A name resolved against its namespace bindings: the namespace URI plus the
/// local part. Prefixes are lexical sugar and never take part in equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub namespace: String,
    pub local: String,
}

impl ExpandedName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new(String::new(), local)
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_clark_notation() {
        assert_eq!(ExpandedName::local("a").to_string(), "a");
        assert_eq!(ExpandedName::new("urn:x", "a").to_string(), "{urn:x}a");
    }

    #[test]
    fn equality_ignores_nothing_but_uri_and_local() {
        assert_eq!(ExpandedName::new("urn:x", "a"), ExpandedName::new("urn:x", "a"));
        assert_ne!(ExpandedName::new("urn:x", "a"), ExpandedName::local("a"));
    }
}
