//! XPath 1.0 values and their conversions.

use std::fmt;
use xform_tree::Navigator;

/// The result of evaluating an expression. Node-sets are kept in document
/// order without duplicates; a tree fragment is a node-set holding its root.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    NodeSet(Vec<Navigator>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Value {
    /// Coerces the value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }

    /// Coerces the value to a number as per XPath 1.0 rules.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::String(s) => string_to_number(s),
            Value::NodeSet(_) => string_to_number(&self.to_string()),
        }
    }

    pub fn is_node_set(&self) -> bool {
        matches!(self, Value::NodeSet(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::NodeSet(_) => "node-set",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    /// Coerces the value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::NodeSet(nodes) => match nodes.first() {
                Some(node) => f.write_str(&node.value()),
                None => Ok(()),
            },
            Value::String(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&number_to_string(*n)),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<Navigator>> for Value {
    fn from(nodes: Vec<Navigator>) -> Self {
        Value::NodeSet(nodes)
    }
}

/// Formats a number the way the XPath `string()` function does: integers
/// without a fraction, no exponent, `NaN` and `Infinity` spelled out.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        // also maps -0 to "0"
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// XML whitespace: space, tab, carriage return and line feed only.
pub fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Parses a string the way the XPath `number()` function does: optional
/// surrounding whitespace, an optional minus sign, digits with an optional
/// fraction. Anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(is_xml_whitespace);
    let digits = t.strip_prefix('-').unwrap_or(t);
    let well_formed = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && digits != ".";
    if well_formed {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(number_to_string(5.0), "5");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(2.5), "2.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 5 "), 5.0);
        assert_eq!(string_to_number("-1.5"), -1.5);
        assert_eq!(string_to_number(".5"), 0.5);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("+1").is_nan());
        assert!(string_to_number("").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert_eq!(string_to_number("\t7\r\n"), 7.0);
        assert!(string_to_number("\u{a0}5").is_nan());
    }

    #[test]
    fn test_boolean_coercion() {
        assert!(!Value::Number(f64::NAN).to_bool());
        assert!(Value::from("0").to_bool());
        assert!(!Value::NodeSet(Vec::new()).to_bool());
        assert_eq!(Value::Boolean(true).to_number(), 1.0);
    }
}
