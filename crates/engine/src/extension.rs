//! Host-provided extension functions.

use crate::error::RuntimeError;
use xform_tree::{Document, TreeBuilder};
use xform_xpath::Value;

pub const EXSLT_COMMON_NAMESPACE: &str = "http://exslt.org/common";

/// An object whose methods are callable from expressions as functions in the
/// namespace it is registered under.
pub trait ExtensionObject {
    /// Accepted argument counts of a method, or `None` if there is no method
    /// of that name.
    fn arity(&self, name: &str) -> Option<(usize, usize)>;

    fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError>;
}

/// The EXSLT common module: `node-set()` and `object-type()`.
#[derive(Debug, Default)]
pub struct ExsltCommon;

impl ExtensionObject for ExsltCommon {
    fn arity(&self, name: &str) -> Option<(usize, usize)> {
        matches!(name, "node-set" | "object-type").then_some((1, 1))
    }

    fn invoke(&self, name: &str, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
        let arg = args.pop().ok_or_else(|| RuntimeError::WrongArgumentCount {
            function: name.to_string(),
            count: 0,
        })?;
        match name {
            // Tree fragments already are node-sets holding their root.
            "node-set" => match arg {
                Value::NodeSet(nodes) => Ok(Value::NodeSet(nodes)),
                other => {
                    let mut builder = TreeBuilder::new("");
                    builder.text(&other.to_string())?;
                    let root = Document::root(&builder.finish()?);
                    Ok(Value::NodeSet(root.children()))
                }
            },
            "object-type" => Ok(Value::String(arg.type_name().to_string())),
            other => Err(RuntimeError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_set_wraps_strings_in_text_nodes() {
        let value = ExsltCommon.invoke("node-set", vec![Value::from("abc")]).unwrap();
        match value {
            Value::NodeSet(nodes) => {
                assert_eq!(nodes.len(), 1);
                assert_eq!(nodes[0].value(), "abc");
            }
            other => panic!("Expected node-set, got {:?}", other),
        }
    }

    #[test]
    fn test_object_type() {
        assert_eq!(
            ExsltCommon.invoke("object-type", vec![Value::Number(1.0)]).unwrap(),
            Value::from("number")
        );
        assert_eq!(ExsltCommon.arity("missing"), None);
    }
}
