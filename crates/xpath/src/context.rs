//! The evaluation focus and the host context trait.

use crate::error::XPathError;
use crate::value::Value;
use std::collections::HashMap;
use xform_tree::{ExpandedName, Navigator};

/// The node being evaluated plus its position and the size of the node list
/// it was taken from (both 1-based, as `position()` and `last()` report them).
#[derive(Debug, Clone)]
pub struct Focus {
    pub node: Navigator,
    pub position: usize,
    pub size: usize,
}

impl Focus {
    pub fn new(node: Navigator) -> Self {
        Self {
            node,
            position: 1,
            size: 1,
        }
    }

    pub fn at(node: Navigator, position: usize, size: usize) -> Self {
        Self { node, position, size }
    }
}

/// Everything an expression needs from its host beyond the core library.
///
/// The associated error type lets a host carry its own error taxonomy
/// through evaluation: evaluation errors of the query service convert into
/// it, and host errors come back out unchanged.
pub trait XsltContext {
    type Error: From<XPathError>;

    /// Returns the value bound to a variable or parameter reference.
    fn variable(&self, name: &ExpandedName) -> Result<Value, Self::Error>;

    /// Invokes a function the core library does not define. `prefix` is the
    /// lexical prefix as written, for error messages.
    fn function(
        &self,
        name: &ExpandedName,
        prefix: &str,
        args: Vec<Value>,
        focus: &Focus,
    ) -> Result<Value, Self::Error>;
}

/// A context with a fixed set of variables and no extra functions. Useful for
/// evaluating standalone expressions.
#[derive(Debug, Default)]
pub struct StaticContext {
    pub variables: HashMap<ExpandedName, Value>,
}

impl StaticContext {
    pub fn with_variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(ExpandedName::local(name), value.into());
        self
    }
}

impl XsltContext for StaticContext {
    type Error = XPathError;

    fn variable(&self, name: &ExpandedName) -> Result<Value, XPathError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| XPathError::TypeError(format!("Variable '{}' not found", name)))
    }

    fn function(
        &self,
        name: &ExpandedName,
        _prefix: &str,
        _args: Vec<Value>,
        _focus: &Focus,
    ) -> Result<Value, XPathError> {
        Err(XPathError::function(&name.to_string(), "unknown function"))
    }
}
