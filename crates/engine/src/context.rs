//! Bridges expression evaluation back into interpreter state: variables,
//! the current node, key tables, decimal formats, documents and extension
//! functions.

use crate::decimal_format::DecimalFormat;
use crate::error::RuntimeError;
use crate::frame::ActivationFrame;
use crate::output::RecordOutput;
use crate::processor::Processor;
use crate::qname::{XSLT_NAMESPACE, resolve_qname, split_qname};
use crate::stylesheet::CompiledQuery;
use xform_tree::{ExpandedName, Navigator};
use xform_xpath::functions::is_core_function;
use xform_xpath::{Focus, Value, XsltContext};

/// XSLT additions to the core function library, with their argument bounds.
const XSLT_FUNCTIONS: &[(&str, usize, usize)] = &[
    ("current", 0, 0),
    ("generate-id", 0, 1),
    ("system-property", 1, 1),
    ("element-available", 1, 1),
    ("function-available", 1, 1),
    ("document", 1, 2),
    ("key", 2, 2),
    ("format-number", 2, 3),
    ("unparsed-entity-uri", 1, 1),
];

/// Instructions this engine implements, as reported by `element-available`.
const INSTRUCTIONS: &[&str] = &[
    "apply-templates",
    "call-template",
    "copy",
    "copy-of",
    "value-of",
    "text",
    "variable",
    "if",
];

pub const VENDOR: &str = env!("CARGO_PKG_NAME");
pub const VENDOR_URL: &str = env!("CARGO_PKG_REPOSITORY");

pub struct ExpressionContext<'p, 's, O: RecordOutput> {
    processor: &'p Processor<'s, O>,
    frame: Option<&'p ActivationFrame<'s>>,
    current: Navigator,
    query: &'p CompiledQuery,
}

impl<'p, 's, O: RecordOutput> ExpressionContext<'p, 's, O> {
    /// `frame` is the frame evaluating the query; without one only global
    /// variables are visible.
    pub fn new(
        processor: &'p Processor<'s, O>,
        frame: Option<&'p ActivationFrame<'s>>,
        current: Navigator,
        query: &'p CompiledQuery,
    ) -> Self {
        Self {
            processor,
            frame,
            current,
            query,
        }
    }

    /// Resolves a QName passed as a string, using the bindings in scope where
    /// the expression was written.
    fn resolve(&self, text: &str) -> Result<ExpandedName, RuntimeError> {
        Ok(resolve_qname(text, |prefix| self.query.lookup_namespace(prefix))?)
    }

    fn xslt_function(&self, name: &str, args: Vec<Value>, focus: &Focus) -> Result<Value, RuntimeError> {
        let Some(&(_, min, max)) = XSLT_FUNCTIONS.iter().find(|(n, _, _)| *n == name) else {
            return Err(RuntimeError::UnknownFunction(name.to_string()));
        };
        check_arity(name, min, max, args.len())?;
        match name {
            "current" => Ok(Value::NodeSet(vec![self.current.clone()])),
            "generate-id" => Ok(Value::String(match args.first() {
                Some(Value::NodeSet(nodes)) => nodes.first().map(Navigator::unique_id).unwrap_or_default(),
                Some(other) => return Err(node_set_expected(name, other)),
                None => focus.node.unique_id(),
            })),
            "system-property" => {
                let property = self.resolve(&args[0].to_string())?;
                Ok(system_property(&property))
            }
            "element-available" => {
                let element = self.resolve(&args[0].to_string())?;
                Ok(Value::Boolean(
                    element.namespace == XSLT_NAMESPACE && INSTRUCTIONS.contains(&element.local.as_str()),
                ))
            }
            "function-available" => self.function_available(&args[0].to_string()),
            "document" => Ok(Value::NodeSet(self.document(&args[0]))),
            "key" => self.key(&args[0].to_string(), &args[1], focus),
            "format-number" => {
                let format_name = match args.get(2) {
                    Some(arg) => self.resolve(&arg.to_string())?,
                    None => ExpandedName::default(),
                };
                let pattern = args[1].to_string();
                let number = args[0].to_number();
                let formatted = match self.processor.stylesheet().decimal_format(&format_name) {
                    Some(format) => format.format(number, &pattern)?,
                    None if format_name.is_empty() => DecimalFormat::default().format(number, &pattern)?,
                    None => return Err(RuntimeError::UnknownDecimalFormat(format_name.to_string())),
                };
                Ok(Value::String(formatted))
            }
            // Without a DTD there are no unparsed entities.
            _ => Ok(Value::String(String::new())),
        }
    }

    fn function_available(&self, text: &str) -> Result<Value, RuntimeError> {
        let (prefix, local) = split_qname(text)?;
        if prefix.is_empty() {
            let known = is_core_function(local) || XSLT_FUNCTIONS.iter().any(|(n, _, _)| *n == local);
            return Ok(Value::Boolean(known));
        }
        let name = self.resolve(text)?;
        let available = self
            .processor
            .extension(&name.namespace)
            .is_some_and(|object| object.arity(&name.local).is_some());
        Ok(Value::Boolean(available))
    }

    fn document(&self, arg: &Value) -> Vec<Navigator> {
        let uris: Vec<String> = match arg {
            Value::NodeSet(nodes) => nodes.iter().map(Navigator::value).collect(),
            other => vec![other.to_string()],
        };
        let mut roots: Vec<Navigator> = uris
            .iter()
            .filter_map(|uri| {
                let found = self.processor.document(uri.trim());
                if found.is_none() {
                    log::debug!("document('{}') is not registered", uri);
                }
                found
            })
            .collect();
        roots.sort();
        roots.dedup();
        roots
    }

    fn key(&self, name: &str, value: &Value, focus: &Focus) -> Result<Value, RuntimeError> {
        let name = self.resolve(name)?;
        let table = self.processor.key_table(&name, &focus.node)?;
        let values: Vec<String> = match value {
            Value::NodeSet(nodes) => nodes.iter().map(Navigator::value).collect(),
            other => vec![other.to_string()],
        };
        let mut nodes: Vec<Navigator> = values
            .iter()
            .filter_map(|v| table.get(v))
            .flatten()
            .cloned()
            .collect();
        if values.len() > 1 {
            nodes.sort();
            nodes.dedup();
        }
        Ok(Value::NodeSet(nodes))
    }
}

impl<O: RecordOutput> XsltContext for ExpressionContext<'_, '_, O> {
    type Error = RuntimeError;

    fn variable(&self, name: &ExpandedName) -> Result<Value, RuntimeError> {
        self.processor.get_variable_value(self.frame, name)
    }

    fn function(&self, name: &ExpandedName, prefix: &str, args: Vec<Value>, focus: &Focus) -> Result<Value, RuntimeError> {
        if name.namespace.is_empty() {
            return self.xslt_function(&name.local, args, focus);
        }
        let lexical = format!("{}:{}", prefix, name.local);
        let object = self
            .processor
            .extension(&name.namespace)
            .ok_or_else(|| RuntimeError::UnknownExtensionNamespace(prefix.to_string()))?;
        let (min, max) = object
            .arity(&name.local)
            .ok_or_else(|| RuntimeError::UnknownFunction(lexical.clone()))?;
        check_arity(&lexical, min, max, args.len())?;
        object.invoke(&name.local, args)
    }
}

fn check_arity(function: &str, min: usize, max: usize, count: usize) -> Result<(), RuntimeError> {
    if count < min || count > max {
        return Err(RuntimeError::WrongArgumentCount {
            function: function.to_string(),
            count,
        });
    }
    Ok(())
}

fn node_set_expected(function: &str, value: &Value) -> RuntimeError {
    RuntimeError::Conversion {
        value: format!("{} argument of {}()", value.type_name(), function),
        target: "node-set".into(),
    }
}

fn system_property(name: &ExpandedName) -> Value {
    if name.namespace != XSLT_NAMESPACE {
        return Value::String(String::new());
    }
    match name.local.as_str() {
        "version" => Value::Number(1.0),
        "vendor" => Value::String(VENDOR.into()),
        "vendor-url" => Value::String(VENDOR_URL.into()),
        _ => Value::String(String::new()),
    }
}
