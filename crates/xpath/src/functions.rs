//! The XPath 1.0 core function library.

use crate::context::Focus;
use crate::error::XPathError;
use crate::value::{Value, is_xml_whitespace, string_to_number};
use xform_tree::{Navigator, NodeType, XML_NAMESPACE};

/// Name, minimum and maximum argument count of every core function.
pub const CORE_FUNCTIONS: &[(&str, usize, usize)] = &[
    ("last", 0, 0),
    ("position", 0, 0),
    ("count", 1, 1),
    ("id", 1, 1),
    ("local-name", 0, 1),
    ("namespace-uri", 0, 1),
    ("name", 0, 1),
    ("string", 0, 1),
    ("concat", 2, usize::MAX),
    ("starts-with", 2, 2),
    ("contains", 2, 2),
    ("substring-before", 2, 2),
    ("substring-after", 2, 2),
    ("substring", 2, 3),
    ("string-length", 0, 1),
    ("normalize-space", 0, 1),
    ("translate", 3, 3),
    ("boolean", 1, 1),
    ("not", 1, 1),
    ("true", 0, 0),
    ("false", 0, 0),
    ("lang", 1, 1),
    ("number", 0, 1),
    ("sum", 1, 1),
    ("floor", 1, 1),
    ("ceiling", 1, 1),
    ("round", 1, 1),
];

pub fn is_core_function(name: &str) -> bool {
    CORE_FUNCTIONS.iter().any(|(n, _, _)| *n == name)
}

/// Evaluates a core function after checking its argument count.
pub fn evaluate_core(name: &str, args: Vec<Value>, focus: &Focus) -> Result<Value, XPathError> {
    let Some(&(_, min, max)) = CORE_FUNCTIONS.iter().find(|(n, _, _)| *n == name) else {
        return Err(XPathError::function(name, "not a core function"));
    };
    if args.len() < min || args.len() > max {
        return Err(XPathError::function(
            name,
            format!("expected {} argument(s), got {}", arity_text(min, max), args.len()),
        ));
    }
    dispatch(name, args, focus)
}

fn arity_text(min: usize, max: usize) -> String {
    if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("at least {}", min)
    } else {
        format!("{} to {}", min, max)
    }
}

fn dispatch(name: &str, mut args: Vec<Value>, focus: &Focus) -> Result<Value, XPathError> {
    let value = match name {
        "last" => Value::Number(focus.size as f64),
        "position" => Value::Number(focus.position as f64),
        "count" => Value::Number(node_set_arg(name, &args, 0)?.len() as f64),
        "id" => Value::NodeSet(func_id(&args[0], &focus.node)),
        "local-name" | "namespace-uri" | "name" => {
            let node = match args.first() {
                Some(_) => node_set_arg(name, &args, 0)?.first().cloned(),
                None => Some(focus.node.clone()),
            };
            Value::String(node.map(|n| node_name(name, &n)).unwrap_or_default())
        }
        "string" => Value::String(string_arg(&args, 0, focus)),
        "concat" => Value::String(args.iter().map(|a| a.to_string()).collect()),
        "starts-with" => Value::Boolean(args[0].to_string().starts_with(&args[1].to_string())),
        "contains" => Value::Boolean(args[0].to_string().contains(&args[1].to_string())),
        "substring-before" => {
            let (s, pat) = (args[0].to_string(), args[1].to_string());
            Value::String(s.find(&pat).map(|i| s[..i].to_string()).unwrap_or_default())
        }
        "substring-after" => {
            let (s, pat) = (args[0].to_string(), args[1].to_string());
            Value::String(
                s.find(&pat)
                    .map(|i| s[i + pat.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        "substring" => {
            let s = args[0].to_string();
            let start = xpath_round(args[1].to_number());
            let end = match args.get(2) {
                Some(len) => start + xpath_round(len.to_number()),
                None => f64::INFINITY,
            };
            let result: String = s
                .chars()
                .enumerate()
                .filter(|(i, _)| {
                    let p = (*i + 1) as f64;
                    p >= start && p < end
                })
                .map(|(_, c)| c)
                .collect();
            Value::String(result)
        }
        "string-length" => Value::Number(string_arg(&args, 0, focus).chars().count() as f64),
        "normalize-space" => Value::String(
            string_arg(&args, 0, focus)
                .split(is_xml_whitespace)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "translate" => {
            let from: Vec<char> = args[1].to_string().chars().collect();
            let to: Vec<char> = args[2].to_string().chars().collect();
            let translated = args[0]
                .to_string()
                .chars()
                .filter_map(|c| match from.iter().position(|&f| f == c) {
                    Some(i) => to.get(i).copied(),
                    None => Some(c),
                })
                .collect();
            Value::String(translated)
        }
        "boolean" => Value::Boolean(args[0].to_bool()),
        "not" => Value::Boolean(!args[0].to_bool()),
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "lang" => Value::Boolean(func_lang(&args[0].to_string(), &focus.node)),
        "number" => match args.pop() {
            Some(v) => Value::Number(v.to_number()),
            None => Value::Number(string_to_number(&focus.node.value())),
        },
        "sum" => Value::Number(
            node_set_arg(name, &args, 0)?
                .iter()
                .map(|n| string_to_number(&n.value()))
                .sum(),
        ),
        "floor" => Value::Number(args[0].to_number().floor()),
        "ceiling" => Value::Number(args[0].to_number().ceil()),
        "round" => Value::Number(xpath_round(args[0].to_number())),
        other => return Err(XPathError::function(other, "not a core function")),
    };
    Ok(value)
}

fn node_set_arg<'v>(function: &str, args: &'v [Value], index: usize) -> Result<&'v [Navigator], XPathError> {
    match args.get(index) {
        Some(Value::NodeSet(nodes)) => Ok(nodes),
        Some(other) => Err(XPathError::TypeError(format!(
            "{}() expects a node-set, got a {}",
            function,
            other.type_name()
        ))),
        None => Err(XPathError::function(function, "missing node-set argument")),
    }
}

fn string_arg(args: &[Value], index: usize, focus: &Focus) -> String {
    match args.get(index) {
        Some(v) => v.to_string(),
        None => focus.node.value(),
    }
}

fn node_name(function: &str, node: &Navigator) -> String {
    let named = matches!(
        node.node_type(),
        NodeType::Element | NodeType::Attribute | NodeType::ProcessingInstruction | NodeType::Namespace
    );
    if !named {
        return String::new();
    }
    match function {
        "local-name" => node.local_name().to_string(),
        "namespace-uri" => node.namespace_uri().to_string(),
        _ => node.name(),
    }
}

/// XPath rounding: halves go towards positive infinity.
fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else if (-0.5..0.0).contains(&n) {
        -0.0
    } else {
        (n + 0.5).floor()
    }
}

/// Without a DTD the only ID-typed attributes are `xml:id`.
fn func_id(arg: &Value, context: &Navigator) -> Vec<Navigator> {
    let tokens: Vec<String> = match arg {
        Value::NodeSet(nodes) => nodes
            .iter()
            .flat_map(|n| {
                n.value()
                    .split(is_xml_whitespace)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect(),
        other => other
            .to_string()
            .split(is_xml_whitespace)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    };
    if tokens.is_empty() {
        return Vec::new();
    }
    context
        .root()
        .descendants()
        .into_iter()
        .filter(|n| n.is_element())
        .filter(|n| {
            n.attributes().iter().any(|a| {
                a.local_name() == "id"
                    && a.namespace_uri() == XML_NAMESPACE
                    && tokens.iter().any(|t| *t == a.value())
            })
        })
        .collect()
}

fn func_lang(lang: &str, context: &Navigator) -> bool {
    let mut node = context.clone();
    loop {
        let declared = node
            .attributes()
            .into_iter()
            .find(|a| a.local_name() == "lang" && a.namespace_uri() == XML_NAMESPACE);
        if let Some(attr) = declared {
            let value = attr.value().to_ascii_lowercase();
            let wanted = lang.to_ascii_lowercase();
            return value == wanted || value.starts_with(&format!("{}-", wanted));
        }
        if !node.move_to_parent() {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xform_tree::Document;

    fn call(name: &str, args: Vec<Value>) -> Value {
        let root = Document::parse("<r/>", "").unwrap();
        evaluate_core(name, args, &Focus::new(root)).unwrap()
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("substring", vec!["12345".into(), 1.5.into(), 2.6.into()]), Value::from("234"));
        assert_eq!(call("substring", vec!["12345".into(), 0.0.into(), 3.0.into()]), Value::from("12"));
        assert_eq!(call("substring-after", vec!["1999/04/01".into(), "/".into()]), Value::from("04/01"));
        assert_eq!(call("translate", vec!["--aaa--".into(), "abc-".into(), "ABC".into()]), Value::from("AAA"));
        assert_eq!(call("normalize-space", vec!["  a  b ".into()]), Value::from("a b"));
        assert_eq!(call("normalize-space", vec!["\ta\r\n\nb\n".into()]), Value::from("a b"));
        assert_eq!(
            call("normalize-space", vec!["\u{a0}a\u{a0} \u{2003}b".into()]),
            Value::from("\u{a0}a\u{a0} \u{2003}b")
        );
        assert_eq!(call("concat", vec!["a".into(), 1.0.into(), true.into()]), Value::from("a1true"));
    }

    #[test]
    fn test_numeric_functions() {
        assert_eq!(call("round", vec![2.5.into()]), Value::Number(3.0));
        assert_eq!(call("round", vec![(-2.5).into()]), Value::Number(-2.0));
        assert_eq!(call("floor", vec![(-1.5).into()]), Value::Number(-2.0));
    }

    #[test]
    fn test_arity_is_checked() {
        let root = Document::parse("<r/>", "").unwrap();
        let result = evaluate_core("true", vec![Value::Boolean(true)], &Focus::new(root));
        assert!(matches!(result, Err(XPathError::FunctionError { .. })));
    }

    #[test]
    fn test_non_core_function_is_not_handled() {
        assert!(!is_core_function("key"));
        let root = Document::parse("<r/>", "").unwrap();
        assert!(evaluate_core("key", vec![], &Focus::new(root)).is_err());
    }

    #[test]
    fn test_id_only_sees_xml_id() {
        let root = Document::parse(r#"<r><a xml:id="x1"/><b id="x2"/><c xml:id="x2"/></r>"#, "").unwrap();
        let focus = Focus::new(root);
        let names = |value: Value| match value {
            Value::NodeSet(nodes) => nodes.iter().map(|n| n.local_name().to_string()).collect::<Vec<_>>(),
            other => panic!("expected a node-set, got {:?}", other),
        };
        assert_eq!(names(evaluate_core("id", vec!["x1".into()], &focus).unwrap()), vec!["a"]);
        assert_eq!(names(evaluate_core("id", vec!["x2 missing".into()], &focus).unwrap()), vec!["c"]);
    }

    #[test]
    fn test_lang_walks_ancestors() {
        let root = Document::parse(r#"<r xml:lang="en-GB"><p/></r>"#, "").unwrap();
        let p = root.descendants().into_iter().find(|n| n.local_name() == "p").unwrap();
        let focus = Focus::new(p);
        assert_eq!(evaluate_core("lang", vec!["en".into()], &focus).unwrap(), Value::Boolean(true));
        assert_eq!(evaluate_core("lang", vec!["fr".into()], &focus).unwrap(), Value::Boolean(false));
    }
}
