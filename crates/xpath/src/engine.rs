//! The evaluation engine for executing a parsed XPath AST against a navigator.

use crate::ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, PathStart, Step};
use crate::axes;
use crate::context::{Focus, XsltContext};
use crate::error::XPathError;
use crate::functions;
use crate::value::{Value, string_to_number};
use xform_tree::{Navigator, NodeType};

/// Evaluates an expression. Errors raised by the context come back unchanged.
pub fn evaluate<C: XsltContext + ?Sized>(expr: &Expression, focus: &Focus, ctx: &C) -> Result<Value, C::Error> {
    match expr {
        Expression::Literal(s) => Ok(Value::String(s.clone())),
        Expression::Number(n) => Ok(Value::Number(*n)),
        Expression::Variable(name) => ctx.variable(&name.expanded()),
        Expression::FunctionCall { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, focus, ctx)?);
            }
            if name.namespace.is_empty() && functions::is_core_function(&name.local) {
                return Ok(functions::evaluate_core(&name.local, values, focus)?);
            }
            ctx.function(&name.expanded(), &name.prefix, values, focus)
        }
        Expression::Negate(inner) => Ok(Value::Number(-evaluate(inner, focus, ctx)?.to_number())),
        Expression::Binary { op, left, right } => evaluate_binary(*op, left, right, focus, ctx),
        Expression::Filter { primary, predicates } => {
            let nodes = node_set::<C::Error>(evaluate(primary, focus, ctx)?)?;
            Ok(Value::NodeSet(apply_predicates(nodes, predicates, ctx)?))
        }
        Expression::Path(path) => Ok(Value::NodeSet(evaluate_path(path, focus, ctx)?)),
    }
}

fn node_set<E: From<XPathError>>(value: Value) -> Result<Vec<Navigator>, E> {
    match value {
        Value::NodeSet(nodes) => Ok(nodes),
        other => Err(XPathError::TypeError(format!(
            "expected a node-set, got a {}",
            other.type_name()
        ))
        .into()),
    }
}

fn evaluate_binary<C: XsltContext + ?Sized>(
    op: BinaryOperator,
    left: &Expression,
    right: &Expression,
    focus: &Focus,
    ctx: &C,
) -> Result<Value, C::Error> {
    match op {
        BinaryOperator::Or => {
            if evaluate(left, focus, ctx)?.to_bool() {
                return Ok(Value::Boolean(true));
            }
            Ok(Value::Boolean(evaluate(right, focus, ctx)?.to_bool()))
        }
        BinaryOperator::And => {
            if !evaluate(left, focus, ctx)?.to_bool() {
                return Ok(Value::Boolean(false));
            }
            Ok(Value::Boolean(evaluate(right, focus, ctx)?.to_bool()))
        }
        BinaryOperator::Union => {
            let mut nodes = node_set::<C::Error>(evaluate(left, focus, ctx)?)?;
            nodes.extend(node_set::<C::Error>(evaluate(right, focus, ctx)?)?);
            nodes.sort();
            nodes.dedup();
            Ok(Value::NodeSet(nodes))
        }
        BinaryOperator::Equals
        | BinaryOperator::NotEquals
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => {
            let l = evaluate(left, focus, ctx)?;
            let r = evaluate(right, focus, ctx)?;
            Ok(Value::Boolean(compare(op, &l, &r)))
        }
        _ => {
            let l = evaluate(left, focus, ctx)?.to_number();
            let r = evaluate(right, focus, ctx)?.to_number();
            let n = match op {
                BinaryOperator::Plus => l + r,
                BinaryOperator::Minus => l - r,
                BinaryOperator::Multiply => l * r,
                BinaryOperator::Divide => l / r,
                // Rust's % truncates like XPath's mod.
                _ => l % r,
            };
            Ok(Value::Number(n))
        }
    }
}

/// XPath 1.0 comparison, including the existential rules for node-sets.
fn compare(op: BinaryOperator, left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::NodeSet(l), Value::NodeSet(r)) => l.iter().any(|a| {
            let a = a.value();
            r.iter()
                .any(|b| compare_atomic(op, &Value::String(a.clone()), &Value::String(b.value())))
        }),
        (Value::NodeSet(nodes), Value::Boolean(_)) => {
            compare_atomic(op, &Value::Boolean(!nodes.is_empty()), right)
        }
        (Value::Boolean(_), Value::NodeSet(nodes)) => {
            compare_atomic(op, left, &Value::Boolean(!nodes.is_empty()))
        }
        (Value::NodeSet(nodes), other) => nodes
            .iter()
            .any(|n| compare_atomic(op, &atomize(n, other), other)),
        (other, Value::NodeSet(nodes)) => nodes
            .iter()
            .any(|n| compare_atomic(op, other, &atomize(n, other))),
        _ => compare_atomic(op, left, right),
    }
}

/// Converts a node to the type of the value it is compared against.
fn atomize(node: &Navigator, like: &Value) -> Value {
    match like {
        Value::Number(_) => Value::Number(string_to_number(&node.value())),
        _ => Value::String(node.value()),
    }
}

fn compare_atomic(op: BinaryOperator, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOperator::Equals | BinaryOperator::NotEquals => {
            let equal = match (left, right) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => left.to_bool() == right.to_bool(),
                (Value::Number(_), _) | (_, Value::Number(_)) => left.to_number() == right.to_number(),
                _ => left.to_string() == right.to_string(),
            };
            (op == BinaryOperator::Equals) == equal
        }
        _ => {
            let (l, r) = (left.to_number(), right.to_number());
            match op {
                BinaryOperator::LessThan => l < r,
                BinaryOperator::LessThanOrEqual => l <= r,
                BinaryOperator::GreaterThan => l > r,
                _ => l >= r,
            }
        }
    }
}

pub(crate) fn evaluate_path<C: XsltContext + ?Sized>(
    path: &LocationPath,
    focus: &Focus,
    ctx: &C,
) -> Result<Vec<Navigator>, C::Error> {
    let mut current = match &path.start {
        PathStart::Root => vec![focus.node.root()],
        PathStart::Context => vec![focus.node.clone()],
        PathStart::Expression(expr) => node_set::<C::Error>(evaluate(expr, focus, ctx)?)?,
    };
    for step in &path.steps {
        current = evaluate_step(step, &current, ctx)?;
    }
    Ok(current)
}

fn evaluate_step<C: XsltContext + ?Sized>(
    step: &Step,
    context: &[Navigator],
    ctx: &C,
) -> Result<Vec<Navigator>, C::Error> {
    let mut result = Vec::new();
    for node in context {
        let candidates: Vec<Navigator> = axes::collect(step.axis, node)
            .into_iter()
            .filter(|n| matches_test(&step.test, step.axis, n))
            .collect();
        // Positions in predicates follow axis order, so filter per context node.
        result.extend(apply_predicates(candidates, &step.predicates, ctx)?);
    }
    if context.len() > 1 || step.axis.is_reverse() {
        result.sort();
        result.dedup();
    }
    Ok(result)
}

fn apply_predicates<C: XsltContext + ?Sized>(
    mut nodes: Vec<Navigator>,
    predicates: &[Expression],
    ctx: &C,
) -> Result<Vec<Navigator>, C::Error> {
    for predicate in predicates {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus::at(node, i + 1, size);
            let keep = match evaluate(predicate, &focus, ctx)? {
                Value::Number(n) => n == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(focus.node);
            }
        }
        nodes = kept;
    }
    Ok(nodes)
}

pub(crate) fn matches_test(test: &NodeTest, axis: Axis, node: &Navigator) -> bool {
    let principal = match axis {
        Axis::Attribute => NodeType::Attribute,
        Axis::Namespace => NodeType::Namespace,
        _ => NodeType::Element,
    };
    match test {
        NodeTest::Node => true,
        NodeTest::Text => node.node_type() == NodeType::Text,
        NodeTest::Comment => node.node_type() == NodeType::Comment,
        NodeTest::ProcessingInstruction(target) => {
            node.node_type() == NodeType::ProcessingInstruction
                && target.as_deref().is_none_or(|t| t == node.local_name())
        }
        NodeTest::AnyName => node.node_type() == principal,
        NodeTest::NamespaceAny { namespace, .. } => {
            node.node_type() == principal && node.namespace_uri() == namespace
        }
        NodeTest::Name(name) => {
            node.node_type() == principal
                && node.local_name() == name.local
                && node.namespace_uri() == name.namespace
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::parser::parse_expression;
    use xform_tree::Document;

    const DOC: &str = r#"<library>
        <book id="b1" year="1999"><title>Alpha</title><price>10</price></book>
        <book id="b2" year="2005"><title>Beta</title><price>25.5</price></book>
        <book id="b3" year="2010"><title>Gamma</title><price>7</price></book>
    </library>"#;

    fn eval(xpath: &str) -> Value {
        let root = Document::parse(DOC, "").unwrap();
        let ctx = StaticContext::default().with_variable("limit", 9.0);
        let expr = parse_expression(xpath).unwrap();
        evaluate(&expr, &Focus::new(root), &ctx).unwrap()
    }

    fn strings(value: Value) -> Vec<String> {
        match value {
            Value::NodeSet(nodes) => nodes.iter().map(|n| n.value()).collect(),
            other => panic!("Expected node-set, got {:?}", other),
        }
    }

    #[test]
    fn test_paths_and_predicates() {
        assert_eq!(strings(eval("/library/book[2]/title")), vec!["Beta"]);
        assert_eq!(strings(eval("//book[price > $limit]/title")), vec!["Alpha", "Beta"]);
        assert_eq!(strings(eval("//book[last()]/@id")), vec!["b3"]);
        assert_eq!(strings(eval("//title[. = 'Gamma']/../@year")), vec!["2010"]);
    }

    #[test]
    fn test_reverse_axis_positions() {
        assert_eq!(strings(eval("//book[3]/preceding-sibling::book[1]/@id")), vec!["b2"]);
        assert_eq!(strings(eval("//title[1]/ancestor::*[last()]/book[1]/@id")), vec!["b1"]);
    }

    #[test]
    fn test_node_set_comparisons() {
        assert_eq!(eval("//price = 7"), Value::Boolean(true));
        assert_eq!(eval("//price != 7"), Value::Boolean(true));
        assert_eq!(eval("//price > 100"), Value::Boolean(false));
        assert_eq!(eval("//nothing = ''"), Value::Boolean(false));
    }

    #[test]
    fn test_arithmetic_and_functions() {
        assert_eq!(eval("sum(//price)"), Value::Number(42.5));
        assert_eq!(eval("count(//book) * 2 - 1"), Value::Number(5.0));
        assert_eq!(eval("7 mod 3"), Value::Number(1.0));
        assert_eq!(eval("concat(//book[1]/title, '-', string(1 div 0))"), Value::from("Alpha-Infinity"));
    }

    #[test]
    fn test_union_is_in_document_order() {
        assert_eq!(strings(eval("//book[3]/title | //book[1]/title")), vec!["Alpha", "Gamma"]);
    }

    #[test]
    fn test_unknown_function_reaches_context() {
        let root = Document::parse(DOC, "").unwrap();
        let expr = parse_expression("nope()").unwrap();
        let err = evaluate(&expr, &Focus::new(root), &StaticContext::default()).unwrap_err();
        assert!(matches!(err, XPathError::FunctionError { .. }));
    }
}
