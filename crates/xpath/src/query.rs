//! Compiled queries and match patterns.

use crate::ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, PathStart, QName, Step};
use crate::context::{Focus, XsltContext};
use crate::engine::{evaluate, evaluate_path};
use crate::error::XPathError;
use crate::parser::parse_expression;
use crate::value::Value;
use xform_tree::Navigator;

/// A parsed expression with every namespace prefix already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    expr: Expression,
}

impl Query {
    /// Compiles an expression. `resolve` maps a prefix to its namespace URI
    /// in the scope where the expression was written.
    pub fn compile(text: &str, resolve: &dyn Fn(&str) -> Option<String>) -> Result<Self, XPathError> {
        let mut expr = parse_expression(text)?;
        resolve_names(&mut expr, resolve)?;
        log::trace!("Compiled expression '{}'", text);
        Ok(Self {
            text: text.to_string(),
            expr,
        })
    }

    /// Compiles a match pattern: a union of location paths using only the
    /// child and attribute axes (and `//`), optionally rooted at `key()` or
    /// `id()`.
    pub fn compile_pattern(text: &str, resolve: &dyn Fn(&str) -> Option<String>) -> Result<Self, XPathError> {
        let query = Self::compile(text, resolve)?;
        for alternative in union_members(&query.expr) {
            check_pattern(alternative).map_err(|msg| XPathError::InvalidPattern(text.to_string(), msg))?;
        }
        Ok(query)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expression(&self) -> &Expression {
        &self.expr
    }

    pub fn evaluate<C: XsltContext + ?Sized>(&self, focus: &Focus, ctx: &C) -> Result<Value, C::Error> {
        evaluate(&self.expr, focus, ctx)
    }

    /// Evaluates an expression that must produce a node-set.
    pub fn select<C: XsltContext + ?Sized>(&self, focus: &Focus, ctx: &C) -> Result<Vec<Navigator>, C::Error> {
        match self.evaluate(focus, ctx)? {
            Value::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::TypeError(format!(
                "'{}' must evaluate to a node-set, got a {}",
                self.text,
                other.type_name()
            ))
            .into()),
        }
    }

    /// Pattern matching: `node` matches if some possible context selects it.
    /// For child- and attribute-axis patterns the candidates are the node's
    /// ancestors; rooted alternatives are evaluated once.
    pub fn match_node<C: XsltContext + ?Sized>(&self, node: &Navigator, ctx: &C) -> Result<bool, C::Error> {
        for alternative in union_members(&self.expr) {
            if match_alternative(alternative, node, ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Splits a union pattern into its members. A template whose pattern is
    /// a union behaves like one template per member.
    pub fn alternatives(&self) -> Vec<Query> {
        union_members(&self.expr)
            .into_iter()
            .map(|expr| Query {
                text: self.text.clone(),
                expr: expr.clone(),
            })
            .collect()
    }

    /// The default template priority of a single-member pattern.
    pub fn default_priority(&self) -> f64 {
        let Expression::Path(LocationPath {
            start: PathStart::Context,
            steps,
        }) = &self.expr
        else {
            return 0.5;
        };
        match steps.as_slice() {
            [Step {
                axis: Axis::Child | Axis::Attribute,
                test,
                predicates,
            }] if predicates.is_empty() => match test {
                NodeTest::Name(_) | NodeTest::ProcessingInstruction(Some(_)) => 0.0,
                NodeTest::NamespaceAny { .. } => -0.25,
                _ => -0.5,
            },
            _ => 0.5,
        }
    }
}

fn union_members(expr: &Expression) -> Vec<&Expression> {
    let mut out = Vec::new();
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        match e {
            Expression::Binary {
                op: BinaryOperator::Union,
                left,
                right,
            } => {
                stack.push(right);
                stack.push(left);
            }
            other => out.push(other),
        }
    }
    out
}

fn check_pattern(expr: &Expression) -> Result<(), String> {
    let path = match expr {
        Expression::Path(path) => path,
        Expression::FunctionCall { .. } => return check_pattern_start(expr),
        _ => return Err("a pattern must be a location path".into()),
    };
    if let PathStart::Expression(start) = &path.start {
        check_pattern_start(start)?;
    }
    for step in &path.steps {
        let allowed = match step.axis {
            Axis::Child | Axis::Attribute => true,
            Axis::DescendantOrSelf => step.test == NodeTest::Node && step.predicates.is_empty(),
            _ => false,
        };
        if !allowed {
            return Err(format!("axis {:?} is not allowed in a pattern", step.axis));
        }
    }
    Ok(())
}

fn check_pattern_start(expr: &Expression) -> Result<(), String> {
    match expr {
        Expression::FunctionCall { name, args }
            if name.namespace.is_empty()
                && matches!(name.local.as_str(), "key" | "id")
                && args.iter().all(|a| matches!(a, Expression::Literal(_))) =>
        {
            Ok(())
        }
        _ => Err("a pattern may only start with key() or id() on literals".into()),
    }
}

fn match_alternative<C: XsltContext + ?Sized>(expr: &Expression, node: &Navigator, ctx: &C) -> Result<bool, C::Error> {
    let contains = |nodes: Vec<Navigator>| nodes.iter().any(|n| n == node);
    match expr {
        Expression::Path(path @ LocationPath {
            start: PathStart::Context,
            ..
        }) => {
            let mut context = node.clone();
            while context.move_to_parent() {
                if contains(evaluate_path(path, &Focus::new(context.clone()), ctx)?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => match evaluate(other, &Focus::new(node.clone()), ctx)? {
            Value::NodeSet(nodes) => Ok(contains(nodes)),
            _ => Ok(false),
        },
    }
}

fn resolve_qname(name: &mut QName, resolve: &dyn Fn(&str) -> Option<String>) -> Result<(), XPathError> {
    if !name.prefix.is_empty() {
        name.namespace = resolve(&name.prefix).ok_or_else(|| XPathError::UnresolvedPrefix(name.prefix.clone()))?;
    }
    Ok(())
}

fn resolve_names(expr: &mut Expression, resolve: &dyn Fn(&str) -> Option<String>) -> Result<(), XPathError> {
    match expr {
        Expression::Literal(_) | Expression::Number(_) => Ok(()),
        Expression::Variable(name) => resolve_qname(name, resolve),
        Expression::FunctionCall { name, args } => {
            resolve_qname(name, resolve)?;
            args.iter_mut().try_for_each(|a| resolve_names(a, resolve))
        }
        Expression::Binary { left, right, .. } => {
            resolve_names(left, resolve)?;
            resolve_names(right, resolve)
        }
        Expression::Negate(inner) => resolve_names(inner, resolve),
        Expression::Filter { primary, predicates } => {
            resolve_names(primary, resolve)?;
            predicates.iter_mut().try_for_each(|p| resolve_names(p, resolve))
        }
        Expression::Path(path) => {
            if let PathStart::Expression(start) = &mut path.start {
                resolve_names(start, resolve)?;
            }
            for step in &mut path.steps {
                match &mut step.test {
                    NodeTest::Name(name) => resolve_qname(name, resolve)?,
                    NodeTest::NamespaceAny { prefix, namespace } => {
                        *namespace = resolve(prefix).ok_or_else(|| XPathError::UnresolvedPrefix(prefix.clone()))?;
                    }
                    _ => {}
                }
                step.predicates
                    .iter_mut()
                    .try_for_each(|p| resolve_names(p, resolve))?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use xform_tree::Document;

    fn no_namespaces(_: &str) -> Option<String> {
        None
    }

    fn ns(prefix: &str) -> Option<String> {
        (prefix == "p").then(|| "urn:p".to_string())
    }

    fn find(root: &Navigator, name: &str) -> Navigator {
        root.descendants()
            .into_iter()
            .find(|n| n.local_name() == name)
            .unwrap()
    }

    #[test]
    fn test_prefixes_resolve_at_compile_time() {
        let root = Document::parse(r#"<r xmlns:q="urn:p"><q:a/></r>"#, "").unwrap();
        let query = Query::compile("//p:a", &ns).unwrap();
        let nodes = query.select(&Focus::new(root), &StaticContext::default()).unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(matches!(
            Query::compile("//z:a", &ns),
            Err(XPathError::UnresolvedPrefix(p)) if p == "z"
        ));
    }

    #[test]
    fn test_pattern_matching() {
        let root = Document::parse(r#"<doc><sec><title id="t"/></sec><title/></doc>"#, "").unwrap();
        let ctx = StaticContext::default();
        let nested = find(&root, "sec").children().remove(0);
        let pattern = Query::compile_pattern("sec/title", &no_namespaces).unwrap();
        assert!(pattern.match_node(&nested, &ctx).unwrap());
        let top = find(&root, "doc").children().remove(1);
        assert!(!pattern.match_node(&top, &ctx).unwrap());

        let attr = Query::compile_pattern("title/@id", &no_namespaces).unwrap();
        assert!(attr.match_node(&nested.attributes()[0], &ctx).unwrap());

        let rooted = Query::compile_pattern("/", &no_namespaces).unwrap();
        assert!(rooted.match_node(&root, &ctx).unwrap());
        assert!(!rooted.match_node(&top, &ctx).unwrap());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            Query::compile_pattern("ancestor::x", &no_namespaces),
            Err(XPathError::InvalidPattern(..))
        ));
        assert!(Query::compile_pattern("1 + 2", &no_namespaces).is_err());
        assert!(Query::compile_pattern("key('k', 'v')/x", &no_namespaces).is_ok());
    }

    #[test]
    fn test_default_priorities() {
        let priority = |p: &str| Query::compile_pattern(p, &ns).unwrap().default_priority();
        assert_eq!(priority("title"), 0.0);
        assert_eq!(priority("@id"), 0.0);
        assert_eq!(priority("p:*"), -0.25);
        assert_eq!(priority("*"), -0.5);
        assert_eq!(priority("text()"), -0.5);
        assert_eq!(priority("sec/title"), 0.5);
        assert_eq!(priority("title[1]"), 0.5);
        assert_eq!(priority("/"), 0.5);
    }

    #[test]
    fn test_alternatives_split_unions() {
        let query = Query::compile_pattern("a | b/c | @d", &no_namespaces).unwrap();
        let priorities: Vec<f64> = query.alternatives().iter().map(Query::default_priority).collect();
        assert_eq!(priorities, vec![0.0, 0.5, 0.0]);
    }
}
