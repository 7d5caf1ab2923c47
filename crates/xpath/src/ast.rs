//! The abstract syntax tree of an XPath 1.0 expression.

use xform_tree::ExpandedName;

/// A name as written in the expression. `namespace` is filled in when the
/// query is compiled against its namespace bindings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QName {
    pub prefix: String,
    pub local: String,
    pub namespace: String,
}

impl QName {
    pub fn new(prefix: &str, local: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            local: local.to_string(),
            namespace: String::new(),
        }
    }

    pub fn expanded(&self) -> ExpandedName {
        ExpandedName::new(self.namespace.clone(), self.local.clone())
    }

    pub fn lexical(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    Variable(QName),
    FunctionCall {
        name: QName,
        args: Vec<Expression>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Negate(Box<Expression>),
    /// A primary expression narrowed by predicates, e.g. `$items[2]`.
    Filter {
        primary: Box<Expression>,
        predicates: Vec<Expression>,
    },
    Path(LocationPath),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    /// `/...`: the root of the context node's document.
    Root,
    /// A relative path.
    Context,
    /// `expr/...`: steps applied to the node-set produced by an expression.
    Expression(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub start: PathStart,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    /// The expansion of the `//` abbreviation.
    pub fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

impl Axis {
    /// Reverse axes number their nodes from the context node backwards.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor | Axis::AncestorOrSelf | Axis::Preceding | Axis::PrecedingSibling
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name(QName),
    /// `*`
    AnyName,
    /// `prefix:*`
    NamespaceAny { prefix: String, namespace: String },
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}
