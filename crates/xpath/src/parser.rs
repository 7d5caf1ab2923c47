//! A `nom`-based parser for the XPath 1.0 expression language.

use super::ast::*;
use crate::error::XPathError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit0, digit1, multispace0, satisfy},
    combinator::{map, not, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

// --- Main Public Parser ---

pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    match expression(input.trim()) {
        Ok(("", expr)) => Ok(expr),
        Ok((rem, _)) => Err(XPathError::XPathParse(
            input.to_string(),
            format!("unexpected input at '{}'", rem),
        )),
        Err(e) => Err(XPathError::XPathParse(input.to_string(), e.to_string())),
    }
}

// --- Combinators & Helpers ---

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

/// An operator word such as `and` or `div`, which must not run on into a name.
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    terminated(tag(word), not(satisfy(is_name_char)))
}

fn build_binary_expr_parser<'a, F, G>(
    sub_expr_parser: F,
    op_parser: G,
) -> impl FnMut(&'a str) -> IResult<&'a str, Expression>
where
    F: Parser<&'a str, Output = Expression, Error = Error<&'a str>> + Clone,
    G: Parser<&'a str, Output = BinaryOperator, Error = Error<&'a str>> + Clone,
{
    move |input: &str| {
        let (input, mut left) = sub_expr_parser.clone().parse(input)?;
        let (input, remainder) =
            many0(pair(ws(op_parser.clone()), sub_expr_parser.clone())).parse(input)?;

        for (op, right) in remainder {
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok((input, left))
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_char))).parse(input)
}

fn q_name(input: &str) -> IResult<&str, QName> {
    let (rest, first) = nc_name(input)?;
    let (rest, second) = opt(preceded(char(':'), nc_name)).parse(rest)?;
    Ok(match second {
        Some(local) => (rest, QName::new(first, local)),
        None => (rest, QName::new("", first)),
    })
}

// --- Expression Parsers (in order of precedence) ---

fn expression(input: &str) -> IResult<&str, Expression> {
    or_expr(input)
}

fn or_op(input: &str) -> IResult<&str, BinaryOperator> {
    value(BinaryOperator::Or, keyword("or")).parse(input)
}

fn and_op(input: &str) -> IResult<&str, BinaryOperator> {
    value(BinaryOperator::And, keyword("and")).parse(input)
}

fn equality_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::NotEquals, tag("!=")),
        value(BinaryOperator::Equals, char('=')),
    ))
    .parse(input)
}

fn relational_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::LessThanOrEqual, tag("<=")),
        value(BinaryOperator::GreaterThanOrEqual, tag(">=")),
        value(BinaryOperator::LessThan, char('<')),
        value(BinaryOperator::GreaterThan, char('>')),
    ))
    .parse(input)
}

fn additive_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::Plus, char('+')),
        value(BinaryOperator::Minus, char('-')),
    ))
    .parse(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::Multiply, char('*')),
        value(BinaryOperator::Divide, keyword("div")),
        value(BinaryOperator::Modulo, keyword("mod")),
    ))
    .parse(input)
}

fn union_op(input: &str) -> IResult<&str, BinaryOperator> {
    value(BinaryOperator::Union, char('|')).parse(input)
}

fn or_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(and_expr, or_op)(input)
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(equality_expr, and_op)(input)
}

fn equality_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(relational_expr, equality_op)(input)
}

fn relational_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(additive_expr, relational_op)(input)
}

fn additive_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(multiplicative_expr, additive_op)(input)
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(unary_expr, multiplicative_op)(input)
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    let (input, signs) = many0(ws(char('-'))).parse(input)?;
    let (input, expr) = union_expr(input)?;
    if signs.len() % 2 == 1 {
        Ok((input, Expression::Negate(Box::new(expr))))
    } else {
        Ok((input, expr))
    }
}

fn union_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(path_expr, union_op)(input)
}

fn path_expr(input: &str) -> IResult<&str, Expression> {
    alt((filter_path, map(location_path, Expression::Path))).parse(input)
}

/// A primary expression with optional predicates and trailing steps.
fn filter_path(input: &str) -> IResult<&str, Expression> {
    let (input, primary) = primary_expr(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    let base = if predicates.is_empty() {
        primary
    } else {
        Expression::Filter {
            primary: Box::new(primary),
            predicates,
        }
    };
    let (input, tail) = opt(pair(step_separator, relative_steps)).parse(input)?;
    match tail {
        None => Ok((input, base)),
        Some((separator, mut steps)) => {
            if separator == "//" {
                steps.insert(0, Step::descendant_or_self());
            }
            Ok((
                input,
                Expression::Path(LocationPath {
                    start: PathStart::Expression(Box::new(base)),
                    steps,
                }),
            ))
        }
    }
}

fn primary_expr(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        map(preceded(char('$'), q_name), Expression::Variable),
        delimited(char('('), ws(expression), char(')')),
        map(literal, Expression::Literal),
        map(number, Expression::Number),
        function_call,
    )))
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
            delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        )),
        str::to_string,
    )
    .parse(input)
}

fn number(input: &str) -> IResult<&str, f64> {
    let (rest, text) = alt((
        recognize(pair(digit1, opt(pair(char('.'), digit0)))),
        recognize(pair(char('.'), digit1)),
    ))
    .parse(input)?;
    Ok((rest, text.parse().unwrap_or(f64::NAN)))
}

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (rest, name) = q_name(input)?;
    if name.prefix.is_empty() && is_node_type_name(&name.local) {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)));
    }
    let (rest, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), expression),
        ws(char(')')),
    )
    .parse(rest)?;
    Ok((rest, Expression::FunctionCall { name, args }))
}

fn is_node_type_name(name: &str) -> bool {
    matches!(name, "node" | "text" | "comment" | "processing-instruction")
}

fn predicate(input: &str) -> IResult<&str, Expression> {
    delimited(ws(char('[')), expression, ws(char(']'))).parse(input)
}

// --- Location Paths ---

fn step_separator(input: &str) -> IResult<&str, &str> {
    ws(alt((tag("//"), tag("/")))).parse(input)
}

fn descendant_separator(input: &str) -> IResult<&str, &str> {
    ws(tag("//")).parse(input)
}

fn location_path(input: &str) -> IResult<&str, LocationPath> {
    alt((
        absolute_location_path,
        map(relative_steps, |steps| LocationPath {
            start: PathStart::Context,
            steps,
        }),
    ))
    .parse(input)
}

fn absolute_location_path(input: &str) -> IResult<&str, LocationPath> {
    if let Ok((rest, _)) = descendant_separator(input) {
        let (rest, mut steps) = relative_steps(rest)?;
        steps.insert(0, Step::descendant_or_self());
        return Ok((
            rest,
            LocationPath {
                start: PathStart::Root,
                steps,
            },
        ));
    }
    let (rest, _) = ws(char('/')).parse(input)?;
    let (rest, steps) = opt(relative_steps).parse(rest)?;
    Ok((
        rest,
        LocationPath {
            start: PathStart::Root,
            steps: steps.unwrap_or_default(),
        },
    ))
}

fn relative_steps(input: &str) -> IResult<&str, Vec<Step>> {
    let (mut input, first) = step(input)?;
    let mut steps = vec![first];
    while let Ok((rest, separator)) = step_separator(input) {
        let (rest, next) = step(rest)?;
        if separator == "//" {
            steps.push(Step::descendant_or_self());
        }
        steps.push(next);
        input = rest;
    }
    Ok((input, steps))
}

fn step(input: &str) -> IResult<&str, Step> {
    alt((
        map(ws(tag("..")), |_| Step {
            axis: Axis::Parent,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }),
        map(ws(char('.')), |_| Step {
            axis: Axis::SelfAxis,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }),
        full_step,
    ))
    .parse(input)
}

fn full_step(input: &str) -> IResult<&str, Step> {
    let (input, axis) = opt(axis_specifier).parse(input)?;
    let (input, test) = ws(node_test).parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    Ok((
        input,
        Step {
            axis: axis.unwrap_or(Axis::Child),
            test,
            predicates,
        },
    ))
}

fn axis_specifier(input: &str) -> IResult<&str, Axis> {
    alt((
        value(Axis::Attribute, ws(char('@'))),
        terminated(ws(axis_name), ws(tag("::"))),
    ))
    .parse(input)
}

fn axis_name(input: &str) -> IResult<&str, Axis> {
    alt((
        value(Axis::AncestorOrSelf, tag("ancestor-or-self")),
        value(Axis::Ancestor, tag("ancestor")),
        value(Axis::Attribute, tag("attribute")),
        value(Axis::Child, tag("child")),
        value(Axis::DescendantOrSelf, tag("descendant-or-self")),
        value(Axis::Descendant, tag("descendant")),
        value(Axis::FollowingSibling, tag("following-sibling")),
        value(Axis::Following, tag("following")),
        value(Axis::Namespace, tag("namespace")),
        value(Axis::Parent, tag("parent")),
        value(Axis::PrecedingSibling, tag("preceding-sibling")),
        value(Axis::Preceding, tag("preceding")),
        value(Axis::SelfAxis, tag("self")),
    ))
    .parse(input)
}

fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        node_type_test,
        value(NodeTest::AnyName, char('*')),
        map(terminated(nc_name, tag(":*")), |prefix| NodeTest::NamespaceAny {
            prefix: prefix.to_string(),
            namespace: String::new(),
        }),
        map(q_name, NodeTest::Name),
    ))
    .parse(input)
}

fn node_type_test(input: &str) -> IResult<&str, NodeTest> {
    let (rest, kind) = alt((
        tag("processing-instruction"),
        tag("comment"),
        tag("text"),
        tag("node"),
    ))
    .parse(input)?;
    let (rest, _) = ws(char('(')).parse(rest)?;
    let (rest, target) = if kind == "processing-instruction" {
        opt(ws(literal)).parse(rest)?
    } else {
        (rest, None)
    };
    let (rest, _) = ws(char(')')).parse(rest)?;
    let test = match kind {
        "processing-instruction" => NodeTest::ProcessingInstruction(target),
        "comment" => NodeTest::Comment,
        "text" => NodeTest::Text,
        _ => NodeTest::Node,
    };
    Ok((rest, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(expr: Expression) -> LocationPath {
        match expr {
            Expression::Path(p) => p,
            other => panic!("Expected a location path, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_abbreviated_steps() {
        let p = path(parse_expression("../@id").unwrap());
        assert_eq!(p.start, PathStart::Context);
        assert_eq!(p.steps.len(), 2);
        assert_eq!(p.steps[0].axis, Axis::Parent);
        assert_eq!(p.steps[1].axis, Axis::Attribute);
        assert_eq!(p.steps[1].test, NodeTest::Name(QName::new("", "id")));
    }

    #[test]
    fn test_parse_descendant_abbreviation() {
        let p = path(parse_expression("//item[2]").unwrap());
        assert_eq!(p.start, PathStart::Root);
        assert_eq!(p.steps[0], Step::descendant_or_self());
        assert_eq!(p.steps[1].predicates, vec![Expression::Number(2.0)]);
    }

    #[test]
    fn test_parse_explicit_axes_and_node_tests() {
        let p = path(parse_expression("ancestor-or-self::node()/following-sibling::p:*").unwrap());
        assert_eq!(p.steps[0].axis, Axis::AncestorOrSelf);
        assert_eq!(p.steps[0].test, NodeTest::Node);
        assert_eq!(p.steps[1].axis, Axis::FollowingSibling);
        assert!(matches!(&p.steps[1].test, NodeTest::NamespaceAny { prefix, .. } if prefix == "p"));
    }

    #[test]
    fn test_operator_precedence() {
        let expr = parse_expression("1 + 2 * 3 = 7 and not(false())").unwrap();
        let Expression::Binary { op, left, .. } = expr else {
            panic!("Expected binary expression");
        };
        assert_eq!(op, BinaryOperator::And);
        let Expression::Binary { op, left, .. } = *left else {
            panic!("Expected equality");
        };
        assert_eq!(op, BinaryOperator::Equals);
        assert!(matches!(*left, Expression::Binary { op: BinaryOperator::Plus, .. }));
    }

    #[test]
    fn test_keywords_do_not_swallow_names() {
        let expr = parse_expression("order div 2").unwrap();
        assert!(matches!(expr, Expression::Binary { op: BinaryOperator::Divide, .. }));
        // 'android' must stay a name test, not 'and' + 'roid'
        let p = path(parse_expression("android").unwrap());
        assert_eq!(p.steps[0].test, NodeTest::Name(QName::new("", "android")));
    }

    #[test]
    fn test_filter_expression_with_trailing_path() {
        let expr = parse_expression("key('k', 'v')[1]/name").unwrap();
        let p = path(expr);
        assert!(matches!(p.start, PathStart::Expression(_)));
        assert_eq!(p.steps.len(), 1);
    }

    #[test]
    fn test_variables_literals_numbers() {
        assert_eq!(
            parse_expression("$p:x").unwrap(),
            Expression::Variable(QName::new("p", "x"))
        );
        assert_eq!(parse_expression("'a b'").unwrap(), Expression::Literal("a b".into()));
        assert_eq!(parse_expression(".5").unwrap(), Expression::Number(0.5));
        assert_eq!(
            parse_expression("--3").unwrap(),
            Expression::Number(3.0)
        );
    }

    #[test]
    fn test_union_of_paths() {
        let expr = parse_expression("a | b/c").unwrap();
        assert!(matches!(expr, Expression::Binary { op: BinaryOperator::Union, .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_expression("a[").is_err());
        assert!(parse_expression("f(1,").is_err());
        assert!(parse_expression("1 +").is_err());
    }
}
