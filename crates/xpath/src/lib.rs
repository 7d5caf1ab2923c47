//! An XPath 1.0 query service.
//!
//! Text is compiled once into a [`Query`] (with namespace prefixes resolved at
//! compile time) and then evaluated any number of times against a [`Focus`].
//! Everything the core library does not know about, variables and non-core
//! functions, is delegated to an [`XsltContext`] supplied by the caller.

pub mod ast;
pub mod axes;
pub mod context;
pub mod engine;
pub mod error;
pub mod functions;
pub mod parser;
pub mod query;
pub mod value;

pub use ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, PathStart, QName, Step};
pub use context::{Focus, StaticContext, XsltContext};
pub use engine::evaluate;
pub use error::XPathError;
pub use parser::parse_expression;
pub use query::Query;
pub use value::{Value, is_xml_whitespace, number_to_string, string_to_number};
