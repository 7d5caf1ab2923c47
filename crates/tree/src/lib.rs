//! The read-only document model consumed by the transformation engine.
//!
//! Documents are immutable arenas of nodes laid out in document order. All
//! access goes through a [`Navigator`], a cheap cloneable cursor that moves
//! over the tree the same way the XPath data model describes it: children,
//! attributes and namespace nodes are reachable from their element, and every
//! node knows its parent.

pub mod builder;
pub mod document;
pub mod error;
pub mod name;
pub mod navigator;

pub use builder::TreeBuilder;
pub use document::{Document, DocumentId, NodeId, NodeType};
pub use error::TreeError;
pub use name::{ExpandedName, XML_NAMESPACE, XMLNS_NAMESPACE};
pub use navigator::{NamespaceScope, Navigator, NodeOrder};
