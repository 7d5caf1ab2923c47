//! The node arena backing every navigator.

use crate::builder::TreeBuilder;
use crate::error::TreeError;
use crate::navigator::Navigator;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index of a node inside its [`Document`]. Indices follow document order.
pub type NodeId = usize;

/// The type of a node, aligned with the XPath 1.0 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Namespace,
    Text,
    Comment,
    ProcessingInstruction,
}

/// Process-unique identity of a document. Used for cross-document ordering
/// and as the cache key for per-document indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        DocumentId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub kind: NodeType,
    pub parent: Option<NodeId>,
    /// Position inside the parent's children, attributes or namespaces list.
    pub index: usize,
    pub prefix: String,
    /// Local name; the target for processing instructions, the prefix for
    /// namespace nodes.
    pub local: String,
    pub namespace: String,
    /// Text content, attribute value, comment/PI body or namespace URI.
    pub value: String,
    pub children: Vec<NodeId>,
    pub attributes: Vec<NodeId>,
    pub namespaces: Vec<NodeId>,
    /// For namespace nodes: declared on the owning element rather than inherited.
    pub declared: bool,
}

impl NodeData {
    pub(crate) fn new(kind: NodeType, parent: Option<NodeId>, index: usize) -> Self {
        Self {
            kind,
            parent,
            index,
            prefix: String::new(),
            local: String::new(),
            namespace: String::new(),
            value: String::new(),
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            declared: false,
        }
    }
}

/// An immutable document tree. Once built it is only ever shared behind an
/// `Rc`, so no code path can mutate it while a transformation reads it.
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    base_uri: String,
    pub(crate) nodes: Vec<NodeData>,
}

impl Document {
    pub(crate) fn from_nodes(base_uri: String, nodes: Vec<NodeData>) -> Self {
        Self {
            id: DocumentId::next(),
            base_uri,
            nodes,
        }
    }

    /// Parses XML text into a document and returns a navigator on its root.
    pub fn parse(text: &str, base_uri: &str) -> Result<Navigator, TreeError> {
        let parsed = roxmltree::Document::parse(text)?;
        let mut builder = TreeBuilder::new(base_uri);
        // Pre-order walk with an explicit stack of open elements, so
        // arbitrarily deep input does not recurse on the native stack.
        let mut open: Vec<roxmltree::NodeId> = Vec::new();
        for node in parsed.root().descendants() {
            let parent = node.parent().map(|p| p.id());
            while let Some(&top) = open.last() {
                if Some(top) == parent {
                    break;
                }
                open.pop();
                builder.end_element()?;
            }
            match node.node_type() {
                roxmltree::NodeType::Root => {}
                roxmltree::NodeType::Element => {
                    open_element(&mut builder, node)?;
                    open.push(node.id());
                }
                roxmltree::NodeType::Text => builder.text(node.text().unwrap_or_default())?,
                roxmltree::NodeType::Comment => builder.comment(node.text().unwrap_or_default())?,
                roxmltree::NodeType::PI => {
                    if let Some(pi) = node.pi() {
                        builder.processing_instruction(pi.target, pi.value.unwrap_or_default())?;
                    }
                }
            }
        }
        for _ in open.drain(..) {
            builder.end_element()?;
        }
        let doc = builder.finish()?;
        log::debug!("Parsed document {} with {} nodes", base_uri, doc.node_count());
        Ok(Navigator::new(doc, 0))
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id]
    }

    /// A navigator positioned on the root node of a shared document.
    pub fn root(doc: &Rc<Document>) -> Navigator {
        Navigator::new(Rc::clone(doc), 0)
    }
}

fn open_element(builder: &mut TreeBuilder, node: roxmltree::Node<'_, '_>) -> Result<(), TreeError> {
    let tag = node.tag_name();
    let namespace = tag.namespace().unwrap_or_default();
    let prefix = if namespace.is_empty() {
        ""
    } else {
        node.lookup_prefix(namespace).unwrap_or_default()
    };
    builder.start_element(prefix, tag.name(), namespace)?;

    let inherited: Vec<(Option<&str>, &str)> = node
        .parent_element()
        .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
        .unwrap_or_default();
    for ns in node.namespaces() {
        if !inherited.contains(&(ns.name(), ns.uri())) {
            builder.namespace(ns.name().unwrap_or_default(), ns.uri())?;
        }
    }

    for attr in node.attributes() {
        let ns = attr.namespace().unwrap_or_default();
        let prefix = match ns {
            "" => "",
            crate::name::XML_NAMESPACE => "xml",
            uri => node.lookup_prefix(uri).unwrap_or_default(),
        };
        builder.attribute(prefix, attr.name(), ns, attr.value())?;
    }
    Ok(())
}
