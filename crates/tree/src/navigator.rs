//! The tree cursor.
//!
//! A [`Navigator`] is a position inside a shared [`Document`]. Cloning one is
//! cheap (a reference count bump), and the `move_to_*` operations mutate only
//! the cursor, never the tree. Ordering between navigators is document order,
//! with documents ordered by their creation.

use crate::document::{Document, DocumentId, NodeData, NodeId, NodeType};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Which namespace nodes a namespace cursor move considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Every in-scope namespace, including the implicit `xml` binding.
    All,
    /// Every in-scope namespace except the reserved `xml` binding.
    ExcludeXml,
    /// Only the bindings declared on the element itself.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrder {
    Before,
    After,
    Same,
}

#[derive(Clone)]
pub struct Navigator {
    doc: Rc<Document>,
    node: NodeId,
}

impl Navigator {
    pub(crate) fn new(doc: Rc<Document>, node: NodeId) -> Self {
        Self { doc, node }
    }

    fn data(&self) -> &NodeData {
        self.doc.node(self.node)
    }

    fn at(&self, node: NodeId) -> Navigator {
        Navigator::new(Rc::clone(&self.doc), node)
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.doc
    }

    pub fn document_id(&self) -> DocumentId {
        self.doc.id()
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn node_type(&self) -> NodeType {
        self.data().kind
    }

    pub fn is_element(&self) -> bool {
        self.node_type() == NodeType::Element
    }

    /// Local name of elements and attributes, target of processing
    /// instructions, prefix of namespace nodes; empty otherwise.
    pub fn local_name(&self) -> &str {
        &self.data().local
    }

    pub fn prefix(&self) -> &str {
        &self.data().prefix
    }

    pub fn namespace_uri(&self) -> &str {
        &self.data().namespace
    }

    /// The lexical `prefix:local` name.
    pub fn name(&self) -> String {
        let data = self.data();
        if data.prefix.is_empty() {
            data.local.clone()
        } else {
            format!("{}:{}", data.prefix, data.local)
        }
    }

    /// The XPath string value. Element and root values concatenate all
    /// descendant text in document order.
    pub fn value(&self) -> String {
        let data = self.data();
        match data.kind {
            NodeType::Root | NodeType::Element => {
                let mut out = String::new();
                let mut stack: Vec<NodeId> = data.children.iter().rev().copied().collect();
                while let Some(id) = stack.pop() {
                    let node = self.doc.node(id);
                    match node.kind {
                        NodeType::Text => out.push_str(&node.value),
                        NodeType::Element => stack.extend(node.children.iter().rev()),
                        _ => {}
                    }
                }
                out
            }
            _ => data.value.clone(),
        }
    }

    pub fn base_uri(&self) -> &str {
        self.doc.base_uri()
    }

    pub fn has_children(&self) -> bool {
        !self.data().children.is_empty()
    }

    pub fn has_attributes(&self) -> bool {
        !self.data().attributes.is_empty()
    }

    pub fn move_to(&mut self, other: &Navigator) {
        self.doc = Rc::clone(&other.doc);
        self.node = other.node;
    }

    pub fn move_to_root(&mut self) {
        self.node = 0;
    }

    pub fn move_to_parent(&mut self) -> bool {
        match self.data().parent {
            Some(parent) => {
                self.node = parent;
                true
            }
            None => false,
        }
    }

    pub fn move_to_first_child(&mut self) -> bool {
        match self.data().children.first() {
            Some(&child) => {
                self.node = child;
                true
            }
            None => false,
        }
    }

    /// Moves to the next sibling. Attribute and namespace nodes have no
    /// siblings in this sense.
    pub fn move_to_next(&mut self) -> bool {
        if matches!(self.node_type(), NodeType::Attribute | NodeType::Namespace) {
            return false;
        }
        self.move_to_following_entry(false)
    }

    pub fn move_to_previous(&mut self) -> bool {
        let data = self.data();
        if matches!(data.kind, NodeType::Attribute | NodeType::Namespace) || data.index == 0 {
            return false;
        }
        match data.parent {
            Some(parent) => {
                self.node = self.doc.node(parent).children[data.index - 1];
                true
            }
            None => false,
        }
    }

    pub fn move_to_first_attribute(&mut self) -> bool {
        match self.data().attributes.first() {
            Some(&attr) => {
                self.node = attr;
                true
            }
            None => false,
        }
    }

    pub fn move_to_next_attribute(&mut self) -> bool {
        if self.node_type() != NodeType::Attribute {
            return false;
        }
        self.move_to_following_entry(true)
    }

    /// Moves from an element to its first namespace node admitted by `scope`.
    pub fn move_to_first_namespace(&mut self, scope: NamespaceScope) -> bool {
        if !self.is_element() {
            return false;
        }
        let data = self.data();
        let found = data
            .namespaces
            .iter()
            .copied()
            .find(|&id| admits(scope, self.doc.node(id)));
        match found {
            Some(id) => {
                self.node = id;
                true
            }
            None => false,
        }
    }

    /// Moves from a namespace node to the next one of the same element
    /// admitted by `scope`.
    pub fn move_to_next_namespace(&mut self, scope: NamespaceScope) -> bool {
        let data = self.data();
        if data.kind != NodeType::Namespace {
            return false;
        }
        let Some(owner) = data.parent else {
            return false;
        };
        let found = self.doc.node(owner).namespaces[data.index + 1..]
            .iter()
            .copied()
            .find(|&id| admits(scope, self.doc.node(id)));
        match found {
            Some(id) => {
                self.node = id;
                true
            }
            None => false,
        }
    }

    fn move_to_following_entry(&mut self, attributes: bool) -> bool {
        let data = self.data();
        let Some(parent) = data.parent else {
            return false;
        };
        let parent = self.doc.node(parent);
        let list = if attributes { &parent.attributes } else { &parent.children };
        match list.get(data.index + 1) {
            Some(&next) => {
                self.node = next;
                true
            }
            None => false,
        }
    }

    pub fn is_same_position(&self, other: &Navigator) -> bool {
        Rc::ptr_eq(&self.doc, &other.doc) && self.node == other.node
    }

    pub fn compare_position(&self, other: &Navigator) -> NodeOrder {
        match self.cmp(other) {
            Ordering::Less => NodeOrder::Before,
            Ordering::Greater => NodeOrder::After,
            Ordering::Equal => NodeOrder::Same,
        }
    }

    /// An identifier unique across all documents of the process, usable as an
    /// XML name.
    pub fn unique_id(&self) -> String {
        format!("IDd{}n{}", self.doc.id().get(), self.node)
    }

    pub fn parent(&self) -> Option<Navigator> {
        self.data().parent.map(|p| self.at(p))
    }

    pub fn root(&self) -> Navigator {
        self.at(0)
    }

    pub fn children(&self) -> Vec<Navigator> {
        self.data().children.iter().map(|&id| self.at(id)).collect()
    }

    pub fn attributes(&self) -> Vec<Navigator> {
        self.data().attributes.iter().map(|&id| self.at(id)).collect()
    }

    pub fn namespaces(&self, scope: NamespaceScope) -> Vec<Navigator> {
        if !self.is_element() {
            return Vec::new();
        }
        self.data()
            .namespaces
            .iter()
            .filter(|&&id| admits(scope, self.doc.node(id)))
            .map(|&id| self.at(id))
            .collect()
    }

    /// All descendants (not attributes or namespaces) in document order.
    pub fn descendants(&self) -> Vec<Navigator> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.data().children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(self.at(id));
            stack.extend(self.doc.node(id).children.iter().rev());
        }
        out
    }

    /// Looks up the namespace URI bound to `prefix` on this element or, for
    /// other nodes, on the nearest element ancestor.
    pub fn lookup_namespace(&self, prefix: &str) -> Option<String> {
        let mut nav = self.clone();
        while !nav.is_element() {
            if !nav.move_to_parent() {
                return None;
            }
        }
        nav.namespaces(NamespaceScope::All)
            .into_iter()
            .find(|ns| ns.local_name() == prefix)
            .map(|ns| ns.value())
    }
}

fn admits(scope: NamespaceScope, node: &NodeData) -> bool {
    match scope {
        NamespaceScope::All => true,
        NamespaceScope::ExcludeXml => node.local != "xml",
        NamespaceScope::Local => node.declared,
    }
}

impl PartialEq for Navigator {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_position(other)
    }
}

impl Eq for Navigator {}

impl Hash for Navigator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.doc.id().hash(state);
        self.node.hash(state);
    }
}

impl PartialOrd for Navigator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Navigator {
    fn cmp(&self, other: &Self) -> Ordering {
        self.doc
            .id()
            .cmp(&other.doc.id())
            .then(self.node.cmp(&other.node))
    }
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node_type() {
            NodeType::Element | NodeType::Attribute => {
                write!(f, "{:?}({})#{}", self.node_type(), self.name(), self.node)
            }
            kind => write!(f, "{:?}#{}", kind, self.node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Navigator {
        Document::parse(
            r#"<root xmlns:a="urn:a"><x id="1" k="v">one</x><y xmlns:b="urn:b"/><!--c--></root>"#,
            "sample.xml",
        )
        .unwrap()
    }

    #[test]
    fn child_and_sibling_moves() {
        let mut nav = sample();
        assert_eq!(nav.node_type(), NodeType::Root);
        assert!(nav.move_to_first_child());
        assert_eq!(nav.local_name(), "root");
        assert!(nav.move_to_first_child());
        assert_eq!(nav.local_name(), "x");
        assert!(nav.move_to_next());
        assert_eq!(nav.local_name(), "y");
        assert!(nav.move_to_next());
        assert_eq!(nav.node_type(), NodeType::Comment);
        assert!(!nav.move_to_next());
        assert!(nav.move_to_previous());
        assert_eq!(nav.local_name(), "y");
        assert!(nav.move_to_parent());
        assert_eq!(nav.local_name(), "root");
    }

    #[test]
    fn attribute_moves_do_not_leak_into_children() {
        let mut nav = sample();
        nav.move_to_first_child();
        nav.move_to_first_child();
        assert!(nav.move_to_first_attribute());
        assert_eq!(nav.local_name(), "id");
        assert!(!nav.move_to_next());
        assert!(nav.move_to_next_attribute());
        assert_eq!(nav.value(), "v");
        assert!(!nav.move_to_next_attribute());
        assert!(nav.move_to_parent());
        assert_eq!(nav.local_name(), "x");
    }

    #[test]
    fn namespace_scopes() {
        let mut y = sample();
        y.move_to_first_child();
        y.move_to_first_child();
        y.move_to_next();
        let all: Vec<String> = y
            .namespaces(NamespaceScope::All)
            .iter()
            .map(|n| n.local_name().to_string())
            .collect();
        assert_eq!(all, vec!["xml", "a", "b"]);
        let local: Vec<String> = y
            .namespaces(NamespaceScope::Local)
            .iter()
            .map(|n| n.local_name().to_string())
            .collect();
        assert_eq!(local, vec!["b"]);

        let mut ns = y.clone();
        assert!(ns.move_to_first_namespace(NamespaceScope::ExcludeXml));
        assert_eq!(ns.local_name(), "a");
        assert_eq!(ns.value(), "urn:a");
        assert!(ns.move_to_next_namespace(NamespaceScope::ExcludeXml));
        assert_eq!(ns.local_name(), "b");
        assert!(!ns.move_to_next_namespace(NamespaceScope::ExcludeXml));
        assert_eq!(y.lookup_namespace("b").as_deref(), Some("urn:b"));
    }

    #[test]
    fn document_order_and_identity() {
        let root = sample();
        let nodes = root.descendants();
        for pair in nodes.windows(2) {
            assert_eq!(pair[0].compare_position(&pair[1]), NodeOrder::Before);
        }
        let again = sample();
        assert_ne!(root.unique_id(), again.unique_id());
        assert_eq!(root.compare_position(&root.clone()), NodeOrder::Same);
    }

    #[test]
    fn string_value_concatenates_descendant_text() {
        let nav = Document::parse("<a>x<b>y<c>z</c></b>w</a>", "").unwrap();
        assert_eq!(nav.value(), "xyzw");
    }
}
