//! Incremental construction of documents from a stream of node events.
//!
//! Used both when parsing source text and when the engine captures output
//! into a detached tree fragment. An element's namespace and attribute nodes
//! are staged until its first content arrives, so node ids stay in document
//! order no matter in which order attributes and namespaces are reported.

use crate::document::{Document, NodeData, NodeId, NodeType};
use crate::error::TreeError;
use crate::name::XML_NAMESPACE;
use std::rc::Rc;

#[derive(Debug)]
struct PendingElement {
    id: NodeId,
    namespaces: Vec<(String, String)>,
    attributes: Vec<(String, String, String, String)>,
}

#[derive(Debug)]
pub struct TreeBuilder {
    base_uri: String,
    nodes: Vec<NodeData>,
    open: Vec<NodeId>,
    scopes: Vec<Vec<(String, String)>>,
    pending: Option<PendingElement>,
}

impl TreeBuilder {
    pub fn new(base_uri: &str) -> Self {
        Self {
            base_uri: base_uri.to_string(),
            nodes: vec![NodeData::new(NodeType::Root, None, 0)],
            open: vec![0],
            scopes: vec![Vec::new()],
            pending: None,
        }
    }

    /// Opens an element as the next child of the current element.
    pub fn start_element(&mut self, prefix: &str, local: &str, namespace: &str) -> Result<(), TreeError> {
        self.flush_pending();
        let id = self.push_child(NodeType::Element);
        let node = &mut self.nodes[id];
        node.prefix = prefix.to_string();
        node.local = local.to_string();
        node.namespace = namespace.to_string();
        self.open.push(id);
        self.pending = Some(PendingElement {
            id,
            namespaces: Vec::new(),
            attributes: Vec::new(),
        });
        Ok(())
    }

    /// Adds an attribute to the element opened last. A repeated name replaces
    /// the earlier value.
    pub fn attribute(&mut self, prefix: &str, local: &str, namespace: &str, value: &str) -> Result<(), TreeError> {
        let pending = self.pending.as_mut().ok_or_else(|| {
            TreeError::LateAttribute(local.to_string())
        })?;
        pending
            .attributes
            .retain(|(_, l, ns, _)| !(l == local && ns == namespace));
        pending.attributes.push((
            prefix.to_string(),
            local.to_string(),
            namespace.to_string(),
            value.to_string(),
        ));
        Ok(())
    }

    /// Declares a namespace binding on the element opened last.
    pub fn namespace(&mut self, prefix: &str, uri: &str) -> Result<(), TreeError> {
        if prefix == "xml" {
            return Ok(());
        }
        let pending = self.pending.as_mut().ok_or_else(|| {
            TreeError::LateNamespace(prefix.to_string())
        })?;
        pending.namespaces.retain(|(p, _)| p != prefix);
        pending.namespaces.push((prefix.to_string(), uri.to_string()));
        Ok(())
    }

    /// Appends text, merging with a directly preceding text node.
    pub fn text(&mut self, value: &str) -> Result<(), TreeError> {
        if value.is_empty() {
            return Ok(());
        }
        self.flush_pending();
        let parent = self.current();
        if let Some(&last) = self.nodes[parent].children.last()
            && self.nodes[last].kind == NodeType::Text
        {
            self.nodes[last].value.push_str(value);
            return Ok(());
        }
        let id = self.push_child(NodeType::Text);
        self.nodes[id].value = value.to_string();
        Ok(())
    }

    pub fn comment(&mut self, value: &str) -> Result<(), TreeError> {
        self.flush_pending();
        let id = self.push_child(NodeType::Comment);
        self.nodes[id].value = value.to_string();
        Ok(())
    }

    pub fn processing_instruction(&mut self, target: &str, value: &str) -> Result<(), TreeError> {
        self.flush_pending();
        let id = self.push_child(NodeType::ProcessingInstruction);
        self.nodes[id].local = target.to_string();
        self.nodes[id].value = value.to_string();
        Ok(())
    }

    pub fn end_element(&mut self) -> Result<(), TreeError> {
        self.flush_pending();
        if self.open.len() <= 1 {
            return Err(TreeError::Builder("end_element without open element".into()));
        }
        self.open.pop();
        self.scopes.pop();
        Ok(())
    }

    pub fn finish(mut self) -> Result<Rc<Document>, TreeError> {
        self.flush_pending();
        if self.open.len() != 1 {
            return Err(TreeError::Builder(format!(
                "{} element(s) left open",
                self.open.len() - 1
            )));
        }
        Ok(Rc::new(Document::from_nodes(self.base_uri, self.nodes)))
    }

    fn current(&self) -> NodeId {
        // The root stays on the stack for the whole build.
        self.open.last().copied().unwrap_or(0)
    }

    fn push_child(&mut self, kind: NodeType) -> NodeId {
        let parent = self.current();
        let id = self.nodes.len();
        let index = self.nodes[parent].children.len();
        self.nodes.push(NodeData::new(kind, Some(parent), index));
        self.nodes[parent].children.push(id);
        id
    }

    /// Materializes the staged namespace and attribute nodes of the element
    /// opened last and records its in-scope bindings.
    fn flush_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let parent_scope = self.scopes.last().cloned().unwrap_or_default();
        let mut declared = pending.namespaces;

        // Namespace fixup: names that use a binding nobody declared.
        let mut required = vec![(
            self.nodes[pending.id].prefix.clone(),
            self.nodes[pending.id].namespace.clone(),
        )];
        required.extend(
            pending
                .attributes
                .iter()
                .filter(|(p, _, ns, _)| !ns.is_empty() && p != "xml")
                .map(|(p, _, ns, _)| (p.clone(), ns.clone())),
        );
        for (prefix, uri) in required {
            let bound = declared
                .iter()
                .chain(parent_scope.iter())
                .find(|(p, _)| *p == prefix)
                .map(|(_, u)| u.as_str())
                .unwrap_or("");
            if bound != uri {
                declared.retain(|(p, _)| *p != prefix);
                declared.push((prefix, uri));
            }
        }

        let mut scope: Vec<(String, String)> = parent_scope
            .into_iter()
            .filter(|(p, _)| !declared.iter().any(|(d, _)| d == p))
            .collect();
        scope.extend(declared.iter().cloned());
        scope.retain(|(_, uri)| !uri.is_empty());

        let element = pending.id;
        let mut ns_nodes = Vec::with_capacity(scope.len() + 1);
        let xml = std::iter::once(("xml".to_string(), XML_NAMESPACE.to_string(), false));
        let bindings = scope.iter().map(|(p, u)| {
            let local = declared.iter().any(|(d, du)| d == p && du == u);
            (p.clone(), u.clone(), local)
        });
        for (index, (prefix, uri, local)) in xml.chain(bindings).enumerate() {
            let id = self.nodes.len();
            let mut node = NodeData::new(NodeType::Namespace, Some(element), index);
            node.local = prefix;
            node.value = uri;
            node.declared = local;
            self.nodes.push(node);
            ns_nodes.push(id);
        }
        self.nodes[element].namespaces = ns_nodes;

        let mut attr_nodes = Vec::with_capacity(pending.attributes.len());
        for (index, (prefix, local, namespace, value)) in pending.attributes.into_iter().enumerate() {
            let id = self.nodes.len();
            let mut node = NodeData::new(NodeType::Attribute, Some(element), index);
            node.prefix = prefix;
            node.local = local;
            node.namespace = namespace;
            node.value = value;
            self.nodes.push(node);
            attr_nodes.push(id);
        }
        self.nodes[element].attributes = attr_nodes;
        self.scopes.push(scope);
    }
}
