//! Activation frames: the resumable records the interpreter keeps on its heap
//! stack instead of native call frames.

use crate::actions::Action;
use crate::error::RuntimeError;
use std::rc::Rc;
use xform_tree::{ExpandedName, Navigator};
use xform_xpath::{Focus, Value};

/// The optional mode qualifier of templates and `apply-templates`.
pub type Mode = Option<ExpandedName>;

/// An immutable node list plus a 1-based cursor. Position 0 means the cursor
/// has not been advanced yet.
#[derive(Debug, Clone)]
pub struct NodeSet {
    nodes: Rc<[Navigator]>,
    position: usize,
}

impl NodeSet {
    pub fn new(nodes: Vec<Navigator>) -> Self {
        Self {
            nodes: nodes.into(),
            position: 0,
        }
    }

    /// A one-node set already positioned on its node.
    pub fn single(node: Navigator) -> Self {
        Self {
            nodes: Rc::from(vec![node]),
            position: 1,
        }
    }

    pub fn move_next(&mut self) -> bool {
        if self.position < self.nodes.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<&Navigator> {
        self.position.checked_sub(1).and_then(|i| self.nodes.get(i))
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Navigator] {
        &self.nodes
    }

    /// The evaluation focus at the cursor.
    pub fn focus(&self) -> Option<Focus> {
        self.current()
            .map(|node| Focus::at(node.clone(), self.position, self.nodes.len()))
    }
}

/// What a frame executes: a single action, or a sequence of actions run one
/// after the other (the generic container).
#[derive(Debug, Clone, Copy)]
pub enum FrameTarget<'s> {
    Action(&'s Action),
    Children(&'s [Action]),
}

/// Resume points. Each action uses the subset that fits its state machine;
/// `Initialized` is always the entry and `Finished` pops the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Initialized,
    ProcessedChildren,
    ProcessNextNode,
    PositionAdvanced,
    TemplateProcessed,
    ProcessedTemplate,
    NamespaceCopy,
    ContentsCopy,
    ProcessChildren,
    ChildrenOnly,
    BeginEvent,
    NamespaceBegin,
    NamespaceEnd,
    Attributes,
    AttributeBegin,
    AttributeText,
    AttributeEnd,
    Contents,
    EndEvent,
    ResultStored,
    NodeSetCopied,
    ProcessingChildren,
    GlobalsEvaluated,
    Finished,
}

/// One in-flight action invocation.
#[derive(Debug)]
pub struct ActivationFrame<'s> {
    pub(crate) target: FrameTarget<'s>,
    pub(crate) state: FrameState,
    /// The context node list, positioned at the context node.
    pub(crate) node_set: NodeSet,
    /// A node list the action produced and iterates over itself.
    pub(crate) new_node_set: Option<NodeSet>,
    /// A moving cursor for attribute and namespace passes.
    pub(crate) cursor: Option<Navigator>,
    pub(crate) counter: usize,
    pub(crate) stored_output: Option<String>,
    pub(crate) mode: Mode,
    pub(crate) params: Vec<(ExpandedName, Value)>,
    pub(crate) locals: Vec<(ExpandedName, Value)>,
}

impl<'s> ActivationFrame<'s> {
    pub fn new(target: FrameTarget<'s>, node_set: NodeSet) -> Self {
        Self {
            target,
            state: FrameState::Initialized,
            node_set,
            new_node_set: None,
            cursor: None,
            counter: 0,
            stored_output: None,
            mode: None,
            params: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn node_set(&self) -> &NodeSet {
        &self.node_set
    }

    pub fn node(&self) -> Result<&Navigator, RuntimeError> {
        self.node_set.current().ok_or(RuntimeError::NoContextNode)
    }

    pub fn focus(&self) -> Result<Focus, RuntimeError> {
        self.node_set.focus().ok_or(RuntimeError::NoContextNode)
    }

    pub(crate) fn finish(&mut self) {
        self.state = FrameState::Finished;
    }

    /// True for the frame of a template body; variable lookups stop here.
    pub(crate) fn is_template(&self) -> bool {
        matches!(self.target, FrameTarget::Action(Action::Template(_)))
    }

    pub(crate) fn local(&self, name: &ExpandedName) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub(crate) fn param(&self, name: &ExpandedName) -> Option<&Value> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xform_tree::Document;

    #[test]
    fn test_node_set_cursor() {
        let root = Document::parse("<a><b/><c/></a>", "").unwrap();
        let mut set = NodeSet::new(root.children()[0].children());
        assert!(set.current().is_none());
        assert!(set.move_next());
        assert_eq!(set.current().unwrap().local_name(), "b");
        assert!(set.move_next());
        let focus = set.focus().unwrap();
        assert_eq!((focus.position, focus.size), (2, 2));
        assert!(!set.move_next());
    }

    #[test]
    fn test_single_is_positioned() {
        let root = Document::parse("<a/>", "").unwrap();
        let set = NodeSet::single(root.clone());
        assert_eq!(set.current(), Some(&root));
        assert_eq!(set.position(), 1);
    }
}
