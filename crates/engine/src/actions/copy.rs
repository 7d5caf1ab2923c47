use super::Action;
use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use crate::frame::{ActivationFrame, FrameState, NodeSet};
use crate::output::RecordOutput;
use crate::processor::Processor;
use crate::stylesheet::QueryKey;
use xform_tree::{NamespaceScope, Navigator, NodeType};
use xform_xpath::Value;

/// `xsl:copy`: a shallow copy of the context node. Element content comes
/// from the instruction's own content, never from the source children.
#[derive(Debug)]
pub struct CopyAction {
    pub content: Vec<Action>,
}

impl CopyAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        compiler.compile_attributes(|_, attr, _| {
            if attr == "use-attribute-sets" {
                log::warn!("Attribute sets are not supported; ignoring use-attribute-sets");
                return Ok(true);
            }
            Ok(false)
        })?;
        let content = compiler.compile_template_content()?;
        Ok(Self { content })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        let node = frame.node()?.clone();
        match frame.state {
            FrameState::Initialized => {
                if node.node_type() == NodeType::Root {
                    processor.push_children(&self.content, frame.node_set.clone());
                    frame.state = FrameState::ChildrenOnly;
                } else if processor.copy_begin_event(&node, self.content.is_empty()) {
                    frame.state = if node.is_element() {
                        FrameState::NamespaceCopy
                    } else {
                        FrameState::ContentsCopy
                    };
                }
            }
            FrameState::NamespaceCopy => {
                let stylesheet = processor.stylesheet();
                processor.push_action_frame(&stylesheet.copy_namespaces, frame.node_set.clone());
                frame.state = FrameState::ContentsCopy;
            }
            FrameState::ContentsCopy => {
                if node.is_element() {
                    processor.push_children(&self.content, frame.node_set.clone());
                    frame.state = FrameState::ProcessChildren;
                } else if processor.copy_text_event(&node) {
                    frame.state = FrameState::ProcessChildren;
                }
            }
            FrameState::ProcessChildren => {
                if processor.copy_end_event(&node) {
                    frame.finish();
                }
            }
            _ => frame.finish(),
        }
        Ok(())
    }
}

/// `xsl:copy-of`: node-sets are copied deeply, anything else is output as
/// its string value.
#[derive(Debug)]
pub struct CopyOfAction {
    pub select: QueryKey,
}

impl CopyOfAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut select = None;
        compiler.compile_attributes(|c, attr, value| {
            if attr != "select" {
                return Ok(false);
            }
            select = Some(c.add_query(value)?);
            Ok(true)
        })?;
        compiler.check_empty()?;
        let Some(select) = select else {
            return Err(CompileError::MissingAttribute {
                element: compiler.element_name(),
                attribute: "select".into(),
            });
        };
        Ok(Self { select })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        match frame.state {
            FrameState::Initialized => match processor.run_query(frame, self.select)? {
                Value::NodeSet(nodes) => {
                    push_deep_copy(processor, frame, nodes);
                    frame.state = FrameState::NodeSetCopied;
                }
                scalar => {
                    frame.stored_output = Some(scalar.to_string());
                    frame.state = FrameState::ResultStored;
                }
            },
            FrameState::ResultStored => {
                let text = frame.stored_output.as_deref().unwrap_or_default();
                if text.is_empty() || processor.text_event(text) {
                    frame.finish();
                }
            }
            _ => frame.finish(),
        }
        Ok(())
    }
}

/// Emits one namespace event per in-scope namespace of the context element,
/// skipping the implicit `xml` binding.
pub(super) fn copy_namespaces<'s, O: RecordOutput>(
    processor: &mut Processor<'s, O>,
    frame: &mut ActivationFrame<'s>,
) -> Result<(), RuntimeError> {
    match frame.state {
        FrameState::Initialized | FrameState::ProcessNextNode => {
            let moved = match frame.cursor.as_mut() {
                Some(cursor) => cursor.move_to_next_namespace(NamespaceScope::ExcludeXml),
                None => {
                    let mut cursor = frame.node()?.clone();
                    let moved = cursor.move_to_first_namespace(NamespaceScope::ExcludeXml);
                    frame.cursor = Some(cursor);
                    moved
                }
            };
            if moved {
                frame.state = FrameState::BeginEvent;
            } else {
                frame.finish();
            }
        }
        FrameState::BeginEvent => {
            if let Some(namespace) = frame.cursor.as_ref()
                && processor.copy_begin_event(namespace, true)
            {
                frame.state = FrameState::EndEvent;
            }
        }
        FrameState::EndEvent => {
            if processor.end_event(NodeType::Namespace) {
                frame.state = FrameState::ProcessNextNode;
            }
        }
        _ => frame.finish(),
    }
    Ok(())
}

/// Deep copy of the nodes in `frame.new_node_set`, in order. Each level of
/// the source tree gets its own frame, so depth costs heap rather than native
/// stack.
pub(super) fn copy_node_set<'s, O: RecordOutput>(
    processor: &mut Processor<'s, O>,
    frame: &mut ActivationFrame<'s>,
) -> Result<(), RuntimeError> {
    let current = frame.new_node_set.as_ref().and_then(|set| set.current().cloned());
    match (frame.state, current) {
        (FrameState::Initialized | FrameState::ProcessNextNode, _) => {
            let advanced = frame.new_node_set.as_mut().is_some_and(NodeSet::move_next);
            if advanced {
                frame.state = FrameState::BeginEvent;
            } else {
                frame.finish();
            }
        }
        (_, None) => frame.finish(),
        (FrameState::BeginEvent, Some(node)) => match node.node_type() {
            NodeType::Root => frame.state = FrameState::Contents,
            node_type => {
                let empty = !node.has_children() && !node.has_attributes();
                if processor.copy_begin_event(&node, empty) {
                    frame.state = if node_type == NodeType::Element {
                        FrameState::NamespaceCopy
                    } else {
                        FrameState::Contents
                    };
                }
            }
        },
        (FrameState::NamespaceCopy, Some(node)) => {
            let stylesheet = processor.stylesheet();
            processor.push_action_frame(&stylesheet.copy_namespaces, NodeSet::single(node));
            frame.state = FrameState::Attributes;
        }
        (FrameState::Attributes, Some(node)) => {
            let moved = match frame.cursor.as_mut() {
                Some(cursor) => cursor.move_to_next_attribute(),
                None => {
                    let mut cursor = node;
                    let moved = cursor.move_to_first_attribute();
                    frame.cursor = Some(cursor);
                    moved
                }
            };
            if moved {
                frame.state = FrameState::AttributeBegin;
            } else {
                frame.cursor = None;
                frame.state = FrameState::Contents;
            }
        }
        (FrameState::AttributeBegin, _) => {
            if let Some(attribute) = frame.cursor.as_ref()
                && processor.copy_begin_event(attribute, false)
            {
                frame.state = FrameState::AttributeText;
            }
        }
        (FrameState::AttributeText, _) => {
            if let Some(attribute) = frame.cursor.as_ref()
                && processor.copy_text_event(attribute)
            {
                frame.state = FrameState::AttributeEnd;
            }
        }
        (FrameState::AttributeEnd, _) => {
            if let Some(attribute) = frame.cursor.as_ref()
                && processor.copy_end_event(attribute)
            {
                frame.state = FrameState::Attributes;
            }
        }
        (FrameState::Contents, Some(node)) => {
            if matches!(node.node_type(), NodeType::Root | NodeType::Element) {
                if node.has_children() {
                    push_deep_copy(processor, frame, node.children());
                }
                frame.state = FrameState::EndEvent;
            } else if processor.copy_text_event(&node) {
                frame.state = FrameState::EndEvent;
            }
        }
        (FrameState::EndEvent, Some(node)) => {
            if processor.copy_end_event(&node) {
                frame.state = FrameState::ProcessNextNode;
            }
        }
        _ => frame.finish(),
    }
    Ok(())
}

fn push_deep_copy<'s, O: RecordOutput>(
    processor: &mut Processor<'s, O>,
    frame: &ActivationFrame<'s>,
    nodes: Vec<Navigator>,
) {
    let stylesheet = processor.stylesheet();
    let copy = processor.push_action_frame(&stylesheet.copy_node_set, frame.node_set.clone());
    copy.new_node_set = Some(NodeSet::new(nodes));
}
