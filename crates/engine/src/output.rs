//! Output sinks.
//!
//! The interpreter reports its result as a stream of begin / text / end
//! events. A sink may decline any event by returning `false`; the frame that
//! produced it keeps its state and repeats the same event on the next step.

use crate::error::RuntimeError;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesPI, BytesStart, BytesText, Event};
use xform_tree::{Document, Navigator, NodeType, TreeBuilder, TreeError};

/// Receives the events of a transformation.
///
/// `begin_event` carries the node's prefix and local name; `value` is the
/// namespace URI for elements, attributes and namespace nodes (whose local
/// name is the bound prefix). Attribute values, comment text and
/// processing-instruction data arrive as text events between begin and end.
pub trait RecordOutput {
    fn begin_event(&mut self, node_type: NodeType, prefix: &str, name: &str, value: &str, empty: bool)
    -> bool;
    fn text_event(&mut self, text: &str) -> bool;
    fn end_event(&mut self, node_type: NodeType) -> bool;
}

impl<T: RecordOutput + ?Sized> RecordOutput for Box<T> {
    fn begin_event(&mut self, node_type: NodeType, prefix: &str, name: &str, value: &str, empty: bool) -> bool {
        (**self).begin_event(node_type, prefix, name, value, empty)
    }

    fn text_event(&mut self, text: &str) -> bool {
        (**self).text_event(text)
    }

    fn end_event(&mut self, node_type: NodeType) -> bool {
        (**self).end_event(node_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Begin {
        node_type: NodeType,
        prefix: String,
        name: String,
        value: String,
        empty: bool,
    },
    Text(String),
    End(NodeType),
}

impl OutputEvent {
    /// Shorthand used when comparing recorded streams.
    pub fn begin(node_type: NodeType, prefix: &str, name: &str, value: &str) -> Self {
        OutputEvent::Begin {
            node_type,
            prefix: prefix.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            empty: false,
        }
    }
}

impl std::fmt::Display for OutputEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputEvent::Begin {
                node_type,
                prefix,
                name,
                value,
                ..
            } => write!(f, "begin {:?} {}:{} {{{}}}", node_type, prefix, name, value),
            OutputEvent::Text(text) => write!(f, "text {:?}", text),
            OutputEvent::End(node_type) => write!(f, "end {:?}", node_type),
        }
    }
}

/// Records every accepted event.
///
/// With [`EventRecorder::with_backpressure`] every n-th call is declined, which
/// exercises the interpreter's retry path deterministically.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Vec<OutputEvent>,
    decline_every: Option<usize>,
    calls: usize,
    declined: usize,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backpressure(every: usize) -> Self {
        Self {
            decline_every: Some(every.max(2)),
            ..Self::default()
        }
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<OutputEvent> {
        self.events
    }

    pub fn declined(&self) -> usize {
        self.declined
    }

    /// Concatenated text of all text events that are not part of an
    /// attribute, comment or processing instruction.
    pub fn text(&self) -> String {
        let mut depth = 0usize;
        let mut out = String::new();
        for event in &self.events {
            match event {
                OutputEvent::Begin { node_type, .. } if *node_type != NodeType::Element => depth += 1,
                OutputEvent::End(node_type) if *node_type != NodeType::Element => {
                    depth = depth.saturating_sub(1)
                }
                OutputEvent::Text(text) if depth == 0 => out.push_str(text),
                _ => {}
            }
        }
        out
    }

    fn accept(&mut self) -> bool {
        self.calls += 1;
        match self.decline_every {
            Some(n) if self.calls % n == 0 => {
                self.declined += 1;
                false
            }
            _ => true,
        }
    }
}

impl RecordOutput for EventRecorder {
    fn begin_event(&mut self, node_type: NodeType, prefix: &str, name: &str, value: &str, empty: bool) -> bool {
        if !self.accept() {
            return false;
        }
        self.events.push(OutputEvent::Begin {
            node_type,
            prefix: prefix.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            empty,
        });
        true
    }

    fn text_event(&mut self, text: &str) -> bool {
        if !self.accept() {
            return false;
        }
        self.events.push(OutputEvent::Text(text.to_string()));
        true
    }

    fn end_event(&mut self, node_type: NodeType) -> bool {
        if !self.accept() {
            return false;
        }
        self.events.push(OutputEvent::End(node_type));
        true
    }
}

#[derive(Debug)]
struct PendingLeaf {
    node_type: NodeType,
    prefix: String,
    name: String,
    value: String,
    text: String,
}

/// Captures events into a detached tree fragment, the value of a variable or
/// parameter defined by its content.
#[derive(Debug)]
pub struct NavigatorOutput {
    builder: TreeBuilder,
    leaf: Option<PendingLeaf>,
    error: Option<TreeError>,
}

impl Default for NavigatorOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigatorOutput {
    pub fn new() -> Self {
        Self {
            builder: TreeBuilder::new(""),
            leaf: None,
            error: None,
        }
    }

    /// Finishes the fragment and returns a navigator on its root, or the
    /// first event that could not be applied.
    pub fn finish(self) -> Result<Navigator, TreeError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let doc = self.builder.finish()?;
        Ok(Document::root(&doc))
    }

    fn apply(&mut self, result: Result<(), TreeError>) {
        match result {
            Ok(()) => {}
            // Late attributes and namespaces are dropped, as XSLT allows.
            Err(e @ (TreeError::LateAttribute(_) | TreeError::LateNamespace(_))) => {
                log::warn!("Ignoring output event: {}", e)
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
    }
}

impl RecordOutput for NavigatorOutput {
    fn begin_event(&mut self, node_type: NodeType, prefix: &str, name: &str, value: &str, _empty: bool) -> bool {
        let result = match node_type {
            NodeType::Element => self.builder.start_element(prefix, name, value),
            NodeType::Namespace => self.builder.namespace(name, value),
            NodeType::Root | NodeType::Text => Ok(()),
            NodeType::Attribute | NodeType::Comment | NodeType::ProcessingInstruction => {
                self.leaf = Some(PendingLeaf {
                    node_type,
                    prefix: prefix.to_string(),
                    name: name.to_string(),
                    value: value.to_string(),
                    text: String::new(),
                });
                Ok(())
            }
        };
        self.apply(result);
        true
    }

    fn text_event(&mut self, text: &str) -> bool {
        let result = match self.leaf.as_mut() {
            Some(leaf) => {
                leaf.text.push_str(text);
                Ok(())
            }
            None => self.builder.text(text),
        };
        self.apply(result);
        true
    }

    fn end_event(&mut self, node_type: NodeType) -> bool {
        let result = match node_type {
            NodeType::Element => self.builder.end_element(),
            _ => match self.leaf.take() {
                Some(leaf) => match leaf.node_type {
                    NodeType::Attribute => {
                        self.builder
                            .attribute(&leaf.prefix, &leaf.name, &leaf.value, &leaf.text)
                    }
                    NodeType::Comment => self.builder.comment(&leaf.text),
                    _ => self.builder.processing_instruction(&leaf.name, &leaf.text),
                },
                None => Ok(()),
            },
        };
        self.apply(result);
        true
    }
}

#[derive(Debug)]
struct OpenTag {
    name: String,
    attributes: Vec<(String, String)>,
}

/// Serializes events as XML text.
///
/// Start tags are held back until the first content event so attributes and
/// namespace declarations can still be added; an element without content is
/// written as an empty tag. Declarations already in scope are not repeated.
pub struct XmlSerializer {
    writer: Writer<Vec<u8>>,
    open: Option<OpenTag>,
    names: Vec<String>,
    scopes: Vec<Vec<(String, String)>>,
    leaf: Option<PendingLeaf>,
    error: Option<String>,
}

impl Default for XmlSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlSerializer {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            open: None,
            names: Vec::new(),
            scopes: vec![Vec::new()],
            leaf: None,
            error: None,
        }
    }

    pub fn finish(mut self) -> Result<String, RuntimeError> {
        self.flush_open();
        if let Some(message) = self.error {
            return Err(RuntimeError::Conversion {
                value: message,
                target: "XML text".into(),
            });
        }
        String::from_utf8(self.writer.into_inner()).map_err(|e| RuntimeError::Conversion {
            value: e.to_string(),
            target: "UTF-8".into(),
        })
    }

    fn write(&mut self, event: Event<'_>) {
        if let Err(e) = self.writer.write_event(event) {
            self.error.get_or_insert(e.to_string());
        }
    }

    fn in_scope(&self, prefix: &str) -> &str {
        self.scopes
            .last()
            .and_then(|scope| scope.iter().rev().find(|(p, _)| p == prefix))
            .map(|(_, uri)| uri.as_str())
            .unwrap_or("")
    }

    /// Adds a declaration to the open tag unless the binding is in scope.
    fn declare(&mut self, prefix: &str, uri: &str) {
        if prefix == "xml" || self.in_scope(prefix) == uri {
            return;
        }
        let Some(tag) = self.open.as_mut() else {
            log::warn!("Ignoring namespace '{}' declared after element content", prefix);
            return;
        };
        let attr = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{}", prefix)
        };
        if tag.attributes.iter().any(|(name, _)| *name == attr) {
            return;
        }
        tag.attributes.push((attr, uri.to_string()));
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((prefix.to_string(), uri.to_string()));
        }
    }

    fn flush_open(&mut self) {
        if let Some(tag) = self.open.take() {
            let mut start = BytesStart::new(tag.name);
            for (name, value) in &tag.attributes {
                start.push_attribute((name.as_str(), value.as_str()));
            }
            self.write(Event::Start(start));
        }
    }

    fn qualified(prefix: &str, name: &str) -> String {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", prefix, name)
        }
    }
}

impl RecordOutput for XmlSerializer {
    fn begin_event(&mut self, node_type: NodeType, prefix: &str, name: &str, value: &str, _empty: bool) -> bool {
        match node_type {
            NodeType::Element => {
                self.flush_open();
                let inherited = self.scopes.last().cloned().unwrap_or_default();
                self.scopes.push(inherited);
                let qualified = Self::qualified(prefix, name);
                self.names.push(qualified.clone());
                self.open = Some(OpenTag {
                    name: qualified,
                    attributes: Vec::new(),
                });
                self.declare(prefix, value);
            }
            NodeType::Namespace => self.declare(name, value),
            NodeType::Root | NodeType::Text => {}
            NodeType::Attribute | NodeType::Comment | NodeType::ProcessingInstruction => {
                self.leaf = Some(PendingLeaf {
                    node_type,
                    prefix: prefix.to_string(),
                    name: name.to_string(),
                    value: value.to_string(),
                    text: String::new(),
                });
            }
        }
        true
    }

    fn text_event(&mut self, text: &str) -> bool {
        if let Some(leaf) = self.leaf.as_mut() {
            leaf.text.push_str(text);
            return true;
        }
        self.flush_open();
        self.write(Event::Text(BytesText::new(text)));
        true
    }

    fn end_event(&mut self, node_type: NodeType) -> bool {
        match node_type {
            NodeType::Element => {
                match self.open.take() {
                    Some(tag) => {
                        let mut start = BytesStart::new(tag.name);
                        for (name, value) in &tag.attributes {
                            start.push_attribute((name.as_str(), value.as_str()));
                        }
                        self.write(Event::Empty(start));
                    }
                    None => {
                        if let Some(name) = self.names.last().cloned() {
                            self.write(Event::End(BytesEnd::new(name)));
                        }
                    }
                }
                self.names.pop();
                self.scopes.pop();
            }
            _ => {
                let Some(leaf) = self.leaf.take() else {
                    return true;
                };
                match leaf.node_type {
                    NodeType::Attribute => {
                        if !leaf.value.is_empty() {
                            self.declare(&leaf.prefix, &leaf.value);
                        }
                        match self.open.as_mut() {
                            Some(tag) => {
                                let name = Self::qualified(&leaf.prefix, &leaf.name);
                                tag.attributes.retain(|(n, _)| *n != name);
                                tag.attributes.push((name, leaf.text));
                            }
                            None => log::warn!("Ignoring attribute '{}' written after element content", leaf.name),
                        }
                    }
                    NodeType::Comment => {
                        self.flush_open();
                        self.write(Event::Comment(BytesText::from_escaped(leaf.text)));
                    }
                    _ => {
                        self.flush_open();
                        let content = if leaf.text.is_empty() {
                            leaf.name
                        } else {
                            format!("{} {}", leaf.name, leaf.text)
                        };
                        self.write(Event::PI(BytesPI::new(content)));
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(sink: &mut dyn RecordOutput) {
        sink.begin_event(NodeType::Element, "", "doc", "", false);
        sink.begin_event(NodeType::Namespace, "", "p", "urn:p", false);
        sink.end_event(NodeType::Namespace);
        sink.begin_event(NodeType::Attribute, "", "id", "", false);
        sink.text_event("a<b");
        sink.end_event(NodeType::Attribute);
        sink.begin_event(NodeType::Element, "p", "item", "urn:p", false);
        sink.text_event("x & y");
        sink.end_event(NodeType::Element);
        sink.begin_event(NodeType::Element, "", "empty", "", true);
        sink.end_event(NodeType::Element);
        sink.end_event(NodeType::Element);
    }

    #[test]
    fn test_serializer_writes_xml() {
        let mut serializer = XmlSerializer::new();
        feed(&mut serializer);
        assert_eq!(
            serializer.finish().unwrap(),
            r#"<doc xmlns:p="urn:p" id="a&lt;b"><p:item>x &amp; y</p:item><empty/></doc>"#
        );
    }

    #[test]
    fn test_fragment_capture() {
        let mut capture = NavigatorOutput::new();
        feed(&mut capture);
        let root = capture.finish().unwrap();
        let doc = root.children().remove(0);
        assert_eq!(doc.local_name(), "doc");
        assert_eq!(doc.attributes()[0].value(), "a<b");
        assert_eq!(doc.lookup_namespace("p").as_deref(), Some("urn:p"));
        assert_eq!(root.value(), "x & y");
    }

    #[test]
    fn test_fragment_capture_drops_late_attributes() {
        let mut capture = NavigatorOutput::new();
        capture.begin_event(NodeType::Element, "", "a", "", false);
        capture.text_event("t");
        capture.begin_event(NodeType::Attribute, "", "late", "", false);
        capture.text_event("v");
        capture.end_event(NodeType::Attribute);
        capture.begin_event(NodeType::Namespace, "", "p", "urn:p", true);
        capture.end_event(NodeType::Namespace);
        capture.end_event(NodeType::Element);
        let root = capture.finish().unwrap();
        let a = root.children().remove(0);
        assert!(a.attributes().is_empty());
        assert_eq!(a.lookup_namespace("p"), None);
        assert_eq!(a.value(), "t");
    }

    #[test]
    fn test_fragment_capture_reports_unbalanced_end() {
        let mut capture = NavigatorOutput::new();
        capture.text_event("t");
        capture.end_event(NodeType::Element);
        capture.begin_event(NodeType::Element, "", "a", "", true);
        capture.end_event(NodeType::Element);
        assert!(matches!(capture.finish(), Err(TreeError::Builder(_))));
    }

    #[test]
    fn test_recorder_backpressure_declines_every_nth_call() {
        let mut recorder = EventRecorder::with_backpressure(3);
        assert!(recorder.text_event("a"));
        assert!(recorder.text_event("b"));
        assert!(!recorder.text_event("c"));
        assert!(recorder.text_event("c"));
        assert_eq!(recorder.declined(), 1);
        assert_eq!(recorder.text(), "abc");
    }
}
