use super::Action;
use crate::avt::Avt;
use crate::compiler::Compiler;
use crate::error::{CompileError, NameError, RuntimeError};
use crate::frame::{ActivationFrame, FrameState};
use crate::output::RecordOutput;
use crate::processor::Processor;
use crate::qname::XSLT_NAMESPACE;
use crate::stylesheet::QueryKey;
use xform_tree::{NamespaceScope, NodeType};

/// Literal text, from `xsl:text` or from text in a template body.
#[derive(Debug, Clone, PartialEq)]
pub struct TextAction {
    pub text: String,
}

impl TextAction {
    pub fn literal(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// `xsl:text`. Unlike template text, whitespace-only content is kept.
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        compiler.compile_attributes(|_, attr, _| Ok(attr == "disable-output-escaping"))?;
        let mut text = String::new();
        for child in compiler.input().children() {
            match child.node_type() {
                NodeType::Text => text.push_str(&child.value()),
                NodeType::Element => {
                    return Err(CompileError::UnexpectedElement {
                        element: compiler.element_name(),
                        child: child.name(),
                    });
                }
                _ => {}
            }
        }
        Ok(Self { text })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        if self.text.is_empty() || processor.text_event(&self.text) {
            frame.finish();
        }
        Ok(())
    }
}

/// `xsl:value-of`. The string is computed once and kept in the frame, so a
/// declined text event is retried without evaluating again.
#[derive(Debug)]
pub struct ValueOfAction {
    pub select: QueryKey,
}

impl ValueOfAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut select = None;
        compiler.compile_attributes(|c, attr, value| {
            match attr {
                "select" => select = Some(c.add_query(value)?),
                "disable-output-escaping" => {}
                _ => return Ok(false),
            }
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
        if frame.state == FrameState::Initialized {
            frame.stored_output = Some(processor.run_query(frame, self.select)?.to_string());
            frame.state = FrameState::ResultStored;
        }
        let text = frame.stored_output.as_deref().unwrap_or_default();
        if text.is_empty() || processor.text_event(text) {
            frame.finish();
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct LiteralAttribute {
    pub prefix: String,
    pub local: String,
    pub namespace: String,
    pub value: Avt,
}

/// An element in the stylesheet that is not an instruction: it is output as
/// is, with its attributes as value templates.
#[derive(Debug)]
pub struct LiteralElementAction {
    pub prefix: String,
    pub local: String,
    pub namespace: String,
    /// Namespace declarations to replicate, as (prefix, URI).
    pub namespaces: Vec<(String, String)>,
    pub attributes: Vec<LiteralAttribute>,
    pub content: Vec<Action>,
}

impl LiteralElementAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let input = compiler.input().clone();
        let mut excluded = Vec::new();
        let mut attributes = Vec::new();
        for attr in input.attributes() {
            if attr.namespace_uri() == XSLT_NAMESPACE {
                if attr.local_name() == "exclude-result-prefixes" {
                    excluded = excluded_uris(compiler, &attr.value())?;
                }
                continue;
            }
            attributes.push(LiteralAttribute {
                prefix: attr.prefix().to_string(),
                local: attr.local_name().to_string(),
                namespace: attr.namespace_uri().to_string(),
                value: Avt::compile(compiler, &attr.value())?,
            });
        }
        let namespaces = input
            .namespaces(NamespaceScope::ExcludeXml)
            .into_iter()
            .map(|ns| (ns.local_name().to_string(), ns.value()))
            .filter(|(_, uri)| !compiler.is_excluded_namespace(uri) && !excluded.contains(uri))
            .collect();
        let content = compiler.compile_template_content()?;
        Ok(Self {
            prefix: input.prefix().to_string(),
            local: input.local_name().to_string(),
            namespace: input.namespace_uri().to_string(),
            namespaces,
            attributes,
            content,
        })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        match frame.state {
            FrameState::Initialized => {
                let empty = self.content.is_empty();
                if processor.begin_event(NodeType::Element, &self.prefix, &self.local, &self.namespace, empty) {
                    frame.counter = 0;
                    frame.state = FrameState::NamespaceBegin;
                }
            }
            FrameState::NamespaceBegin => match self.namespaces.get(frame.counter) {
                Some((prefix, uri)) => {
                    if processor.begin_event(NodeType::Namespace, "", prefix, uri, true) {
                        frame.state = FrameState::NamespaceEnd;
                    }
                }
                None => {
                    frame.counter = 0;
                    frame.state = FrameState::Attributes;
                }
            },
            FrameState::NamespaceEnd => {
                if processor.end_event(NodeType::Namespace) {
                    frame.counter += 1;
                    frame.state = FrameState::NamespaceBegin;
                }
            }
            FrameState::Attributes => match self.attributes.get(frame.counter) {
                Some(attribute) => {
                    frame.stored_output = Some(processor.evaluate_avt(frame, &attribute.value)?);
                    frame.state = FrameState::AttributeBegin;
                }
                None => {
                    processor.push_children(&self.content, frame.node_set.clone());
                    frame.state = FrameState::EndEvent;
                }
            },
            FrameState::AttributeBegin => {
                let attribute = &self.attributes[frame.counter];
                if processor.begin_event(
                    NodeType::Attribute,
                    &attribute.prefix,
                    &attribute.local,
                    &attribute.namespace,
                    false,
                ) {
                    frame.state = FrameState::AttributeText;
                }
            }
            FrameState::AttributeText => {
                let value = frame.stored_output.as_deref().unwrap_or_default();
                if processor.text_event(value) {
                    frame.state = FrameState::AttributeEnd;
                }
            }
            FrameState::AttributeEnd => {
                if processor.end_event(NodeType::Attribute) {
                    frame.counter += 1;
                    frame.stored_output = None;
                    frame.state = FrameState::Attributes;
                }
            }
            FrameState::EndEvent => {
                if processor.end_event(NodeType::Element) {
                    frame.finish();
                }
            }
            _ => frame.finish(),
        }
        Ok(())
    }
}

fn excluded_uris(compiler: &Compiler, list: &str) -> Result<Vec<String>, CompileError> {
    list.split_whitespace()
        .map(|prefix| {
            let prefix = if prefix == "#default" { "" } else { prefix };
            compiler
                .input()
                .lookup_namespace(prefix)
                .ok_or_else(|| CompileError::from(NameError::UndefinedPrefix(prefix.to_string())))
        })
        .collect()
}

/// The built-in rule for text and attribute nodes.
pub(super) fn builtin_text<'s, O: RecordOutput>(
    processor: &mut Processor<'s, O>,
    frame: &mut ActivationFrame<'s>,
) -> Result<(), RuntimeError> {
    let value = frame.node()?.value();
    if value.is_empty() || processor.text_event(&value) {
        frame.finish();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stylesheet::Stylesheet;

    fn root_body(sheet: &Stylesheet) -> &[Action] {
        match sheet.find_template_for(&None, |_| Ok(true)) {
            Ok(Some(Action::Template(template))) => &template.content,
            _ => panic!("no root template"),
        }
    }

    #[test]
    fn test_literal_element_drops_xslt_namespace() {
        let sheet = Stylesheet::compile(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:p="urn:p" xmlns:x="urn:x" exclude-result-prefixes="x">
                <xsl:template match="/"><p:out id="{1 + 1}" xsl:use-attribute-sets="none">a</p:out></xsl:template>
            </xsl:stylesheet>"#,
        )
        .unwrap();
        let [Action::LiteralElement(element)] = root_body(&sheet) else {
            panic!("expected a single literal element");
        };
        assert_eq!(element.namespace, "urn:p");
        assert_eq!(element.namespaces, vec![("p".to_string(), "urn:p".to_string())]);
        assert_eq!(element.attributes.len(), 1);
        assert!(element.attributes[0].value.as_literal().is_none());
        assert_eq!(element.content.len(), 1);
    }

    #[test]
    fn test_xsl_text_keeps_whitespace() {
        let sheet = Stylesheet::compile(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="/"><xsl:text>  </xsl:text></xsl:template>
            </xsl:stylesheet>"#,
        )
        .unwrap();
        assert!(matches!(root_body(&sheet), [Action::Text(text)] if text.text == "  "));
    }
}
