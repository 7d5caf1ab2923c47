//! `xsl:variable`, `xsl:param` and `xsl:with-param`.
//!
//! All three bind a name to either the value of their `select` expression or
//! the tree fragment their content produces. Content is run with the output
//! redirected into a capture, which is popped once the content frames are
//! done.

use super::Action;
use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use crate::frame::{ActivationFrame, FrameState};
use crate::output::RecordOutput;
use crate::processor::Processor;
use crate::stylesheet::QueryKey;
use xform_tree::ExpandedName;
use xform_xpath::Value;

/// A name with its value definition.
#[derive(Debug)]
pub struct Binding {
    pub name: ExpandedName,
    pub select: Option<QueryKey>,
    pub content: Vec<Action>,
}

impl Binding {
    fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut name = None;
        let mut select = None;
        compiler.compile_attributes(|c, attr, value| {
            match attr {
                "name" => name = Some(c.resolve_qname(value)?),
                "select" => select = Some(c.add_query(value)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        let Some(name) = name else {
            return Err(CompileError::MissingAttribute {
                element: compiler.element_name(),
                attribute: "name".into(),
            });
        };
        if select.is_some() && !compiler.significant_children().is_empty() {
            return Err(CompileError::SelectAndContent(compiler.element_name()));
        }
        let content = compiler.compile_template_content()?;
        Ok(Self { name, select, content })
    }

    /// Advances the evaluation; returns the value once it is known.
    fn evaluate<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<Option<Value>, RuntimeError> {
        match frame.state {
            FrameState::Initialized => {
                if let Some(select) = self.select {
                    return processor.run_query(frame, select).map(Some);
                }
                if self.content.is_empty() {
                    return Ok(Some(Value::String(String::new())));
                }
                processor.push_output();
                processor.push_children(&self.content, frame.node_set.clone());
                frame.state = FrameState::ProcessingChildren;
                Ok(None)
            }
            FrameState::ProcessingChildren => {
                let fragment = processor.pop_output()?;
                Ok(Some(Value::NodeSet(vec![fragment])))
            }
            _ => Ok(None),
        }
    }
}

/// Where a variable is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableScope {
    /// Top level: visible everywhere after it has been bound.
    Global,
    /// Visible to the following siblings and their descendants.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Variable,
    /// Takes the value supplied by the caller, if any, before its default.
    Param,
}

#[derive(Debug)]
pub struct VariableAction {
    pub name: ExpandedName,
    pub binding: Binding,
    pub scope: VariableScope,
    pub kind: VariableKind,
}

impl VariableAction {
    pub(crate) fn compile(compiler: &mut Compiler, scope: VariableScope) -> Result<Self, CompileError> {
        let kind = if compiler.input().local_name() == "param" {
            VariableKind::Param
        } else {
            VariableKind::Variable
        };
        let binding = Binding::compile(compiler)?;
        Ok(Self {
            name: binding.name.clone(),
            binding,
            scope,
            kind,
        })
    }

    fn supplied(&self, processor: &Processor<'_, impl RecordOutput>) -> Option<Value> {
        match (self.kind, self.scope) {
            (VariableKind::Variable, _) => None,
            (VariableKind::Param, VariableScope::Global) => processor.global_parameter(&self.name),
            (VariableKind::Param, VariableScope::Local) => processor.get_parameter(&self.name),
        }
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        let supplied = match frame.state {
            FrameState::Initialized => self.supplied(processor),
            _ => None,
        };
        let value = match supplied {
            Some(value) => Some(value),
            None => self.binding.evaluate(processor, frame)?,
        };
        if let Some(value) = value {
            log::trace!("${} = {}", self.name, value.type_name());
            processor.bind_variable(self.name.clone(), value, self.scope);
            frame.finish();
        }
        Ok(())
    }
}

/// `xsl:with-param`: binds into the parameter set of the enclosing
/// `apply-templates` or `call-template`.
#[derive(Debug)]
pub struct WithParamAction {
    pub binding: Binding,
}

impl WithParamAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        Ok(Self {
            binding: Binding::compile(compiler)?,
        })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        if let Some(value) = self.binding.evaluate(processor, frame)? {
            processor.set_parameter(self.binding.name.clone(), value);
            frame.finish();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stylesheet::Stylesheet;

    fn compile(body: &str) -> Result<Stylesheet, CompileError> {
        Stylesheet::compile(&format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template name="t"><xsl:param name="x"/></xsl:template>
                <xsl:template match="/">{}</xsl:template>
            </xsl:stylesheet>"#,
            body
        ))
    }

    #[test]
    fn test_select_and_content_is_rejected() {
        let body = r#"<xsl:call-template name="t"><xsl:with-param name="x" select="'5'">five</xsl:with-param></xsl:call-template>"#;
        assert!(matches!(compile(body), Err(CompileError::SelectAndContent(name)) if name == "xsl:with-param"));
        let body = r#"<xsl:variable name="v" select="1"><b/></xsl:variable>"#;
        assert!(matches!(compile(body), Err(CompileError::SelectAndContent(_))));
    }

    #[test]
    fn test_whitespace_content_does_not_count() {
        let body = r#"<xsl:call-template name="t"><xsl:with-param name="x" select="'5'">
        </xsl:with-param></xsl:call-template>"#;
        assert!(compile(body).is_ok());
    }

    #[test]
    fn test_name_is_required() {
        assert!(matches!(
            compile(r#"<xsl:variable select="1"/>"#),
            Err(CompileError::MissingAttribute { attribute, .. }) if attribute == "name"
        ));
    }
}
