//! Compiled instructions.
//!
//! Every instruction of a stylesheet compiles to one [`Action`]. Actions are
//! immutable once built; all per-invocation state lives in the
//! [`ActivationFrame`] the processor creates when the action starts running.
//! `execute` advances that frame by a bounded amount of work and returns,
//! pushing child frames for anything that would otherwise recurse.

mod apply_templates;
mod call_template;
mod control_flow;
mod copy;
mod literals;
mod template;
mod variables;

pub use apply_templates::{ApplyTemplatesAction, SortAction, SortSpec};
pub use call_template::CallTemplateAction;
pub use control_flow::IfAction;
pub use copy::{CopyAction, CopyOfAction};
pub use literals::{LiteralAttribute, LiteralElementAction, TextAction, ValueOfAction};
pub use template::{RootAction, TemplateAction};
pub use variables::{Binding, VariableAction, VariableKind, VariableScope, WithParamAction};

use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use crate::frame::ActivationFrame;
use crate::output::RecordOutput;
use crate::processor::Processor;
use crate::qname::XSLT_NAMESPACE;

#[derive(Debug)]
pub enum Action {
    Root(RootAction),
    Template(TemplateAction),
    ApplyTemplates(ApplyTemplatesAction),
    CallTemplate(CallTemplateAction),
    Copy(CopyAction),
    CopyOf(CopyOfAction),
    /// Replicates the in-scope namespaces of the context element.
    CopyNamespaces,
    /// Deep-copies the frame's node list.
    CopyNodeSet,
    WithParam(WithParamAction),
    Variable(VariableAction),
    ValueOf(ValueOfAction),
    Text(TextAction),
    LiteralElement(LiteralElementAction),
    If(IfAction),
    Sort(SortAction),
    /// Built-in rule for roots and elements: apply templates to the children
    /// in the current mode.
    BuiltInTemplates,
    /// Built-in rule for text and attributes: output the string value.
    BuiltInText,
    /// A plain sequence, e.g. the fallback of an unknown instruction.
    Container(Vec<Action>),
}

impl Action {
    /// Compiles the element the compiler is positioned on. Returns `None` for
    /// elements that produce no action.
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Option<Action>, CompileError> {
        let input = compiler.input().clone();
        if input.namespace_uri() != XSLT_NAMESPACE {
            return Ok(Some(Action::LiteralElement(LiteralElementAction::compile(compiler)?)));
        }
        let action = match input.local_name() {
            "apply-templates" => Action::ApplyTemplates(ApplyTemplatesAction::compile(compiler)?),
            "call-template" => Action::CallTemplate(CallTemplateAction::compile(compiler)?),
            "copy" => Action::Copy(CopyAction::compile(compiler)?),
            "copy-of" => Action::CopyOf(CopyOfAction::compile(compiler)?),
            "value-of" => Action::ValueOf(ValueOfAction::compile(compiler)?),
            "text" => Action::Text(TextAction::compile(compiler)?),
            "variable" => Action::Variable(VariableAction::compile(compiler, VariableScope::Local)?),
            "if" => Action::If(IfAction::compile(compiler)?),
            "fallback" => return Ok(None),
            "param" | "with-param" | "sort" | "template" | "key" | "decimal-format" => {
                return Err(CompileError::UnexpectedElement {
                    element: input.parent().map(|p| p.name()).unwrap_or_default(),
                    child: input.name(),
                });
            }
            other if compiler.forward_compatible() => {
                log::warn!("Unknown instruction <xsl:{}>, using its fallback", other);
                Action::Container(compile_fallback(compiler)?)
            }
            other => return Err(CompileError::UnknownInstruction(format!("xsl:{}", other))),
        };
        Ok(Some(action))
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        match self {
            Action::Root(action) => action.execute(processor, frame),
            Action::Template(action) => action.execute(processor, frame),
            Action::ApplyTemplates(action) => action.execute(processor, frame),
            Action::CallTemplate(action) => action.execute(processor, frame),
            Action::Copy(action) => action.execute(processor, frame),
            Action::CopyOf(action) => action.execute(processor, frame),
            Action::CopyNamespaces => copy::copy_namespaces(processor, frame),
            Action::CopyNodeSet => copy::copy_node_set(processor, frame),
            Action::WithParam(action) => action.execute(processor, frame),
            Action::Variable(action) => action.execute(processor, frame),
            Action::ValueOf(action) => action.execute(processor, frame),
            Action::Text(action) => action.execute(processor, frame),
            Action::LiteralElement(action) => action.execute(processor, frame),
            Action::If(action) => action.execute(processor, frame),
            Action::Sort(action) => action.execute(processor, frame),
            Action::BuiltInTemplates => apply_templates::builtin_templates(processor, frame),
            Action::BuiltInText => literals::builtin_text(processor, frame),
            Action::Container(children) => {
                processor.push_children(children, frame.node_set.clone());
                frame.finish();
                Ok(())
            }
        }
    }
}

/// The content of every `xsl:fallback` child, in order.
fn compile_fallback(compiler: &mut Compiler) -> Result<Vec<Action>, CompileError> {
    let mut actions = Vec::new();
    for child in compiler.input().children() {
        if Compiler::is_xslt(&child, "fallback") {
            actions.extend(compiler.with_input(child, Compiler::compile_template_content)?);
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stylesheet::Stylesheet;

    fn sheet(body: &str, version: &str) -> Result<Stylesheet, CompileError> {
        Stylesheet::compile(&format!(
            r#"<xsl:stylesheet version="{}" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                <xsl:template match="/">{}</xsl:template>
            </xsl:stylesheet>"#,
            version, body
        ))
    }

    #[test]
    fn test_misplaced_instructions_are_rejected() {
        assert!(matches!(
            sheet(r#"<xsl:sort select="."/>"#, "1.0"),
            Err(CompileError::UnexpectedElement { child, .. }) if child == "xsl:sort"
        ));
        assert!(matches!(
            sheet(r#"<out/><xsl:param name="late"/>"#, "1.0"),
            Err(CompileError::UnexpectedElement { .. })
        ));
    }

    #[test]
    fn test_unknown_instruction_uses_fallback_when_forward_compatible() {
        let body = r#"<xsl:future><xsl:fallback>old</xsl:fallback></xsl:future>"#;
        assert!(matches!(sheet(body, "1.0"), Err(CompileError::UnknownInstruction(_))));
        let compiled = sheet(body, "3.0").unwrap();
        let Ok(Some(Action::Template(template))) = compiled.find_template_for(&None, |_| Ok(true)) else {
            panic!("expected the root template");
        };
        assert!(matches!(&template.content[..], [Action::Container(fallback)] if fallback.len() == 1));
    }
}
