use super::{Action, WithParamAction};
use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use crate::frame::{ActivationFrame, FrameState};
use crate::output::RecordOutput;
use crate::processor::Processor;
use xform_tree::ExpandedName;

/// `xsl:call-template`: invokes a template by name with the context node
/// unchanged.
#[derive(Debug)]
pub struct CallTemplateAction {
    pub name: ExpandedName,
    pub params: Vec<Action>,
}

impl CallTemplateAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut name = None;
        compiler.compile_attributes(|c, attr, value| {
            if attr != "name" {
                return Ok(false);
            }
            name = Some(c.resolve_qname(value)?);
            Ok(true)
        })?;
        let Some(name) = name else {
            return Err(CompileError::MissingAttribute {
                element: compiler.element_name(),
                attribute: "name".into(),
            });
        };
        let mut params = Vec::new();
        for child in compiler.significant_children() {
            if !Compiler::is_xslt(&child, "with-param") {
                return Err(CompileError::UnexpectedElement {
                    element: compiler.element_name(),
                    child: child.name(),
                });
            }
            params.push(Action::WithParam(compiler.with_input(child, WithParamAction::compile)?));
        }
        Ok(Self { name, params })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        match frame.state {
            FrameState::Initialized => {
                processor.reset_params();
                processor.push_children(&self.params, frame.node_set.clone());
                frame.state = FrameState::ProcessedChildren;
            }
            FrameState::ProcessedChildren => {
                let params = processor.take_params();
                let template = processor
                    .find_template(&self.name)
                    .ok_or_else(|| RuntimeError::UnknownTemplate(self.name.to_string()))?;
                log::debug!("call-template '{}'", self.name);
                let callee = processor.push_action_frame(template, frame.node_set.clone());
                callee.params = params;
                frame.state = FrameState::ProcessedTemplate;
            }
            _ => frame.finish(),
        }
        Ok(())
    }
}
