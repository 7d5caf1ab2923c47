use super::Action;
use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use crate::frame::ActivationFrame;
use crate::output::RecordOutput;
use crate::processor::Processor;
use crate::stylesheet::QueryKey;

#[derive(Debug)]
pub struct IfAction {
    pub test: QueryKey,
    pub content: Vec<Action>,
}

impl IfAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut test = None;
        compiler.compile_attributes(|c, attr, value| {
            if attr != "test" {
                return Ok(false);
            }
            test = Some(c.add_query(value)?);
            Ok(true)
        })?;
        let Some(test) = test else {
            return Err(CompileError::MissingAttribute {
                element: compiler.element_name(),
                attribute: "test".into(),
            });
        };
        let content = compiler.compile_template_content()?;
        Ok(Self { test, content })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        // The content runs in its own container frame, so this one is done
        // either way.
        if processor.run_query(frame, self.test)?.to_bool() {
            processor.push_children(&self.content, frame.node_set.clone());
        }
        frame.finish();
        Ok(())
    }
}
