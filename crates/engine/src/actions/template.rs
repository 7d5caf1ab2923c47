use super::{Action, LiteralElementAction, VariableAction, VariableScope};
use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use crate::frame::{ActivationFrame, FrameState, Mode};
use crate::output::RecordOutput;
use crate::processor::Processor;
use crate::stylesheet::QueryKey;
use xform_tree::ExpandedName;

/// `xsl:template`: a container whose leading `xsl:param` children declare its
/// parameters.
#[derive(Debug)]
pub struct TemplateAction {
    pub name: Option<ExpandedName>,
    pub pattern: Option<QueryKey>,
    pub mode: Mode,
    pub priority: Option<f64>,
    pub content: Vec<Action>,
}

impl TemplateAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut name = None;
        let mut pattern = None;
        let mut mode = None;
        let mut priority = None;
        compiler.compile_attributes(|c, attr, value| {
            match attr {
                "name" => name = Some(c.resolve_qname(value)?),
                "match" => pattern = Some(c.add_pattern(value)?),
                "mode" => mode = c.resolve_mode(value)?,
                "priority" => {
                    let parsed = value.trim().parse::<f64>().map_err(|_| CompileError::InvalidAttributeValue {
                        attribute: attr.to_string(),
                        value: value.to_string(),
                    })?;
                    priority = Some(parsed);
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        compiler.check_required_attribute(name.is_some() || pattern.is_some(), "match")?;
        if pattern.is_none() && mode.is_some() {
            log::warn!("Template {:?} has a mode but no match pattern", name);
        }
        let content = compile_body(compiler)?;
        Ok(Self {
            name,
            pattern,
            mode,
            priority,
            content,
        })
    }

    /// The implicit template of a stylesheet that is a single literal result
    /// element: it matches the root and its body is that element.
    pub(crate) fn for_root(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let pattern = compiler.add_pattern("/")?;
        let body = LiteralElementAction::compile(compiler)?;
        Ok(Self {
            name: None,
            pattern: Some(pattern),
            mode: None,
            priority: None,
            content: vec![Action::LiteralElement(body)],
        })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        match frame.state {
            FrameState::Initialized => {
                log::debug!(
                    "Entering template {} with {} parameter(s)",
                    self.describe(),
                    frame.params.len()
                );
                processor.push_children(&self.content, frame.node_set.clone());
                frame.state = FrameState::ProcessChildren;
            }
            _ => frame.finish(),
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match (&self.name, self.pattern) {
            (Some(name), _) => format!("'{}'", name),
            (None, Some(key)) => format!("#{}", key),
            (None, None) => "<anonymous>".into(),
        }
    }
}

/// Compiles the parameters and the content of a template.
fn compile_body(compiler: &mut Compiler) -> Result<Vec<Action>, CompileError> {
    let mut content = Vec::new();
    let mut declared: Vec<ExpandedName> = Vec::new();
    let mut in_params = true;
    for child in compiler.significant_children() {
        if in_params && Compiler::is_xslt(&child, "param") {
            let param = compiler.with_input(child, |c| VariableAction::compile(c, VariableScope::Local))?;
            if declared.contains(&param.name) {
                return Err(CompileError::DuplicateParameter(param.name.to_string()));
            }
            declared.push(param.name.clone());
            content.push(Action::Variable(param));
            continue;
        }
        in_params = false;
        content.extend(compiler.compile_nodes(vec![child])?);
    }
    Ok(content)
}

/// Entry point of a run: binds the global variables and parameters in
/// document order, then dispatches the source root in the initial mode.
#[derive(Debug)]
pub struct RootAction {
    pub globals: Vec<Action>,
}

impl RootAction {
    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        match frame.state {
            FrameState::Initialized => {
                processor.push_children(&self.globals, frame.node_set.clone());
                frame.state = FrameState::GlobalsEvaluated;
            }
            FrameState::GlobalsEvaluated => {
                let mode = processor.config().initial_mode.clone();
                processor.push_template_lookup(frame.node_set.clone(), &mode, Vec::new())?;
                frame.state = FrameState::TemplateProcessed;
            }
            _ => frame.finish(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stylesheet::Stylesheet;

    fn wrap(templates: &str) -> String {
        format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{}</xsl:stylesheet>"#,
            templates
        )
    }

    #[test]
    fn test_leading_params_are_collected() {
        let sheet = Stylesheet::compile(&wrap(
            r#"<xsl:template name="t"><xsl:param name="a"/><xsl:param name="b" select="2"/><out/></xsl:template>"#,
        ))
        .unwrap();
        let Some(Action::Template(template)) = sheet.find_template(&ExpandedName::local("t")) else {
            panic!("template 't' missing");
        };
        assert_eq!(template.content.len(), 3);
        assert!(matches!(&template.content[1], Action::Variable(v) if v.name.local == "b"));
    }

    #[test]
    fn test_duplicate_parameter_is_rejected() {
        let result = Stylesheet::compile(&wrap(
            r#"<xsl:template name="t"><xsl:param name="a"/><xsl:param name="a"/></xsl:template>"#,
        ));
        assert!(matches!(result, Err(CompileError::DuplicateParameter(name)) if name == "a"));
    }

    #[test]
    fn test_template_needs_match_or_name() {
        let result = Stylesheet::compile(&wrap(r#"<xsl:template mode="m"/>"#));
        assert!(matches!(result, Err(CompileError::MissingAttribute { attribute, .. }) if attribute == "match"));
    }

    #[test]
    fn test_invalid_priority() {
        let result = Stylesheet::compile(&wrap(r#"<xsl:template match="a" priority="high"/>"#));
        assert!(matches!(result, Err(CompileError::InvalidAttributeValue { .. })));
    }
}
