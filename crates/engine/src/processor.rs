//! The interpreter.
//!
//! A [`Processor`] owns an explicit stack of [`ActivationFrame`]s and keeps
//! executing the frame on top until the stack is empty. Template recursion
//! therefore grows a heap vector rather than the native call stack.
//!
//! Each step pops the top frame and lets its action advance it. Frames the
//! action pushes while running are staged and land above it once it is back
//! on the stack; a frame that reached `Finished` is simply not put back.

use crate::actions::{Action, SortSpec, VariableScope};
use crate::avt::{Avt, AvtPart};
use crate::config::ProcessorConfig;
use crate::context::ExpressionContext;
use crate::error::RuntimeError;
use crate::extension::{EXSLT_COMMON_NAMESPACE, ExsltCommon, ExtensionObject};
use crate::frame::{ActivationFrame, FrameState, FrameTarget, Mode, NodeSet};
use crate::keys::{KeyIndex, KeyTable};
use crate::output::{NavigatorOutput, RecordOutput};
use crate::stylesheet::{QueryKey, Stylesheet, TemplateRule};
use std::collections::HashMap;
use std::rc::Rc;
use xform_tree::{ExpandedName, Navigator, NodeType};
use xform_xpath::{Focus, Value};

/// Outcome of one interpreter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    /// The step made progress.
    Continue,
    /// The sink declined an event; the same step will be repeated.
    Interrupt,
    /// The stack is empty.
    Done,
}

pub type Bindings = Vec<(ExpandedName, Value)>;

pub struct Processor<'s, O: RecordOutput> {
    stylesheet: &'s Stylesheet,
    config: ProcessorConfig,
    stack: Vec<ActivationFrame<'s>>,
    pending: Vec<ActivationFrame<'s>>,
    output: O,
    captures: Vec<NavigatorOutput>,
    param_tables: Vec<Bindings>,
    sort_tables: Vec<Vec<SortSpec>>,
    globals: HashMap<ExpandedName, Value>,
    parameters: HashMap<ExpandedName, Value>,
    keys: KeyIndex,
    extensions: HashMap<String, Rc<dyn ExtensionObject>>,
    documents: HashMap<String, Navigator>,
    exec_result: ExecResult,
    steps: u64,
}

impl<'s, O: RecordOutput> Processor<'s, O> {
    pub fn new(stylesheet: &'s Stylesheet, source: Navigator, output: O) -> Self {
        Self::with_config(stylesheet, source, output, ProcessorConfig::default())
    }

    pub fn with_config(stylesheet: &'s Stylesheet, source: Navigator, output: O, config: ProcessorConfig) -> Self {
        let mut extensions: HashMap<String, Rc<dyn ExtensionObject>> = HashMap::new();
        extensions.insert(EXSLT_COMMON_NAMESPACE.to_string(), Rc::new(ExsltCommon));
        let root = ActivationFrame::new(
            FrameTarget::Action(stylesheet.root_action()),
            NodeSet::single(source.root()),
        );
        Self {
            stylesheet,
            config,
            stack: vec![root],
            pending: Vec::new(),
            output,
            captures: Vec::new(),
            param_tables: Vec::new(),
            sort_tables: Vec::new(),
            globals: HashMap::new(),
            parameters: HashMap::new(),
            keys: KeyIndex::default(),
            extensions,
            documents: HashMap::new(),
            exec_result: ExecResult::Continue,
            steps: 0,
        }
    }

    /// Supplies the value of a top-level `xsl:param`.
    pub fn set_global_parameter(&mut self, name: ExpandedName, value: impl Into<Value>) {
        self.parameters.insert(name, value.into());
    }

    pub fn register_extension(&mut self, namespace: &str, object: Rc<dyn ExtensionObject>) {
        self.extensions.insert(namespace.to_string(), object);
    }

    /// Makes a document reachable through `document(uri)`.
    pub fn add_document(&mut self, uri: &str, root: Navigator) {
        self.documents.insert(uri.to_string(), root.root());
    }

    pub fn stylesheet(&self) -> &'s Stylesheet {
        self.stylesheet
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// How many document traversals key tables have needed so far.
    pub fn key_traversals(&self) -> usize {
        self.keys.traversals()
    }

    /// Executes the frame on top of the stack once.
    pub fn step(&mut self) -> Result<ExecResult, RuntimeError> {
        let Some(mut frame) = self.stack.pop() else {
            return Ok(ExecResult::Done);
        };
        self.exec_result = ExecResult::Continue;
        self.steps += 1;
        log::trace!("Step {}: {:?} at depth {}", self.steps, frame.state, self.stack.len());

        let outcome = match frame.target {
            FrameTarget::Action(action) => action.execute(self, &mut frame),
            FrameTarget::Children(children) => execute_children(children, self, &mut frame),
        };
        if let Err(e) = outcome {
            self.stack.clear();
            self.pending.clear();
            return Err(e);
        }

        if frame.state != FrameState::Finished {
            self.stack.push(frame);
        }
        self.stack.append(&mut self.pending);
        if let Some(limit) = self.config.max_depth
            && self.stack.len() > limit
        {
            self.stack.clear();
            return Err(RuntimeError::DepthLimitExceeded(limit));
        }
        if self.stack.is_empty() {
            Ok(ExecResult::Done)
        } else {
            Ok(self.exec_result)
        }
    }

    /// Runs to completion, retrying declined events.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.step()? != ExecResult::Done {}
        log::debug!("Transformation finished after {} steps", self.steps);
        Ok(())
    }

    /// Stages a frame for `action`; it lands on the stack above the frame
    /// currently executing.
    pub fn push_action_frame(&mut self, action: &'s Action, node_set: NodeSet) -> &mut ActivationFrame<'s> {
        self.pending
            .push(ActivationFrame::new(FrameTarget::Action(action), node_set));
        let last = self.pending.len() - 1;
        &mut self.pending[last]
    }

    /// Stages a generic container frame running `children` in order.
    pub fn push_children(&mut self, children: &'s [Action], node_set: NodeSet) {
        if !children.is_empty() {
            self.pending
                .push(ActivationFrame::new(FrameTarget::Children(children), node_set));
        }
    }

    pub fn find_template(&self, name: &ExpandedName) -> Option<&'s Action> {
        let stylesheet = self.stylesheet;
        stylesheet.find_template(name)
    }

    /// Dispatches the current node of `node_set` to the best template of
    /// `mode`, falling back to the built-in rules.
    pub fn push_template_lookup(&mut self, node_set: NodeSet, mode: &Mode, params: Bindings) -> Result<(), RuntimeError> {
        let node = node_set.current().cloned().ok_or(RuntimeError::NoContextNode)?;
        let stylesheet = self.stylesheet;
        let template = stylesheet.find_template_for(mode, |rule| self.rule_matches(rule, &node))?;
        let action = match template {
            Some(action) => {
                log::debug!("Dispatching {:?} to a template in mode {:?}", node, mode);
                action
            }
            None => match stylesheet.builtin_for(node.node_type()) {
                Some(action) => action,
                None => return Ok(()),
            },
        };
        let frame = self.push_action_frame(action, node_set);
        frame.mode = mode.clone();
        frame.params = params;
        Ok(())
    }

    fn rule_matches(&self, rule: &TemplateRule, node: &Navigator) -> Result<bool, RuntimeError> {
        let compiled = self.stylesheet.query(rule.query);
        let ctx = ExpressionContext::new(self, None, node.clone(), compiled);
        rule.pattern.match_node(node, &ctx)
    }

    /// Redirects output into a new tree fragment.
    pub fn push_output(&mut self) {
        self.captures.push(NavigatorOutput::new());
    }

    /// Ends the innermost capture and returns the root of its fragment.
    pub fn pop_output(&mut self) -> Result<Navigator, RuntimeError> {
        let capture = self.captures.pop().ok_or(RuntimeError::NoCapture)?;
        Ok(capture.finish()?)
    }

    fn sink(&mut self) -> &mut dyn RecordOutput {
        match self.captures.last_mut() {
            Some(capture) => capture,
            None => &mut self.output,
        }
    }

    fn accepted(&mut self, accepted: bool) -> bool {
        if !accepted {
            self.exec_result = ExecResult::Interrupt;
        }
        accepted
    }

    pub fn begin_event(&mut self, node_type: NodeType, prefix: &str, name: &str, value: &str, empty: bool) -> bool {
        let accepted = self.sink().begin_event(node_type, prefix, name, value, empty);
        self.accepted(accepted)
    }

    pub fn text_event(&mut self, text: &str) -> bool {
        let accepted = self.sink().text_event(text);
        self.accepted(accepted)
    }

    pub fn end_event(&mut self, node_type: NodeType) -> bool {
        let accepted = self.sink().end_event(node_type);
        self.accepted(accepted)
    }

    /// Opens a copy of `node`. Roots and text nodes have no begin event.
    pub fn copy_begin_event(&mut self, node: &Navigator, empty: bool) -> bool {
        match node.node_type() {
            NodeType::Element | NodeType::Attribute => {
                self.begin_event(node.node_type(), node.prefix(), node.local_name(), node.namespace_uri(), empty)
            }
            NodeType::Namespace => self.begin_event(NodeType::Namespace, "", node.local_name(), &node.value(), empty),
            NodeType::Comment => self.begin_event(NodeType::Comment, "", "", "", empty),
            NodeType::ProcessingInstruction => {
                self.begin_event(NodeType::ProcessingInstruction, "", node.local_name(), "", empty)
            }
            NodeType::Root | NodeType::Text => true,
        }
    }

    /// Emits the value of a leaf node.
    pub fn copy_text_event(&mut self, node: &Navigator) -> bool {
        match node.node_type() {
            NodeType::Attribute | NodeType::Text | NodeType::Comment | NodeType::ProcessingInstruction => {
                let value = node.value();
                self.text_event(&value)
            }
            _ => true,
        }
    }

    pub fn copy_end_event(&mut self, node: &Navigator) -> bool {
        match node.node_type() {
            NodeType::Root | NodeType::Text => true,
            other => self.end_event(other),
        }
    }

    /// Opens a fresh parameter set for an upcoming call.
    pub fn reset_params(&mut self) {
        self.param_tables.push(Vec::new());
    }

    /// Binds a `with-param` value in the innermost parameter set.
    pub fn set_parameter(&mut self, name: ExpandedName, value: Value) {
        if let Some(table) = self.param_tables.last_mut() {
            table.retain(|(n, _)| *n != name);
            table.push((name, value));
        }
    }

    pub fn take_params(&mut self) -> Bindings {
        self.param_tables.pop().unwrap_or_default()
    }

    /// The value the caller passed for `name` to the template being executed.
    pub fn get_parameter(&self, name: &ExpandedName) -> Option<Value> {
        let template = self.stack.iter().rev().find(|f| f.is_template())?;
        template.param(name).cloned()
    }

    pub(crate) fn reset_sort(&mut self) {
        self.sort_tables.push(Vec::new());
    }

    pub(crate) fn add_sort(&mut self, spec: SortSpec) {
        if let Some(table) = self.sort_tables.last_mut() {
            table.push(spec);
        }
    }

    pub(crate) fn take_sort(&mut self) -> Vec<SortSpec> {
        self.sort_tables.pop().unwrap_or_default()
    }

    pub(crate) fn global_parameter(&self, name: &ExpandedName) -> Option<Value> {
        self.parameters.get(name).cloned()
    }

    /// Binds a variable in the scope of the container that declared it, or
    /// globally.
    pub(crate) fn bind_variable(&mut self, name: ExpandedName, value: Value, scope: VariableScope) {
        if scope == VariableScope::Local
            && let Some(container) = self.stack.last_mut()
        {
            container.locals.push((name, value));
            return;
        }
        self.globals.insert(name, value);
    }

    /// Looks a variable up from `frame` outwards to the enclosing template,
    /// then among the globals. Without a frame only globals are visible.
    pub fn get_variable_value(&self, frame: Option<&ActivationFrame<'s>>, name: &ExpandedName) -> Result<Value, RuntimeError> {
        if let Some(frame) = frame {
            if let Some(value) = frame.local(name) {
                return Ok(value.clone());
            }
            for scope in self.stack.iter().rev() {
                if let Some(value) = scope.local(name) {
                    return Ok(value.clone());
                }
                if scope.is_template() {
                    break;
                }
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if self.stylesheet.is_global(name) {
            Err(RuntimeError::UnboundGlobal(name.to_string()))
        } else {
            Err(RuntimeError::UndefinedVariable(name.to_string()))
        }
    }

    /// Evaluates a query with the frame's context node as focus.
    pub fn run_query(&self, frame: &ActivationFrame<'s>, key: QueryKey) -> Result<Value, RuntimeError> {
        let focus = frame.focus()?;
        self.evaluate_at(Some(frame), key, &focus)
    }

    /// Evaluates a query that must select nodes.
    pub fn start_query(&self, frame: &ActivationFrame<'s>, key: QueryKey) -> Result<Vec<Navigator>, RuntimeError> {
        let focus = frame.focus()?;
        let compiled = self.stylesheet.query(key);
        let ctx = ExpressionContext::new(self, Some(frame), focus.node.clone(), compiled);
        compiled.query.select(&focus, &ctx)
    }

    pub(crate) fn evaluate_at(
        &self,
        frame: Option<&ActivationFrame<'s>>,
        key: QueryKey,
        focus: &Focus,
    ) -> Result<Value, RuntimeError> {
        let compiled = self.stylesheet.query(key);
        let ctx = ExpressionContext::new(self, frame, focus.node.clone(), compiled);
        compiled.query.evaluate(focus, &ctx)
    }

    pub(crate) fn evaluate_avt(&self, frame: &ActivationFrame<'s>, avt: &Avt) -> Result<String, RuntimeError> {
        let mut out = String::new();
        for part in &avt.parts {
            match part {
                AvtPart::Literal(text) => out.push_str(text),
                AvtPart::Expression(key) => out.push_str(&self.run_query(frame, *key)?.to_string()),
            }
        }
        Ok(out)
    }

    /// The key table of `name` for the document containing `node`, built on
    /// first use.
    pub(crate) fn key_table(&self, name: &ExpandedName, node: &Navigator) -> Result<Rc<KeyTable>, RuntimeError> {
        let root = node.root();
        if let Some(table) = self.keys.get(name, root.document_id()) {
            return Ok(table);
        }
        let definitions: Vec<_> = self.stylesheet.keys_named(name).collect();
        if definitions.is_empty() {
            return Err(RuntimeError::UnknownKey(name.to_string()));
        }
        self.keys.build(name, &root, definitions.len(), |index, candidate| {
            let definition = definitions[index];
            let pattern = self.stylesheet.query(definition.match_pattern);
            let ctx = ExpressionContext::new(self, None, candidate.clone(), pattern);
            if !pattern.query.match_node(candidate, &ctx)? {
                return Ok(None);
            }
            let focus = Focus::new(candidate.clone());
            self.evaluate_at(None, definition.use_expr, &focus).map(Some)
        })
    }

    pub(crate) fn extension(&self, namespace: &str) -> Option<Rc<dyn ExtensionObject>> {
        self.extensions.get(namespace).cloned()
    }

    pub(crate) fn document(&self, uri: &str) -> Option<Navigator> {
        self.documents.get(uri).cloned()
    }
}

/// The generic container: runs each child in turn, then finishes.
fn execute_children<'s, O: RecordOutput>(
    children: &'s [Action],
    processor: &mut Processor<'s, O>,
    frame: &mut ActivationFrame<'s>,
) -> Result<(), RuntimeError> {
    match children.get(frame.counter) {
        Some(child) => {
            frame.counter += 1;
            processor.push_action_frame(child, frame.node_set.clone());
        }
        None => frame.finish(),
    }
    Ok(())
}
