use super::{Action, WithParamAction};
use crate::avt::Avt;
use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use crate::frame::{ActivationFrame, FrameState, Mode, NodeSet};
use crate::output::RecordOutput;
use crate::processor::Processor;
use crate::stylesheet::QueryKey;
use std::cmp::Ordering;
use xform_tree::Navigator;
use xform_xpath::Focus;

/// `xsl:apply-templates`. Its children are the `xsl:sort` and
/// `xsl:with-param` instructions, run before selection.
#[derive(Debug)]
pub struct ApplyTemplatesAction {
    pub select: Option<QueryKey>,
    pub mode: Mode,
    pub children: Vec<Action>,
}

impl ApplyTemplatesAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut select = None;
        let mut mode = None;
        compiler.compile_attributes(|c, attr, value| {
            match attr {
                "select" => select = Some(c.add_query(value)?),
                "mode" => mode = c.resolve_mode(value)?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        let mut children = Vec::new();
        for child in compiler.significant_children() {
            let action = if Compiler::is_xslt(&child, "sort") {
                Action::Sort(compiler.with_input(child, SortAction::compile)?)
            } else if Compiler::is_xslt(&child, "with-param") {
                Action::WithParam(compiler.with_input(child, WithParamAction::compile)?)
            } else {
                return Err(CompileError::UnexpectedElement {
                    element: compiler.element_name(),
                    child: child.name(),
                });
            };
            children.push(action);
        }
        Ok(Self { select, mode, children })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        match frame.state {
            FrameState::Initialized => {
                processor.reset_params();
                processor.reset_sort();
                processor.push_children(&self.children, frame.node_set.clone());
                frame.state = FrameState::ProcessedChildren;
            }
            FrameState::ProcessedChildren => {
                let params = processor.take_params();
                let sorts = processor.take_sort();
                let mut nodes = match self.select {
                    Some(key) => processor.start_query(frame, key)?,
                    None => frame.node()?.children(),
                };
                if !sorts.is_empty() {
                    nodes = sort_nodes(processor, frame, nodes, &sorts)?;
                }
                log::debug!("apply-templates selected {} node(s) in mode {:?}", nodes.len(), self.mode);
                frame.new_node_set = Some(NodeSet::new(nodes));
                frame.params = params;
                frame.state = FrameState::ProcessNextNode;
            }
            _ => dispatch_next(processor, frame, &self.mode)?,
        }
        Ok(())
    }
}

/// Walks the frame's selected nodes, dispatching each one in `mode`. Drives
/// the `ProcessNextNode` / `PositionAdvanced` / `TemplateProcessed` loop.
fn dispatch_next<'s, O: RecordOutput>(
    processor: &mut Processor<'s, O>,
    frame: &mut ActivationFrame<'s>,
    mode: &Mode,
) -> Result<(), RuntimeError> {
    let Some(nodes) = frame.new_node_set.as_mut() else {
        frame.finish();
        return Ok(());
    };
    match frame.state {
        FrameState::ProcessNextNode => {
            if nodes.move_next() {
                frame.state = FrameState::PositionAdvanced;
            } else {
                frame.finish();
            }
        }
        FrameState::PositionAdvanced => {
            let current = nodes.clone();
            processor.push_template_lookup(current, mode, frame.params.clone())?;
            frame.state = FrameState::TemplateProcessed;
        }
        _ => frame.state = FrameState::ProcessNextNode,
    }
    Ok(())
}

/// The built-in rule for the root and for elements.
pub(super) fn builtin_templates<'s, O: RecordOutput>(
    processor: &mut Processor<'s, O>,
    frame: &mut ActivationFrame<'s>,
) -> Result<(), RuntimeError> {
    if frame.state == FrameState::Initialized {
        frame.new_node_set = Some(NodeSet::new(frame.node()?.children()));
        // Built-in rules do not pass parameters on.
        frame.params.clear();
        frame.state = FrameState::ProcessNextNode;
        return Ok(());
    }
    let mode = frame.mode.clone();
    dispatch_next(processor, frame, &mode)
}

/// One evaluated `xsl:sort`.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub select: QueryKey,
    pub descending: bool,
    pub numeric: bool,
    /// `Some(true)` for upper-first, `Some(false)` for lower-first.
    pub upper_first: Option<bool>,
}

/// `xsl:sort`. The order, data type and case order are attribute value
/// templates, resolved each time the sort runs.
#[derive(Debug)]
pub struct SortAction {
    pub select: QueryKey,
    pub order: Option<Avt>,
    pub data_type: Option<Avt>,
    pub case_order: Option<Avt>,
}

impl SortAction {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut select = None;
        let mut order = None;
        let mut data_type = None;
        let mut case_order = None;
        compiler.compile_attributes(|c, attr, value| {
            match attr {
                "select" => select = Some(c.add_query(value)?),
                "order" => order = Some(Avt::compile(c, value)?),
                "data-type" => data_type = Some(Avt::compile(c, value)?),
                "case-order" => case_order = Some(Avt::compile(c, value)?),
                "lang" => {}
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        compiler.check_empty()?;
        let select = match select {
            Some(key) => key,
            None => compiler.add_query(".")?,
        };
        Ok(Self {
            select,
            order,
            data_type,
            case_order,
        })
    }

    pub fn execute<'s, O: RecordOutput>(
        &'s self,
        processor: &mut Processor<'s, O>,
        frame: &mut ActivationFrame<'s>,
    ) -> Result<(), RuntimeError> {
        let descending = match resolve(processor, frame, &self.order)?.as_deref() {
            None | Some("ascending") => false,
            Some("descending") => true,
            Some(other) => return Err(invalid("order", other)),
        };
        let numeric = match resolve(processor, frame, &self.data_type)?.as_deref() {
            None | Some("text") => false,
            Some("number") => true,
            Some(other) => {
                log::warn!("Unsupported sort data-type '{}', sorting as text", other);
                false
            }
        };
        let upper_first = match resolve(processor, frame, &self.case_order)?.as_deref() {
            None => None,
            Some("upper-first") => Some(true),
            Some("lower-first") => Some(false),
            Some(other) => return Err(invalid("case-order", other)),
        };
        processor.add_sort(SortSpec {
            select: self.select,
            descending,
            numeric,
            upper_first,
        });
        frame.finish();
        Ok(())
    }
}

fn resolve<'s, O: RecordOutput>(
    processor: &Processor<'s, O>,
    frame: &ActivationFrame<'s>,
    avt: &Option<Avt>,
) -> Result<Option<String>, RuntimeError> {
    avt.as_ref().map(|a| processor.evaluate_avt(frame, a)).transpose()
}

fn invalid(attribute: &str, value: &str) -> RuntimeError {
    RuntimeError::Conversion {
        value: value.to_string(),
        target: format!("sort {}", attribute),
    }
}

#[derive(Debug)]
enum SortKey {
    Number(f64),
    Text(String),
}

impl SortKey {
    fn compare(&self, other: &Self, upper_first: Option<bool>) -> Ordering {
        match (self, other) {
            // NaN sorts before every number.
            (SortKey::Number(a), SortKey::Number(b)) => match (a.is_nan(), b.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => a.total_cmp(b),
            },
            (SortKey::Text(a), SortKey::Text(b)) => {
                let folded = a.to_lowercase().cmp(&b.to_lowercase());
                folded.then_with(|| match upper_first {
                    Some(true) => a.cmp(b),
                    Some(false) => b.cmp(a),
                    None => Ordering::Equal,
                })
            }
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
        }
    }
}

/// Stable sort of `nodes` by the given keys. Each key is evaluated with the
/// node as context and its position in the unsorted list.
pub(crate) fn sort_nodes<'s, O: RecordOutput>(
    processor: &Processor<'s, O>,
    frame: &ActivationFrame<'s>,
    nodes: Vec<Navigator>,
    specs: &[SortSpec],
) -> Result<Vec<Navigator>, RuntimeError> {
    let size = nodes.len();
    let mut keyed = Vec::with_capacity(size);
    for (index, node) in nodes.into_iter().enumerate() {
        let focus = Focus::at(node.clone(), index + 1, size);
        let mut keys = Vec::with_capacity(specs.len());
        for spec in specs {
            let value = processor.evaluate_at(Some(frame), spec.select, &focus)?;
            keys.push(if spec.numeric {
                SortKey::Number(value.to_number())
            } else {
                SortKey::Text(value.to_string())
            });
        }
        keyed.push((keys, node));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        specs
            .iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(spec, (x, y))| {
                let ordering = x.compare(y, spec.upper_first);
                if spec.descending { ordering.reverse() } else { ordering }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(keyed.into_iter().map(|(_, node)| node).collect())
}
