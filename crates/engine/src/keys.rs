//! `xsl:key` definitions and the lazily built key index.
//!
//! A key table maps each use-value to the nodes carrying it, in document
//! order. Tables are built on the first `key()` call for a (key, document)
//! pair by a single traversal of the whole document and are never rebuilt:
//! documents cannot change during a run.

use crate::compiler::Compiler;
use crate::error::{CompileError, RuntimeError};
use crate::stylesheet::QueryKey;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use xform_tree::{DocumentId, ExpandedName, Navigator, NodeType};
use xform_xpath::Value;

#[derive(Debug)]
pub struct KeyDefinition {
    pub name: ExpandedName,
    pub match_pattern: QueryKey,
    pub use_expr: QueryKey,
}

impl KeyDefinition {
    pub(crate) fn compile(compiler: &mut Compiler) -> Result<Self, CompileError> {
        let mut name = None;
        let mut match_pattern = None;
        let mut use_expr = None;
        compiler.compile_attributes(|c, attr, value| {
            match attr {
                "name" => name = Some(c.resolve_qname(value)?),
                "match" => match_pattern = Some(c.add_pattern(value)?),
                "use" => use_expr = Some(c.add_query(value)?),
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        compiler.check_required_attribute(name.is_some(), "name")?;
        compiler.check_required_attribute(match_pattern.is_some(), "match")?;
        compiler.check_required_attribute(use_expr.is_some(), "use")?;
        compiler.check_empty()?;
        match (name, match_pattern, use_expr) {
            (Some(name), Some(match_pattern), Some(use_expr)) => Ok(Self {
                name,
                match_pattern,
                use_expr,
            }),
            _ => Err(CompileError::MissingAttribute {
                element: compiler.element_name(),
                attribute: "name".into(),
            }),
        }
    }
}

pub type KeyTable = HashMap<String, Vec<Navigator>>;

type TableId = (ExpandedName, DocumentId);

#[derive(Debug, Default)]
pub struct KeyIndex {
    tables: RefCell<HashMap<TableId, Rc<KeyTable>>>,
    building: RefCell<HashSet<TableId>>,
    traversals: Cell<usize>,
}

impl KeyIndex {
    pub fn get(&self, name: &ExpandedName, document: DocumentId) -> Option<Rc<KeyTable>> {
        self.tables.borrow().get(&(name.clone(), document)).cloned()
    }

    /// Number of document traversals performed so far.
    pub fn traversals(&self) -> usize {
        self.traversals.get()
    }

    /// Builds and caches the table of `name` for the document of `root`.
    ///
    /// `evaluate` returns the use-value of a node for one definition, or
    /// `None` when the node does not match that definition's pattern. No
    /// borrow of the index is held while it runs, so it may itself call
    /// `key()` for other keys.
    pub fn build(
        &self,
        name: &ExpandedName,
        root: &Navigator,
        definitions: usize,
        mut evaluate: impl FnMut(usize, &Navigator) -> Result<Option<Value>, RuntimeError>,
    ) -> Result<Rc<KeyTable>, RuntimeError> {
        let id = (name.clone(), root.document_id());
        if !self.building.borrow_mut().insert(id.clone()) {
            return Err(RuntimeError::RecursiveKey(name.to_string()));
        }
        let result = self.traverse(root, definitions, &mut evaluate);
        self.building.borrow_mut().remove(&id);
        let table = Rc::new(result?);
        log::debug!(
            "Built key table '{}' with {} value(s) for document {}",
            name,
            table.len(),
            id.1.get()
        );
        self.tables.borrow_mut().insert(id, Rc::clone(&table));
        Ok(table)
    }

    fn traverse(
        &self,
        root: &Navigator,
        definitions: usize,
        evaluate: &mut impl FnMut(usize, &Navigator) -> Result<Option<Value>, RuntimeError>,
    ) -> Result<KeyTable, RuntimeError> {
        self.traversals.set(self.traversals.get() + 1);
        let mut table = KeyTable::new();
        let mut stack = vec![root.root()];
        while let Some(node) = stack.pop() {
            let mut visit = vec![node.clone()];
            if node.node_type() == NodeType::Element {
                visit.extend(node.attributes());
            }
            for candidate in &visit {
                for definition in 0..definitions {
                    if let Some(value) = evaluate(definition, candidate)? {
                        add_entries(&mut table, candidate, value);
                    }
                }
            }
            stack.extend(node.children().into_iter().rev());
        }
        Ok(table)
    }
}

fn add_entries(table: &mut KeyTable, node: &Navigator, value: Value) {
    let values: Vec<String> = match value {
        Value::NodeSet(nodes) => nodes.iter().map(Navigator::value).collect(),
        other => vec![other.to_string()],
    };
    for value in values {
        let bucket = table.entry(value).or_default();
        // Nodes arrive in document order, so a repeat is always the last entry.
        if bucket.last() != Some(node) {
            bucket.push(node.clone());
        }
    }
}
