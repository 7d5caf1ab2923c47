//! The compiled stylesheet: action trees, the query table, template rules per
//! mode, keys and decimal formats. Immutable once built and shared by every
//! run that uses it.

use crate::actions::{Action, RootAction, VariableAction, VariableScope};
use crate::compiler::Compiler;
use crate::config::CompileOptions;
use crate::decimal_format::DecimalFormat;
use crate::error::{CompileError, RuntimeError};
use crate::frame::Mode;
use crate::keys::KeyDefinition;
use crate::qname::XSLT_NAMESPACE;
use std::collections::HashMap;
use std::rc::Rc;
use xform_tree::{Document, ExpandedName, Navigator, NodeType};
use xform_xpath::Query;

/// Index of a compiled expression in the stylesheet's query table.
pub type QueryKey = usize;

/// A compiled expression together with the namespace bindings in scope where
/// it was written, for names that only appear at run time (`key('p:k')`).
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub query: Query,
    pub namespaces: Rc<[(String, String)]>,
}

impl CompiledQuery {
    pub fn lookup_namespace(&self, prefix: &str) -> Option<String> {
        self.namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
    }
}

/// One alternative of a template's match pattern.
#[derive(Debug)]
pub struct TemplateRule {
    pub pattern: Query,
    pub query: QueryKey,
    pub priority: f64,
    pub order: usize,
    pub template: usize,
}

#[derive(Debug)]
pub struct Stylesheet {
    queries: Vec<CompiledQuery>,
    templates: Vec<Action>,
    named_templates: HashMap<ExpandedName, usize>,
    rules: HashMap<Mode, Vec<TemplateRule>>,
    keys: Vec<KeyDefinition>,
    decimal_formats: HashMap<ExpandedName, DecimalFormat>,
    global_names: Vec<ExpandedName>,
    root: Action,
    pub(crate) builtin_templates: Action,
    pub(crate) builtin_text: Action,
    pub(crate) copy_namespaces: Action,
    pub(crate) copy_node_set: Action,
}

impl Stylesheet {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        queries: Vec<CompiledQuery>,
        templates: Vec<Action>,
        named_templates: HashMap<ExpandedName, usize>,
        rules: HashMap<Mode, Vec<TemplateRule>>,
        keys: Vec<KeyDefinition>,
        decimal_formats: HashMap<ExpandedName, DecimalFormat>,
        global_names: Vec<ExpandedName>,
        globals: Vec<Action>,
    ) -> Self {
        Self {
            queries,
            templates,
            named_templates,
            rules,
            keys,
            decimal_formats,
            global_names,
            root: Action::Root(RootAction { globals }),
            builtin_templates: Action::BuiltInTemplates,
            builtin_text: Action::BuiltInText,
            copy_namespaces: Action::CopyNamespaces,
            copy_node_set: Action::CopyNodeSet,
        }
    }

    pub fn compile(text: &str) -> Result<Self, CompileError> {
        Self::compile_with(text, &CompileOptions::default())
    }

    pub fn compile_with(text: &str, options: &CompileOptions) -> Result<Self, CompileError> {
        let root = Document::parse(text, &options.base_uri)?;
        Self::from_document(&root, options)
    }

    /// Compiles an already parsed stylesheet document.
    pub fn from_document(root: &Navigator, options: &CompileOptions) -> Result<Self, CompileError> {
        let element = root
            .children()
            .into_iter()
            .find(|n| n.is_element())
            .ok_or_else(|| CompileError::NotAStylesheet("the document has no element".into()))?;
        let is_stylesheet = element.namespace_uri() == XSLT_NAMESPACE
            && matches!(element.local_name(), "stylesheet" | "transform");
        let version = element
            .attributes()
            .into_iter()
            .find(|a| {
                let ns = if is_stylesheet { "" } else { XSLT_NAMESPACE };
                a.local_name() == "version" && a.namespace_uri() == ns
            })
            .map(|a| a.value());
        let Some(version) = version else {
            return Err(CompileError::NotAStylesheet(format!(
                "<{}> declares no XSLT version",
                element.name()
            )));
        };
        let forward_compatible = options
            .forward_compatible
            .unwrap_or(version.trim() != "1.0");
        let mut compiler = Compiler::new(element.clone(), forward_compatible);
        if is_stylesheet {
            let globals = compile_top_level(&mut compiler)?;
            log::debug!("Compiled stylesheet with {} global binding(s)", globals.len());
            Ok(compiler.finish(globals))
        } else {
            // A literal result element used as the whole stylesheet is the
            // body of a template matching the root.
            let template = crate::actions::TemplateAction::for_root(&mut compiler)?;
            compiler.add_template(template)?;
            Ok(compiler.finish(Vec::new()))
        }
    }

    pub(crate) fn root_action(&self) -> &Action {
        &self.root
    }

    pub fn query(&self, key: QueryKey) -> &CompiledQuery {
        &self.queries[key]
    }

    pub fn find_template(&self, name: &ExpandedName) -> Option<&Action> {
        self.named_templates.get(name).map(|&i| &self.templates[i])
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// The modes that have at least one template rule.
    pub fn modes(&self) -> impl Iterator<Item = &Mode> {
        self.rules.keys()
    }

    /// Picks the template for a node among the rules of `mode`, trying rules
    /// in precedence order. `matches` decides whether a rule's pattern matches.
    pub(crate) fn find_template_for(
        &self,
        mode: &Mode,
        mut matches: impl FnMut(&TemplateRule) -> Result<bool, RuntimeError>,
    ) -> Result<Option<&Action>, RuntimeError> {
        let Some(rules) = self.rules.get(mode) else {
            return Ok(None);
        };
        for rule in rules {
            if matches(rule)? {
                return Ok(Some(&self.templates[rule.template]));
            }
        }
        Ok(None)
    }

    /// The built-in rule for a node that no template matched, if any.
    pub(crate) fn builtin_for(&self, node_type: NodeType) -> Option<&Action> {
        match node_type {
            NodeType::Root | NodeType::Element => Some(&self.builtin_templates),
            NodeType::Text | NodeType::Attribute => Some(&self.builtin_text),
            _ => None,
        }
    }

    pub(crate) fn keys_named<'a>(&'a self, name: &'a ExpandedName) -> impl Iterator<Item = &'a KeyDefinition> {
        self.keys.iter().filter(move |k| k.name == *name)
    }

    pub(crate) fn decimal_format(&self, name: &ExpandedName) -> Option<&DecimalFormat> {
        self.decimal_formats.get(name)
    }

    pub(crate) fn is_global(&self, name: &ExpandedName) -> bool {
        self.global_names.contains(name)
    }
}

fn compile_top_level(compiler: &mut Compiler) -> Result<Vec<Action>, CompileError> {
    compiler.compile_attributes(|c, name, value| match name {
        "version" | "id" => Ok(true),
        "exclude-result-prefixes" | "extension-element-prefixes" => {
            c.exclude_prefixes(value)?;
            Ok(true)
        }
        _ => Ok(false),
    })?;
    let mut globals = Vec::new();
    for child in compiler.input().children() {
        if child.node_type() == NodeType::Text && !crate::compiler::is_whitespace(&child.value()) {
            return Err(CompileError::NotAStylesheet("text is not allowed at the top level".into()));
        }
        if !child.is_element() {
            continue;
        }
        if child.namespace_uri() != XSLT_NAMESPACE {
            if child.namespace_uri().is_empty() {
                return Err(CompileError::UnexpectedElement {
                    element: compiler.element_name(),
                    child: child.name(),
                });
            }
            // Top-level elements in other namespaces are data for extensions.
            continue;
        }
        let local = child.local_name().to_string();
        match local.as_str() {
            "template" => {
                let template = compiler.with_input(child, crate::actions::TemplateAction::compile)?;
                compiler.add_template(template)?;
            }
            "variable" | "param" => {
                let variable = compiler.with_input(child, |c| VariableAction::compile(c, VariableScope::Global))?;
                compiler.add_global(variable.name.clone())?;
                globals.push(Action::Variable(variable));
            }
            "key" => {
                let key = compiler.with_input(child, KeyDefinition::compile)?;
                compiler.add_key(key);
            }
            "decimal-format" => {
                let (name, format) = compiler.with_input(child, DecimalFormat::compile)?;
                compiler.add_decimal_format(name, format);
            }
            "output" | "strip-space" | "preserve-space" | "namespace-alias" | "attribute-set" => {
                log::info!("Ignoring top-level <xsl:{}>", local);
            }
            _ if compiler.forward_compatible() => {
                log::warn!("Ignoring unknown top-level element <xsl:{}>", local);
            }
            _ => return Err(CompileError::UnknownInstruction(format!("xsl:{}", local))),
        }
    }
    Ok(globals)
}
