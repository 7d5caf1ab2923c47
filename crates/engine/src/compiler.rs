//! Compile-time support shared by every action.
//!
//! The [`Compiler`] is positioned on one stylesheet element at a time (the
//! "input"); actions read their attributes and content from it and register
//! queries, templates, keys and decimal formats in its tables. Once the whole
//! stylesheet has been walked, the tables become a [`Stylesheet`].

use crate::actions::{Action, TemplateAction, TextAction};
use crate::decimal_format::DecimalFormat;
use crate::error::{CompileError, NameError};
use crate::frame::Mode;
use crate::keys::KeyDefinition;
use crate::qname::{self, XSLT_NAMESPACE};
use crate::stylesheet::{CompiledQuery, QueryKey, Stylesheet, TemplateRule};
use std::collections::HashMap;
use std::rc::Rc;
use xform_tree::{ExpandedName, NamespaceScope, Navigator, NodeType};
use xform_xpath::Query;

pub struct Compiler {
    input: Navigator,
    forward_compatible: bool,
    queries: Vec<CompiledQuery>,
    templates: Vec<Action>,
    named_templates: HashMap<ExpandedName, usize>,
    rules: HashMap<Mode, Vec<TemplateRule>>,
    keys: Vec<KeyDefinition>,
    decimal_formats: HashMap<ExpandedName, DecimalFormat>,
    excluded_namespaces: Vec<String>,
    global_names: Vec<ExpandedName>,
}

impl Compiler {
    pub fn new(input: Navigator, forward_compatible: bool) -> Self {
        Self {
            input,
            forward_compatible,
            queries: Vec::new(),
            templates: Vec::new(),
            named_templates: HashMap::new(),
            rules: HashMap::new(),
            keys: Vec::new(),
            decimal_formats: HashMap::new(),
            excluded_namespaces: vec![XSLT_NAMESPACE.to_string()],
            global_names: Vec::new(),
        }
    }

    /// The stylesheet node currently being compiled.
    pub fn input(&self) -> &Navigator {
        &self.input
    }

    pub fn forward_compatible(&self) -> bool {
        self.forward_compatible
    }

    pub fn element_name(&self) -> String {
        self.input.name()
    }

    pub fn is_xslt(node: &Navigator, local: &str) -> bool {
        node.is_element() && node.namespace_uri() == XSLT_NAMESPACE && node.local_name() == local
    }

    /// Runs `f` with the input moved to `node`, then moves back.
    pub fn with_input<T>(
        &mut self,
        node: Navigator,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        let saved = std::mem::replace(&mut self.input, node);
        let result = f(self);
        self.input = saved;
        result
    }

    fn in_scope_namespaces(&self) -> Rc<[(String, String)]> {
        self.input
            .namespaces(NamespaceScope::All)
            .into_iter()
            .map(|ns| (ns.local_name().to_string(), ns.value()))
            .collect::<Vec<_>>()
            .into()
    }

    fn register(&mut self, query: Query) -> QueryKey {
        let key = self.queries.len();
        let namespaces = self.in_scope_namespaces();
        self.queries.push(CompiledQuery { query, namespaces });
        key
    }

    /// Compiles an expression in the namespace scope of the input.
    pub fn add_query(&mut self, text: &str) -> Result<QueryKey, CompileError> {
        let input = self.input.clone();
        let query = Query::compile(text, &|prefix: &str| input.lookup_namespace(prefix))?;
        Ok(self.register(query))
    }

    pub fn add_pattern(&mut self, text: &str) -> Result<QueryKey, CompileError> {
        let input = self.input.clone();
        let query = Query::compile_pattern(text, &|prefix: &str| input.lookup_namespace(prefix))?;
        Ok(self.register(query))
    }

    pub fn resolve_qname(&self, text: &str) -> Result<ExpandedName, NameError> {
        qname::resolve_qname(text, |prefix| self.input.lookup_namespace(prefix))
    }

    /// Resolves the value of a `mode` attribute.
    pub fn resolve_mode(&self, text: &str) -> Result<Mode, NameError> {
        self.resolve_qname(text).map(Some)
    }

    /// Feeds every attribute in no namespace to `f`, which returns whether it
    /// recognized the attribute. Unknown attributes are errors unless the
    /// stylesheet is forward-compatible, in which case any failure of a single
    /// attribute is logged and skipped.
    pub fn compile_attributes(
        &mut self,
        mut f: impl FnMut(&mut Self, &str, &str) -> Result<bool, CompileError>,
    ) -> Result<(), CompileError> {
        for attr in self.input.attributes() {
            if !attr.namespace_uri().is_empty() {
                continue;
            }
            let name = attr.local_name();
            let result = match f(self, name, &attr.value()) {
                Ok(true) => Ok(()),
                Ok(false) => Err(CompileError::UnexpectedAttribute {
                    element: self.element_name(),
                    attribute: name.to_string(),
                }),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                if !self.forward_compatible {
                    return Err(e);
                }
                log::warn!("Ignoring attribute '{}' on <{}>: {}", name, self.element_name(), e);
            }
        }
        Ok(())
    }

    pub fn check_required_attribute(&self, present: bool, name: &str) -> Result<(), CompileError> {
        if present {
            Ok(())
        } else {
            Err(CompileError::MissingAttribute {
                element: self.element_name(),
                attribute: name.to_string(),
            })
        }
    }

    /// Content other than whitespace, comments and processing instructions
    /// is an error.
    pub fn check_empty(&self) -> Result<(), CompileError> {
        let has_content = self.input.children().iter().any(|child| match child.node_type() {
            NodeType::Text => !is_whitespace(&child.value()),
            NodeType::Element => true,
            _ => false,
        });
        if has_content {
            return Err(CompileError::NotEmpty(self.element_name()));
        }
        Ok(())
    }

    /// Compiles the children of the input as a sequence of instructions.
    pub fn compile_template_content(&mut self) -> Result<Vec<Action>, CompileError> {
        let children = self.input.children();
        self.compile_nodes(children)
    }

    pub(crate) fn compile_nodes(&mut self, nodes: Vec<Navigator>) -> Result<Vec<Action>, CompileError> {
        let mut actions = Vec::new();
        for node in nodes {
            if let Some(action) = self.compile_node(node)? {
                actions.push(action);
            }
        }
        Ok(actions)
    }

    fn compile_node(&mut self, node: Navigator) -> Result<Option<Action>, CompileError> {
        match node.node_type() {
            NodeType::Text => {
                let text = node.value();
                if is_whitespace(&text) {
                    Ok(None)
                } else {
                    Ok(Some(Action::Text(TextAction::literal(text))))
                }
            }
            NodeType::Element => self.with_input(node, Action::compile),
            _ => Ok(None),
        }
    }

    /// Children of the input that are not whitespace, comments or PIs.
    pub(crate) fn significant_children(&self) -> Vec<Navigator> {
        self.input
            .children()
            .into_iter()
            .filter(|child| match child.node_type() {
                NodeType::Text => !is_whitespace(&child.value()),
                NodeType::Element => true,
                _ => false,
            })
            .collect()
    }

    /// Namespace URIs that literal result elements do not copy.
    pub(crate) fn is_excluded_namespace(&self, uri: &str) -> bool {
        self.excluded_namespaces.iter().any(|u| u == uri)
    }

    /// Reads an `exclude-result-prefixes` style list.
    pub(crate) fn exclude_prefixes(&mut self, list: &str) -> Result<(), CompileError> {
        for prefix in list.split_whitespace() {
            let prefix = if prefix == "#default" { "" } else { prefix };
            let uri = self
                .input
                .lookup_namespace(prefix)
                .ok_or_else(|| NameError::UndefinedPrefix(prefix.to_string()))?;
            self.excluded_namespaces.push(uri);
        }
        Ok(())
    }

    pub(crate) fn add_template(&mut self, template: TemplateAction) -> Result<(), CompileError> {
        let index = self.templates.len();
        if let Some(name) = &template.name {
            if self.named_templates.insert(name.clone(), index).is_some() {
                return Err(CompileError::DuplicateTemplate(name.to_string()));
            }
        }
        if let Some(key) = template.pattern {
            let alternatives = self.queries[key].query.alternatives();
            let rules = self.rules.entry(template.mode.clone()).or_default();
            for pattern in alternatives {
                let priority = template.priority.unwrap_or_else(|| pattern.default_priority());
                let order = rules.len();
                rules.push(TemplateRule {
                    pattern,
                    query: key,
                    priority,
                    order,
                    template: index,
                });
            }
        }
        self.templates.push(Action::Template(template));
        Ok(())
    }

    pub(crate) fn add_key(&mut self, key: KeyDefinition) {
        self.keys.push(key);
    }

    pub(crate) fn add_decimal_format(&mut self, name: ExpandedName, format: DecimalFormat) {
        self.decimal_formats.insert(name, format);
    }

    pub(crate) fn add_global(&mut self, name: ExpandedName) -> Result<(), CompileError> {
        if self.global_names.contains(&name) {
            return Err(CompileError::DuplicateParameter(name.to_string()));
        }
        self.global_names.push(name);
        Ok(())
    }

    pub(crate) fn finish(self, globals: Vec<Action>) -> Stylesheet {
        let mut rules = self.rules;
        for list in rules.values_mut() {
            // Highest priority first; among equals the last declared wins.
            list.sort_by(|a, b| b.priority.total_cmp(&a.priority).then(b.order.cmp(&a.order)));
        }
        Stylesheet::new(
            self.queries,
            self.templates,
            self.named_templates,
            rules,
            self.keys,
            self.decimal_formats,
            self.global_names,
            globals,
        )
    }
}

pub(crate) fn is_whitespace(text: &str) -> bool {
    text.chars().all(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use xform_tree::Document;

    fn element(xml: &str) -> Navigator {
        Document::parse(xml, "").unwrap().children().remove(0)
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let mut compiler = Compiler::new(element(r#"<e select="." bogus="1"/>"#), false);
        let result = compiler.compile_attributes(|_, name, _| Ok(name == "select"));
        assert!(matches!(result, Err(CompileError::UnexpectedAttribute { attribute, .. }) if attribute == "bogus"));
    }

    #[test]
    fn test_forward_compatible_skips_bad_attributes() {
        let mut compiler = Compiler::new(element(r#"<e select="." bogus="1"/>"#), true);
        let mut seen = Vec::new();
        compiler
            .compile_attributes(|_, name, _| {
                seen.push(name.to_string());
                Ok(name == "select")
            })
            .unwrap();
        assert_eq!(seen, vec!["select", "bogus"]);
        assert!(compiler.check_required_attribute(false, "name").is_err());
    }

    #[test]
    fn test_forward_compatible_stylesheet_still_requires_attributes() {
        let compile = |instruction: &str| {
            crate::stylesheet::Stylesheet::compile(&format!(
                r#"<xsl:stylesheet version="2.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                    <xsl:template match="/">{}</xsl:template>
                </xsl:stylesheet>"#,
                instruction
            ))
        };
        assert!(compile(r#"<xsl:value-of select="1" bogus="1"/>"#).is_ok());
        assert!(matches!(
            compile(r#"<xsl:value-of bogus="1"/>"#),
            Err(CompileError::MissingAttribute { element, attribute })
                if element == "xsl:value-of" && attribute == "select"
        ));
    }

    #[test]
    fn test_check_empty() {
        let compiler = Compiler::new(element("<e>  <!-- note --> </e>"), false);
        assert!(compiler.check_empty().is_ok());
        let compiler = Compiler::new(element("<e>text</e>"), false);
        assert!(matches!(compiler.check_empty(), Err(CompileError::NotEmpty(_))));
    }

    #[test]
    fn test_queries_resolve_prefixes_in_scope() {
        let mut compiler = Compiler::new(element(r#"<e xmlns:p="urn:p"/>"#), false);
        let key = compiler.add_query("p:a/p:b").unwrap();
        assert_eq!(key, 0);
        assert!(compiler.add_query("q:a").is_err());
        assert_eq!(
            compiler.resolve_qname("p:x").unwrap(),
            ExpandedName::new("urn:p", "x")
        );
    }
}
