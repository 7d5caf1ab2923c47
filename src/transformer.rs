// src/transformer.rs
use crate::config::TransformConfig;
use crate::error::XformError;
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;
use xform_engine::qname::split_qname;
use xform_engine::{
    CompileOptions, EventRecorder, ExtensionObject, NameError, OutputEvent, Processor,
    ProcessorConfig, RecordOutput, Stylesheet, XmlSerializer,
};
use xform_tree::{Document, ExpandedName, Navigator};
use xform_xpath::Value;

/// A builder for creating a [`Transformer`].
#[derive(Debug, Default)]
pub struct TransformerBuilder {
    stylesheet: Option<(String, String)>,
    config: TransformConfig,
}

impl TransformerBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Loads the stylesheet from a file. Its path becomes the base URI.
    pub fn with_stylesheet_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, XformError> {
        let path_ref = path.as_ref();
        let text = fs::read_to_string(path_ref).map_err(|e| {
            XformError::Io(io::Error::new(
                e.kind(),
                format!("Failed to read stylesheet from '{}': {}", path_ref.display(), e),
            ))
        })?;
        self.stylesheet = Some((text, path_ref.display().to_string()));
        Ok(self)
    }

    pub fn with_stylesheet_source(mut self, text: &str) -> Self {
        self.stylesheet = Some((text.to_string(), String::new()));
        self
    }

    /// Applies a configuration on top of what has been set so far.
    pub fn with_config(mut self, config: TransformConfig) -> Self {
        self.config.merge(config);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = Some(max_depth);
        self
    }

    pub fn with_initial_mode(mut self, mode: &str) -> Self {
        self.config.initial_mode = Some(mode.to_string());
        self
    }

    pub fn with_forward_compatible(mut self, enabled: bool) -> Self {
        self.config.forward_compatible = Some(enabled);
        self
    }

    /// Supplies a string value for a top-level `xsl:param`.
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.config.params.insert(name.to_string(), value.to_string());
        self
    }

    /// Compiles the stylesheet and resolves the configured names.
    pub fn build(self) -> Result<Transformer, XformError> {
        let (text, base_uri) = self.stylesheet.ok_or_else(|| {
            XformError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "No stylesheet has been configured. Use `with_stylesheet_file` or `with_stylesheet_source`.",
            ))
        })?;
        let options = CompileOptions {
            forward_compatible: self.config.forward_compatible,
            base_uri,
        };
        let stylesheet = Stylesheet::compile_with(&text, &options).map_err(XformError::from)?;
        log::info!(
            "Compiled stylesheet with {} template rule(s)",
            stylesheet.template_count()
        );

        let initial_mode = self.config.initial_mode.as_deref().map(parse_name).transpose()?;
        let parameters = self
            .config
            .params
            .iter()
            .map(|(name, value)| Ok((parse_name(name)?, Value::from(value.as_str()))))
            .collect::<Result<Vec<_>, XformError>>()?;

        Ok(Transformer {
            stylesheet,
            config: ProcessorConfig {
                max_depth: self.config.max_depth,
                initial_mode,
            },
            parameters,
            documents: Vec::new(),
            extensions: Vec::new(),
        })
    }
}

/// A compiled stylesheet together with everything a run needs besides the
/// source document. One transformer can run any number of transformations.
pub struct Transformer {
    stylesheet: Stylesheet,
    config: ProcessorConfig,
    parameters: Vec<(ExpandedName, Value)>,
    documents: Vec<(String, Navigator)>,
    extensions: Vec<(String, Rc<dyn ExtensionObject>)>,
}

impl Transformer {
    pub fn builder() -> TransformerBuilder {
        TransformerBuilder::new()
    }

    /// Shorthand for a stylesheet given as text with default settings.
    pub fn from_source(text: &str) -> Result<Self, XformError> {
        TransformerBuilder::new().with_stylesheet_source(text).build()
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<(), XformError> {
        let name = parse_name(name)?;
        let value = value.into();
        match self.parameters.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((name, value)),
        }
        Ok(())
    }

    /// Parses `text` and makes it reachable through `document(uri)`.
    pub fn add_document(&mut self, uri: &str, text: &str) -> Result<(), XformError> {
        let root = Document::parse(text, uri)?;
        self.documents.push((uri.to_string(), root));
        Ok(())
    }

    pub fn register_extension(&mut self, namespace: &str, object: Rc<dyn ExtensionObject>) {
        self.extensions.push((namespace.to_string(), object));
    }

    /// Runs the stylesheet over `source`, sending events to `output`.
    pub fn transform_to<O: RecordOutput>(&self, source: Navigator, output: O) -> Result<O, XformError> {
        let mut processor = Processor::with_config(&self.stylesheet, source, output, self.config.clone());
        for (name, value) in &self.parameters {
            processor.set_global_parameter(name.clone(), value.clone());
        }
        for (uri, root) in &self.documents {
            processor.add_document(uri, root.clone());
        }
        for (namespace, object) in &self.extensions {
            processor.register_extension(namespace, Rc::clone(object));
        }
        processor.run()?;
        log::debug!(
            "Transformation finished after {} step(s), {} key table build(s)",
            processor.steps(),
            processor.key_traversals()
        );
        Ok(processor.into_output())
    }

    /// Transforms XML text and serializes the result.
    pub fn transform_str(&self, xml: &str) -> Result<String, XformError> {
        let source = Document::parse(xml, "")?;
        let serializer = self.transform_to(source, XmlSerializer::new())?;
        Ok(serializer.finish()?)
    }

    pub fn transform_file<P: AsRef<Path>>(&self, path: P) -> Result<String, XformError> {
        let source = read_source(path.as_ref())?;
        let serializer = self.transform_to(source, XmlSerializer::new())?;
        Ok(serializer.finish()?)
    }

    /// Transforms XML text and returns the raw output events.
    pub fn transform_events(&self, xml: &str) -> Result<Vec<OutputEvent>, XformError> {
        let source = Document::parse(xml, "")?;
        Ok(self.transform_to(source, EventRecorder::new())?.into_events())
    }

    pub fn transform_file_events<P: AsRef<Path>>(&self, path: P) -> Result<Vec<OutputEvent>, XformError> {
        let source = read_source(path.as_ref())?;
        Ok(self.transform_to(source, EventRecorder::new())?.into_events())
    }
}

fn read_source(path: &Path) -> Result<Navigator, XformError> {
    let text = fs::read_to_string(path).map_err(|e| {
        XformError::Io(io::Error::new(
            e.kind(),
            format!("Failed to read input from '{}': {}", path.display(), e),
        ))
    })?;
    Ok(Document::parse(&text, &path.display().to_string())?)
}

/// Reads a name given outside any stylesheet: either a plain local name or
/// Clark notation, `{namespace}local`.
pub fn parse_name(text: &str) -> Result<ExpandedName, XformError> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('{') {
        let (namespace, local) = rest
            .split_once('}')
            .ok_or_else(|| NameError::InvalidQName(text.to_string()))?;
        let (prefix, local) = split_qname(local)?;
        if !prefix.is_empty() {
            return Err(NameError::InvalidQName(text.to_string()).into());
        }
        return Ok(ExpandedName::new(namespace, local));
    }
    match split_qname(text)? {
        ("", local) => Ok(ExpandedName::local(local)),
        (prefix, _) => Err(NameError::UndefinedPrefix(prefix.to_string()).into()),
    }
}
