mod common;

use common::*;
use std::rc::Rc;
use xform::engine::{CompileError, ExtensionObject, RuntimeError, TransformError};
use xform::tree::{Document, NodeType};
use xform::xpath::Value;
use xform::{EventRecorder, OutputEvent, Transformer, XformError};

fn runtime_error(result: Result<String, XformError>) -> RuntimeError {
    match result {
        Err(XformError::Transform(TransformError::Runtime(e))) => e,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

fn compile_error(result: Result<Transformer, XformError>) -> CompileError {
    match result {
        Err(XformError::Transform(TransformError::Compile(e))) => e,
        Err(other) => panic!("expected a compile error, got {:?}", other),
        Ok(_) => panic!("expected a compile error"),
    }
}

#[test]
fn test_modes_select_only_their_templates() -> TestResult {
    let body = r#"
        <xsl:template match="/"><out><xsl:apply-templates select="r/a" mode="m"/>|<xsl:apply-templates select="r/a"/>|<xsl:apply-templates select="r/a" mode="unused"/></out></xsl:template>
        <xsl:template match="a" mode="m">M</xsl:template>
        <xsl:template match="a">D</xsl:template>
        <xsl:template match="a" mode="other">O</xsl:template>"#;
    assert_eq!(transform(body, "<r><a>x</a></r>")?, "<out>M|D|x</out>");
    Ok(())
}

#[test]
fn test_builtin_rules_copy_text_only() -> TestResult {
    let out = transform("", "<r><a k='v'>one</a><!--c--><?pi data?><b>two</b></r>")?;
    assert_eq!(out, "onetwo");
    Ok(())
}

#[test]
fn test_unknown_named_template_is_an_error() {
    let body = r#"<xsl:template match="/"><xsl:call-template name="missing"/></xsl:template>"#;
    let error = runtime_error(transform(body, "<r/>"));
    assert!(matches!(&error, RuntimeError::UnknownTemplate(name) if name == "missing"));
    assert!(error.to_string().contains("missing"));
}

#[test]
fn test_copy_of_is_verbatim_and_repeatable() -> TestResult {
    let transformer = transformer(
        r#"<xsl:template match="/"><xsl:copy-of select="r/c | r/a"/></xsl:template>"#,
    )?;
    let xml = r#"<r><a xmlns:p="urn:p" x="1"><p:b>t</p:b><!--c--></a><c>u</c></r>"#;
    let first = transformer.transform_events(xml)?;
    let second = transformer.transform_events(xml)?;
    assert_eq!(first, second);
    assert_eq!(
        transformer.transform_str(xml)?,
        r#"<a xmlns:p="urn:p" x="1"><p:b>t</p:b><!--c--></a><c>u</c>"#
    );
    Ok(())
}

#[test]
fn test_copy_emits_namespaces_but_no_attributes() -> TestResult {
    let transformer = transformer(
        r#"<xsl:template match="/"><xsl:apply-templates select="*"/></xsl:template>
           <xsl:template match="e"><xsl:copy><xsl:apply-templates/></xsl:copy></xsl:template>"#,
    )?;
    let xml = r#"<e xmlns:n="urn:n" a="1">t</e>"#;
    let events = transformer.transform_events(xml)?;
    assert!(!events.iter().any(|e| matches!(e, OutputEvent::Begin { node_type: NodeType::Attribute, .. })));
    assert_eq!(
        events.iter().filter(|e| matches!(e, OutputEvent::Begin { node_type: NodeType::Namespace, .. })).count(),
        1
    );
    assert_eq!(transformer.transform_str(xml)?, r#"<e xmlns:n="urn:n">t</e>"#);
    Ok(())
}

#[test]
fn test_key_lookup_builds_each_table_once() -> TestResult {
    let body = r#"
        <xsl:key name="k" match="item" use="@cat"/>
        <xsl:template match="/"><xsl:value-of select="count(key('k', 'a'))"/>,<xsl:value-of select="count(key('k', 'b'))"/>,<xsl:value-of select="count(key('k', 'z'))"/></xsl:template>"#;
    let transformer = transformer(body)?;
    let source = Document::parse(&catalog(7), "")?;
    let mut processor = xform::engine::Processor::new(transformer.stylesheet(), source, EventRecorder::new());
    processor.run()?;
    assert_eq!(processor.key_traversals(), 1);
    assert_eq!(processor.output().text(), "3,2,0");
    Ok(())
}

#[test]
fn test_key_used_before_matching_nodes_are_visited() -> TestResult {
    let body = r#"
        <xsl:key name="k" match="item" use="@cat"/>
        <xsl:template match="/"><xsl:apply-templates select="catalog/item[1]"/></xsl:template>
        <xsl:template match="item"><xsl:value-of select="key('k', 'c')/@id"/></xsl:template>"#;
    assert_eq!(transform(body, &catalog(4))?, "i2");
    Ok(())
}

#[test]
fn test_with_param_is_read_as_number() -> TestResult {
    let body = r#"
        <xsl:template match="/"><xsl:call-template name="t"><xsl:with-param name="x" select="'5'"/></xsl:call-template></xsl:template>
        <xsl:template name="t"><xsl:param name="x" select="1"/><xsl:value-of select="$x * 2"/></xsl:template>"#;
    assert_eq!(transform(body, "<r/>")?, "10");
    Ok(())
}

#[test]
fn test_with_param_select_and_content_is_rejected() {
    let body = r#"
        <xsl:template match="/"><xsl:call-template name="t"><xsl:with-param name="x" select="'5'">5</xsl:with-param></xsl:call-template></xsl:template>
        <xsl:template name="t"><xsl:param name="x"/></xsl:template>"#;
    assert!(matches!(compile_error(transformer(body)), CompileError::SelectAndContent(_)));
}

#[test]
fn test_deep_recursion_does_not_use_the_native_stack() -> TestResult {
    init_logger();
    let transformer = Transformer::from_source(&countdown_stylesheet(20_000))?;
    assert_eq!(transformer.transform_str("<r/>")?, "done");
    Ok(())
}

#[test]
fn test_depth_limit_stops_runaway_recursion() {
    init_logger();
    let sheet = stylesheet(
        r#"<xsl:template match="/"><xsl:call-template name="loop"/></xsl:template>
           <xsl:template name="loop"><xsl:call-template name="loop"/></xsl:template>"#,
    );
    let result = Transformer::builder()
        .with_stylesheet_source(&sheet)
        .with_max_depth(100)
        .build()
        .and_then(|t| t.transform_str("<r/>"));
    assert!(matches!(runtime_error(result), RuntimeError::DepthLimitExceeded(100)));
}

#[test]
fn test_backpressure_does_not_change_the_result() -> TestResult {
    let transformer = transformer(
        r#"<xsl:template match="/"><list n="{count(catalog/item)}"><xsl:apply-templates select="catalog/item"/></list></xsl:template>
           <xsl:template match="item"><entry id="{@id}"><xsl:value-of select="."/></entry><xsl:copy-of select="@cat"/></xsl:template>"#,
    )?;
    let xml = catalog(5);
    let expected = transformer.transform_events(&xml)?;
    for every in 2..5 {
        let throttled = transformer.transform_to(Document::parse(&xml, "")?, EventRecorder::with_backpressure(every))?;
        assert!(throttled.declined() > 0);
        assert_eq!(throttled.events(), &expected[..]);
    }
    Ok(())
}

#[test]
fn test_global_parameters_and_initial_mode() -> TestResult {
    init_logger();
    let sheet = stylesheet(
        r#"<xsl:param name="who" select="'nobody'"/>
           <xsl:template match="/">default</xsl:template>
           <xsl:template match="/" mode="greet">hello <xsl:value-of select="$who"/></xsl:template>"#,
    );
    let transformer = Transformer::builder()
        .with_stylesheet_source(&sheet)
        .with_initial_mode("greet")
        .with_parameter("who", "world")
        .build()?;
    assert_eq!(transformer.transform_str("<r/>")?, "hello world");
    assert_eq!(Transformer::from_source(&sheet)?.transform_str("<r/>")?, "default");
    Ok(())
}

#[test]
fn test_document_function_uses_registered_documents() -> TestResult {
    let mut transformer = transformer(
        r#"<xsl:template match="/"><xsl:value-of select="document('lookup.xml')/m/e[@k = 'b']"/>|<xsl:value-of select="count(document('absent.xml'))"/></xsl:template>"#,
    )?;
    transformer.add_document("lookup.xml", "<m><e k='a'>A</e><e k='b'>B</e></m>")?;
    assert_eq!(transformer.transform_str("<r/>")?, "B|0");
    Ok(())
}

struct Shout;

impl ExtensionObject for Shout {
    fn arity(&self, name: &str) -> Option<(usize, usize)> {
        (name == "upper").then_some((1, 1))
    }

    fn invoke(&self, _name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let text = args.first().map(Value::to_string).unwrap_or_default();
        Ok(Value::String(text.to_uppercase()))
    }
}

#[test]
fn test_extension_functions() -> TestResult {
    init_logger();
    let sheet = stylesheet_with(
        r#"<xsl:template match="/"><xsl:value-of select="ext:upper(string(r))"/></xsl:template>"#,
        "1.0",
        r#"xmlns:ext="urn:shout""#,
    );
    let mut transformer = Transformer::from_source(&sheet)?;
    assert!(matches!(
        runtime_error(transformer.transform_str("<r>abc</r>")),
        RuntimeError::UnknownExtensionNamespace(prefix) if prefix == "ext"
    ));
    transformer.register_extension("urn:shout", Rc::new(Shout));
    assert_eq!(transformer.transform_str("<r>abc</r>")?, "ABC");
    Ok(())
}

#[test]
fn test_exslt_node_set_turns_fragments_into_node_sets() -> TestResult {
    init_logger();
    let sheet = stylesheet_with(
        r#"<xsl:variable name="f"><x>1</x><x>2</x></xsl:variable>
           <xsl:template match="/"><xsl:value-of select="count(exsl:node-set($f)/x)"/></xsl:template>"#,
        "1.0",
        r#"xmlns:exsl="http://exslt.org/common""#,
    );
    assert_eq!(Transformer::from_source(&sheet)?.transform_str("<r/>")?, "2");
    Ok(())
}

#[test]
fn test_forward_compatible_mode_uses_fallback() -> TestResult {
    init_logger();
    let body = r#"<xsl:template match="/"><xsl:future-thing><xsl:fallback>old</xsl:fallback></xsl:future-thing></xsl:template>"#;
    assert!(matches!(
        compile_error(Transformer::from_source(&stylesheet(body))),
        CompileError::UnknownInstruction(_)
    ));
    let upgraded = Transformer::from_source(&stylesheet_with(body, "2.0", ""))?;
    assert_eq!(upgraded.transform_str("<r/>")?, "old");
    let forced = Transformer::builder()
        .with_stylesheet_source(&stylesheet(body))
        .with_forward_compatible(true)
        .build()?;
    assert_eq!(forced.transform_str("<r/>")?, "old");
    Ok(())
}

#[test]
fn test_malformed_input_is_a_tree_error() -> TestResult {
    let transformer = transformer("")?;
    assert!(matches!(
        transformer.transform_str("<r>"),
        Err(XformError::Transform(TransformError::Tree(_)))
    ));
    Ok(())
}
