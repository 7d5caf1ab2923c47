#![allow(dead_code)]

use xform::{Transformer, XformError};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const XSLT_NS: &str = "http://www.w3.org/1999/XSL/Transform";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Wraps top-level elements in an `xsl:stylesheet` element.
pub fn stylesheet(body: &str) -> String {
    stylesheet_with(body, "1.0", "")
}

/// Same as [`stylesheet`] with a custom version and extra attributes on the
/// stylesheet element (namespace declarations and the like).
pub fn stylesheet_with(body: &str, version: &str, attributes: &str) -> String {
    format!(
        r#"<xsl:stylesheet version="{version}" xmlns:xsl="{XSLT_NS}" {attributes}>{body}</xsl:stylesheet>"#
    )
}

pub fn transformer(body: &str) -> Result<Transformer, XformError> {
    init_logger();
    Transformer::from_source(&stylesheet(body))
}

/// Compiles `body` and applies it to `xml`, returning the serialized result.
pub fn transform(body: &str, xml: &str) -> Result<String, XformError> {
    transformer(body)?.transform_str(xml)
}

/// A named template that recurses `$n` times before writing `done`.
pub const COUNTDOWN: &str = r#"
    <xsl:template name="countdown">
        <xsl:param name="n"/>
        <xsl:if test="$n = 0">done</xsl:if>
        <xsl:if test="$n > 0">
            <xsl:call-template name="countdown">
                <xsl:with-param name="n" select="$n - 1"/>
            </xsl:call-template>
        </xsl:if>
    </xsl:template>"#;

pub fn countdown_stylesheet(depth: usize) -> String {
    stylesheet(&format!(
        r#"{COUNTDOWN}
        <xsl:template match="/">
            <xsl:call-template name="countdown">
                <xsl:with-param name="n" select="{depth}"/>
            </xsl:call-template>
        </xsl:template>"#
    ))
}

/// A catalog with `count` items spread over three categories.
pub fn catalog(count: usize) -> String {
    let mut xml = String::from("<catalog>");
    for i in 0..count {
        let category = ["a", "b", "c"][i % 3];
        xml.push_str(&format!(r#"<item id="i{i}" cat="{category}">{i}</item>"#));
    }
    xml.push_str("</catalog>");
    xml
}
