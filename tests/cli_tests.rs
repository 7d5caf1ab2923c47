mod common;

use common::*;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn write(dir: &Path, name: &str, text: &str) -> std::io::Result<String> {
    let path = dir.join(name);
    fs::write(&path, text)?;
    Ok(path.display().to_string())
}

fn xform(args: &[&str]) -> std::io::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_xform")).args(args).output()
}

const GREETING: &str = r#"
    <xsl:param name="who" select="'nobody'"/>
    <xsl:template match="/"><greeting to="{$who}"><xsl:apply-templates select="r/*"/></greeting></xsl:template>
    <xsl:template match="/" mode="short"><xsl:value-of select="$who"/></xsl:template>
    <xsl:template match="line"><xsl:value-of select="."/>;</xsl:template>"#;

#[test]
fn test_cli_writes_xml_to_stdout() -> TestResult {
    let dir = tempfile::tempdir()?;
    let sheet = write(dir.path(), "greeting.xsl", &stylesheet(GREETING))?;
    let input = write(dir.path(), "input.xml", "<r><line>a</line><line>b</line></r>")?;

    let output = xform(&[&sheet, &input, "--param", "who=you"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8(output.stdout)?.trim_end(),
        r#"<greeting to="you">a;b;</greeting>"#
    );
    Ok(())
}

#[test]
fn test_cli_config_file_and_overrides() -> TestResult {
    let dir = tempfile::tempdir()?;
    let sheet = write(dir.path(), "greeting.xsl", &stylesheet(GREETING))?;
    let input = write(dir.path(), "input.xml", "<r/>")?;
    let config = write(
        dir.path(),
        "run.json",
        r#"{"initial_mode": "short", "params": {"who": "config"}}"#,
    )?;
    let out = dir.path().join("out.xml").display().to_string();

    let output = xform(&[&sheet, &input, "--config", &config, "-o", &out])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(&out)?, "config");

    let output = xform(&[&sheet, &input, "--config", &config, "--param", "who=flag"])?;
    assert_eq!(String::from_utf8(output.stdout)?.trim_end(), "flag");
    Ok(())
}

#[test]
fn test_cli_events_listing() -> TestResult {
    let dir = tempfile::tempdir()?;
    let sheet = write(
        dir.path(),
        "events.xsl",
        &stylesheet(r#"<xsl:template match="/"><e>t</e></xsl:template>"#),
    )?;
    let input = write(dir.path(), "input.xml", "<r/>")?;

    let output = xform(&[&sheet, &input, "--events"])?;
    let stdout = String::from_utf8(output.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("begin Element"));
    assert_eq!(lines[1], r#"text "t""#);
    assert_eq!(lines[2], "end Element");
    Ok(())
}

#[test]
fn test_cli_reports_failures() -> TestResult {
    let dir = tempfile::tempdir()?;
    let sheet = write(
        dir.path(),
        "broken.xsl",
        &stylesheet(r#"<xsl:template match="/"><xsl:call-template name="nowhere"/></xsl:template>"#),
    )?;
    let input = write(dir.path(), "input.xml", "<r/>")?;

    let output = xform(&[&sheet, &input])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nowhere"));

    let output = xform(&[&sheet, &input, "--param", "novalue"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("novalue"));
    Ok(())
}
