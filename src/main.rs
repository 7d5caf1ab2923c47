use clap::Parser;
use log::LevelFilter;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use xform::{TransformConfig, Transformer, XformError};

/// Applies an XSLT 1.0 stylesheet to an XML document.
#[derive(Parser, Debug)]
#[command(name = "xform", version, about)]
struct Cli {
    /// The stylesheet to apply.
    stylesheet: PathBuf,

    /// The source document.
    input: PathBuf,

    /// Write the result here instead of standard output.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Value for a top-level parameter, as name=value. May be repeated.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    /// Mode in which the source root is processed.
    #[arg(long)]
    mode: Option<String>,

    /// Abort when the frame stack grows beyond this many frames.
    #[arg(long)]
    max_depth: Option<usize>,

    /// JSON file with run settings. Command-line options take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the output events, one per line, instead of XML.
    #[arg(long)]
    events: bool,

    /// More logging. Repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn transform_config(&self) -> Result<TransformConfig, XformError> {
        let mut config = match &self.config {
            Some(path) => TransformConfig::from_json_file(path)?,
            None => TransformConfig::default(),
        };
        let mut overrides = TransformConfig {
            max_depth: self.max_depth,
            initial_mode: self.mode.clone(),
            ..TransformConfig::default()
        };
        for param in &self.params {
            let (name, value) = param
                .split_once('=')
                .ok_or_else(|| XformError::InvalidParameter(param.clone()))?;
            overrides.params.insert(name.to_string(), value.to_string());
        }
        config.merge(overrides);
        Ok(config)
    }
}

fn main() -> Result<(), XformError> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let transformer = Transformer::builder()
        .with_stylesheet_file(&cli.stylesheet)?
        .with_config(cli.transform_config()?)
        .build()?;

    let result = if cli.events {
        let mut lines = String::new();
        for event in transformer.transform_file_events(&cli.input)? {
            lines.push_str(&event.to_string());
            lines.push('\n');
        }
        lines
    } else {
        transformer.transform_file(&cli.input)?
    };

    match &cli.output {
        Some(path) => {
            fs::write(path, result)?;
            log::info!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(result.as_bytes())?;
            if !cli.events {
                stdout.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}
