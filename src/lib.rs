//! XSLT 1.0 transformations driven by an explicit frame stack.
//!
//! This crate ties the workspace together: [`Transformer`] compiles a
//! stylesheet once and runs it over any number of source documents, and
//! [`TransformConfig`] carries run settings loaded from JSON. The interpreter
//! itself lives in [`xform_engine`], re-exported here as [`engine`].

pub mod config;
pub mod error;
pub mod transformer;

pub use config::TransformConfig;
pub use error::XformError;
pub use transformer::{Transformer, TransformerBuilder, parse_name};

pub use xform_engine as engine;
pub use xform_engine::{EventRecorder, OutputEvent, RecordOutput, XmlSerializer};
pub use xform_tree as tree;
pub use xform_xpath as xpath;
