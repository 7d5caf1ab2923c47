//! A stack-machine interpreter for compiled XSLT 1.0 stylesheets.
//!
//! A [`Stylesheet`] is compiled once into a graph of immutable [`Action`]s.
//! A [`Processor`] runs it against one source document by keeping an explicit
//! heap stack of [`ActivationFrame`]s: every instruction in progress is a
//! resumable frame, so template recursion depth is bounded by memory rather
//! than by the native call stack. Results are reported as events to a
//! [`RecordOutput`] sink, which may decline an event to apply backpressure.
//!
//! ```ignore
//! let stylesheet = Stylesheet::compile(xsl_text)?;
//! let source = Document::parse(xml_text, "")?;
//! let mut processor = Processor::new(&stylesheet, source, XmlSerializer::new());
//! processor.run()?;
//! let xml = processor.into_output().finish()?;
//! ```

pub mod actions;
pub mod avt;
pub mod compiler;
pub mod config;
pub mod context;
pub mod decimal_format;
pub mod error;
pub mod extension;
pub mod frame;
pub mod keys;
pub mod output;
pub mod processor;
pub mod qname;
pub mod stylesheet;

pub use actions::Action;
pub use config::{CompileOptions, ProcessorConfig};
pub use error::{CompileError, NameError, RuntimeError, TransformError};
pub use extension::{EXSLT_COMMON_NAMESPACE, ExsltCommon, ExtensionObject};
pub use frame::{ActivationFrame, FrameState, Mode, NodeSet};
pub use output::{EventRecorder, NavigatorOutput, OutputEvent, RecordOutput, XmlSerializer};
pub use processor::{ExecResult, Processor};
pub use qname::XSLT_NAMESPACE;
pub use stylesheet::{QueryKey, Stylesheet};
