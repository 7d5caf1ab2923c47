// src/error.rs
use thiserror::Error;
use xform_engine::{CompileError, NameError, RuntimeError, TransformError};
use xform_tree::TreeError;

/// Every failure between reading a stylesheet from disk and writing the result.
#[derive(Error, Debug)]
pub enum XformError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid parameter '{0}': expected name=value")]
    InvalidParameter(String),

    #[error(transparent)]
    Name(#[from] NameError),
}

impl From<CompileError> for XformError {
    fn from(e: CompileError) -> Self {
        XformError::Transform(TransformError::Compile(e))
    }
}

impl From<RuntimeError> for XformError {
    fn from(e: RuntimeError) -> Self {
        XformError::Transform(TransformError::Runtime(e))
    }
}

impl From<TreeError> for XformError {
    fn from(e: TreeError) -> Self {
        XformError::Transform(TransformError::Tree(e))
    }
}
