use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("XML parse error: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("Attribute '{0}' added after element content")]
    LateAttribute(String),

    #[error("Namespace '{0}' declared after element content")]
    LateNamespace(String),

    #[error("Builder misuse: {0}")]
    Builder(String),
}
