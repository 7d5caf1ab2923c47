use thiserror::Error;
use xform_tree::TreeError;
use xform_xpath::XPathError;

/// A malformed qualified name or an undeclared prefix.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NameError {
    #[error("'{0}' is not a valid qualified name")]
    InvalidQName(String),

    #[error("Prefix '{0}' is not declared")]
    UndefinedPrefix(String),
}

/// Raised while turning stylesheet elements into actions.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Stylesheet is not well-formed: {0}")]
    Tree(#[from] TreeError),

    #[error("Not a stylesheet: {0}")]
    NotAStylesheet(String),

    #[error("<{element}> requires the '{attribute}' attribute")]
    MissingAttribute { element: String, attribute: String },

    #[error("Attribute '{attribute}' is not allowed on <{element}>")]
    UnexpectedAttribute { element: String, attribute: String },

    #[error("Invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttributeValue { attribute: String, value: String },

    #[error("Parameter '{0}' is declared more than once")]
    DuplicateParameter(String),

    #[error("Template '{0}' is declared more than once")]
    DuplicateTemplate(String),

    #[error("<{0}> must be empty")]
    NotEmpty(String),

    #[error("<{0}> has both a select attribute and content")]
    SelectAndContent(String),

    #[error("<{child}> is not allowed inside <{element}>")]
    UnexpectedElement { element: String, child: String },

    #[error("Unknown instruction <{0}>")]
    UnknownInstruction(String),

    #[error("Invalid attribute value template '{0}'")]
    InvalidAvt(String),

    #[error("Expression error: {0}")]
    XPath(#[from] XPathError),

    #[error(transparent)]
    Name(#[from] NameError),
}

/// Raised while a compiled stylesheet runs. These abort the run.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Call to unknown named template: '{0}'")]
    UnknownTemplate(String),

    #[error("Unknown decimal format: '{0}'")]
    UnknownDecimalFormat(String),

    #[error("Unknown key: '{0}'")]
    UnknownKey(String),

    #[error("Key '{0}' was used while its own table was being built")]
    RecursiveKey(String),

    #[error("Unknown function: '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' does not accept {count} argument(s)")]
    WrongArgumentCount { function: String, count: usize },

    #[error("No extension object is registered for prefix '{0}'")]
    UnknownExtensionNamespace(String),

    #[error("Extension function '{function}' failed: {message}")]
    Extension { function: String, message: String },

    #[error("Variable '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("Global variable '{0}' is referenced before it has a value")]
    UnboundGlobal(String),

    #[error("There is no context node")]
    NoContextNode,

    #[error("No output capture is active")]
    NoCapture,

    #[error("The frame stack exceeded its limit of {0}")]
    DepthLimitExceeded(usize),

    #[error("Cannot convert '{value}' to {target}")]
    Conversion { value: String, target: String },

    #[error("Result tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Expression error: {0}")]
    XPath(#[from] XPathError),

    #[error(transparent)]
    Name(#[from] NameError),
}

/// Anything that can go wrong between stylesheet text and finished output.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Transformation failed: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Input is not well-formed: {0}")]
    Tree(#[from] TreeError),
}
