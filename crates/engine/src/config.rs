use crate::frame::Mode;

/// Options of a single transformation run.
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    /// Upper bound on the frame stack. Unbounded when `None`.
    pub max_depth: Option<usize>,
    /// Mode in which the source root is dispatched.
    pub initial_mode: Mode,
}

/// Options of stylesheet compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Overrides the forward-compatible processing that is otherwise enabled
    /// when the stylesheet declares a version other than 1.0.
    pub forward_compatible: Option<bool>,
    pub base_uri: String,
}
