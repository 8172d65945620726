use thiserror::Error;

// ─── Unified error types ─────────────────────────────────────────

/// Failures surfaced by the graph directory or transport.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("topic '{0}' does not exist")]
    UnknownTopic(String),

    #[error("cannot subscribe to '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("invalid graph description: {0}")]
    Description(String),
}

/// Reasons a single arrival is discarded instead of recorded.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SampleError {
    #[error("message has no header stamp")]
    MissingHeader,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Invalid monitor configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("cannot read config: {0}")]
    Read(String),
}

/// Errors that end a monitoring run.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Conflicting or missing invocation options.
    #[error("{0}")]
    Usage(String),

    #[error("none of the requested topics could be resolved")]
    NoStreamsResolved,

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("writing output: {0}")]
    Io(#[from] std::io::Error),
}
