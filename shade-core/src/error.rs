use thiserror::Error;

/// Errors surfaced by the transformation pipeline.
///
/// Configuration mistakes and unsupported constructs abort the build;
/// ineligibility and cache misses degrade gracefully via `SkipReason` and
/// never reach here; invariant violations panic instead of returning
/// `Invariant` in the few spots the design doc calls out as "must not
/// silently emit a broken binary".
#[derive(Error, Debug)]
pub enum ShadeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported construct: {directive} ({reason})")]
    Unsupported { directive: String, reason: String },

    #[error("toolchain exited with status {code}")]
    Toolchain { code: i32 },

    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, ShadeError>;

/// Reason a finest-grain unit (literal, function, package) was skipped
/// rather than transformed. Callers log it when debug is on and fall back
/// to the untransformed input; it is never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReason(pub String);

impl SkipReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
