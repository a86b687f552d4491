/// Errors that can occur in the iota runtime.
///
/// Every condition the runtime detects is one of these variants. Nothing is
/// fatal inside the library; the driver decides at the top level whether to
/// report and continue (interactive REPL) or report and exit.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IotaError {
    /// Malformed reader input (unterminated string, bad delimiter, ...).
    #[error("Read error: {0}")]
    Read(String),

    #[error("Unbound variable: {0}")]
    Unbound(String),

    /// A primitive or special form received a value of the wrong kind.
    #[error("Type error: {0}")]
    Type(String),

    #[error("Arity error: {name} expects {expected} args, got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// A special form whose shape cannot be evaluated.
    #[error("Malformed {0}")]
    Malformed(String),

    #[error("Else clause not last")]
    ElseNotLast,

    #[error("Attempt to splice in non-list: {0}")]
    Splice(String),

    #[error("Unknown procedure type: {0}")]
    NotProcedure(String),

    #[error("Macro not found: {0}")]
    MacroNotFound(String),

    /// The free list was still empty after a full collection.
    #[error("Out of memory: all {capacity} heap cells live after collection")]
    OutOfMemory { capacity: usize },

    /// Nested evaluation exceeded the configured depth.
    #[error("Recursion limit of {0} nested evaluations exceeded")]
    RecursionLimit(usize),

    /// I/O error from stream operations.
    #[error("I/O error: {0}")]
    Io(String),

    /// Raised by the `error` primitive.
    #[error("{0}")]
    User(String),
}

impl IotaError {
    pub fn arity(name: &str, expected: &str, got: usize) -> Self {
        IotaError::Arity {
            name: name.to_string(),
            expected: expected.to_string(),
            got,
        }
    }

    pub fn type_error(who: &str, expected: &str, got: &str) -> Self {
        IotaError::Type(format!("{who}: expected {expected}, got {got}"))
    }
}

impl From<std::io::Error> for IotaError {
    fn from(e: std::io::Error) -> Self {
        IotaError::Io(e.to_string())
    }
}

pub type IotaResult<T> = Result<T, IotaError>;
