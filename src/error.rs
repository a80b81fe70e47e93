use crate::shell::CommandExit;

/// Everything that can go wrong while loading, parsing or running actions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed command text (unterminated quote, unmatched array parenthesis, ...).
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid action selector or unknown range endpoint.
    #[error("invalid action selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("multiple statements in one script entry are not supported: {0}")]
    MultipleStatements(String),

    #[error("scripts are already loaded")]
    ScriptsAlreadyLoaded,

    #[error("no scripts loaded")]
    NoScripts,

    #[error("action '{0}' is already running")]
    ActionRunning(String),

    /// The command ran and terminated abnormally.
    #[error("{0}")]
    CommandFailed(CommandExit),

    /// A builtin rejected its arguments or failed.
    #[error("{0}")]
    Builtin(String),

    /// The program could not be launched at all.
    #[error("{program}: {message}")]
    Spawn {
        program: String,
        message: String,
        /// No such program on the search path (or at the given path).
        not_found: bool,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON registry: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML registry: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML registry: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }

    pub fn selector(selector: &str, reason: impl Into<String>) -> Self {
        Error::Selector {
            selector: selector.to_string(),
            reason: reason.into(),
        }
    }

    /// The exit descriptor reported for this failure.
    ///
    /// Launch failures map to the conventional shell codes (127 for a missing
    /// program, 126 otherwise); everything else that is not a real exit maps to 1.
    pub fn exit(&self) -> CommandExit {
        match self {
            Error::CommandFailed(exit) => exit.clone(),
            Error::Spawn { not_found: true, .. } => CommandExit::with_code(127),
            Error::Spawn { .. } => CommandExit::with_code(126),
            _ => CommandExit::with_code(1),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
