use thiserror::Error;

/// How a Jenkins fetch failed. Drives both the branch-terminal note in the
/// analysis tree and the exit message when the root build itself is
/// unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Job or build does not exist (HTTP 404 or equivalent).
    NotFound,
    /// Credentials rejected or missing permissions (HTTP 401/403).
    Auth,
    /// Connection, TLS, or timeout problems before a response arrived.
    Transport,
    /// The server answered but not with what we expected.
    Protocol,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Auth => write!(f, "authentication failed"),
            Self::Transport => write!(f, "transport error"),
            Self::Protocol => write!(f, "protocol error"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Jenkins fetch failed ({kind}): {message}")]
    Fetch {
        kind: FetchErrorKind,
        message: String,
    },

    #[error("Analysis backend error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriageError {
    pub fn fetch(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self::Fetch {
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
