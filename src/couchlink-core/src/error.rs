use std::fmt;

/// The remote operation an HTTP status failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateDatabase,
    DeleteDatabase,
    SaveDocument,
    FetchDocument,
    DeleteDocument,
    CreateIndex,
    ListIndexes,
    DeleteIndex,
    Query,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateDatabase => "create database",
            Operation::DeleteDatabase => "delete database",
            Operation::SaveDocument => "save document",
            Operation::FetchDocument => "fetch document",
            Operation::DeleteDocument => "delete document",
            Operation::CreateIndex => "create index",
            Operation::ListIndexes => "list indexes",
            Operation::DeleteIndex => "delete index",
            Operation::Query => "query",
        };
        f.write_str(name)
    }
}

/// Classification of an [`Error`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    ModificationFailure,
    ReadFailure,
    RetryBudgetExceeded,
    Transport,
    Decode,
    Serialization,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid account, URL, header or interceptor setup. Raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid local argument. Raised before any I/O.
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("{operation} failed{}: {message}", status_suffix(.status))]
    ModificationFailure {
        operation: Operation,
        status: Option<u16>,
        message: String,
    },

    #[error("{operation} failed{}: {message}", status_suffix(.status))]
    ReadFailure {
        operation: Operation,
        status: Option<u16>,
        message: String,
    },

    #[error(
        "maximum number of attempts reached: a response interceptor requested a replay, \
         but the configured limit of {limit} attempts is exhausted"
    )]
    RetryBudgetExceeded { limit: u32 },

    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" with HTTP status {}", code))
        .unwrap_or_default()
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Validation(_) => ErrorKind::Validation,
            Error::ModificationFailure { .. } => ErrorKind::ModificationFailure,
            Error::ReadFailure { .. } => ErrorKind::ReadFailure,
            Error::RetryBudgetExceeded { .. } => ErrorKind::RetryBudgetExceeded,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Decode { .. } => ErrorKind::Decode,
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// HTTP status carried by a status-classified failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ModificationFailure { status, .. } | Error::ReadFailure { status, .. } => *status,
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
            source: None,
        }
    }

    pub fn decode_json(message: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Decode {
            message: message.into(),
            source: Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
