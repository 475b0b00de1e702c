use std::fmt;

/// Result type alias for Gale core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Gale core operations
#[derive(Debug)]
pub enum Error {
    /// I/O errors from file loading
    Io(std::io::Error),

    /// Invalid test configuration; the message names the violating field
    Config(String),

    /// Traffic pattern file errors
    Pattern(String),

    /// Parameter source construction errors
    Source(String),

    /// Request synthesis failures
    Request(String),

    /// Controller lifecycle violations (e.g. re-running a finished test)
    State(String),

    /// Other errors
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Config(msg) => write!(f, "Configuration error: {msg}"),
            Error::Pattern(msg) => write!(f, "Pattern error: {msg}"),
            Error::Source(msg) => write!(f, "Parameter source error: {msg}"),
            Error::Request(msg) => write!(f, "Request generation error: {msg}"),
            Error::State(msg) => write!(f, "State error: {msg}"),
            Error::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
