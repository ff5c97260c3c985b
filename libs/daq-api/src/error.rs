use std::fmt;

/// Coarse classification of a plugin failure, matching the five error
/// kinds a host needs to decide retry/skip/fail-fast on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing configuration for a worker/endpoint/plugin.
    Config,
    /// Transport-level I/O failure (connect, bind, read, write).
    Io,
    /// A frame or batch could not be decoded/encoded.
    Format,
    /// An interpreter or command handler raised an application error.
    Logic,
    /// Fatal transport condition; the worker cannot continue.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
            ErrorKind::Logic => "logic",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Error type shared by every plugin trait in this crate family.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PluginError {
    kind: ErrorKind,
    message: String,
}

impl PluginError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn format_err(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Logic, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        PluginError::io(e.to_string())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self {
        PluginError::format_err(e.to_string())
    }
}

impl From<String> for PluginError {
    fn from(s: String) -> Self {
        PluginError::logic(s)
    }
}

impl From<&str> for PluginError {
    fn from(s: &str) -> Self {
        PluginError::logic(s.to_string())
    }
}
