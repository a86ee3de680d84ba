//! Error types shared by the core modules.
//!
//! "Not found" is never an error here: lookups return `Option` or empty
//! collections and callers pick their own fallback.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed key-value text.
#[derive(Debug, Error)]
pub enum VdfError {
    #[error("line {line}: unexpected closing brace")]
    UnexpectedClose { line: usize },
    #[error("unclosed object '{key}' at end of document")]
    Unclosed { key: String },
    #[error("line {line}: key '{key}' has no value or object")]
    DanglingKey { line: usize, key: String },
    #[error("line {line}: could not read quoted token")]
    BadToken { line: usize },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Depot script file operations.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script not found for {0}")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("updates for {0} are already disabled")]
    AlreadyDisabled(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ScriptError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Archive fix apply/unfix failures.
///
/// The two password variants are kept apart from everything else so the
/// caller can re-prompt instead of abandoning the operation.
#[derive(Debug, Error)]
pub enum FixError {
    #[error("archive is password protected and no password was provided")]
    PasswordRequired,
    #[error("extraction failed, likely due to an invalid password")]
    InvalidPassword,
    #[error("unsupported or corrupt archive: {0}")]
    Archive(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed: {0}")]
    Network(String),
    #[error("fix URL is not configured")]
    NoFixUrl,
}

impl FixError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        FixError::Io {
            context: context.into(),
            source,
        }
    }

    /// True when asking the user for a (different) password may help.
    pub fn is_password_error(&self) -> bool {
        matches!(self, FixError::PasswordRequired | FixError::InvalidPassword)
    }
}

/// HTTP collaborator failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}
