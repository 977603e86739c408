//! Error types and handling for refactoring operations

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for refactoring operations
///
/// Desync failures (a tree node that cannot be matched against the literal
/// scanner tokens) are not errors: the synchronizer reports them as `false`.
#[derive(Debug, Error)]
pub enum RefactorError {
    /// Structural preprocessor error: unbalanced curly, comment or quote,
    /// missing `&THEN`, stray `&ENDIF` and friends
    #[error("{file}:{line}:{column} {message}")]
    Macro {
        file: PathBuf,
        line: u32,
        column: u32,
        message: String,
    },

    /// An include reference that could not be resolved on the propath
    #[error("{file}:{line}:{column} Could not find include file '{name}' on propath")]
    IncludeNotFound {
        name: String,
        file: PathBuf,
        line: u32,
        column: u32,
    },

    /// Include or macro expansion nested deeper than the configured limit
    #[error("{file}:{line}:{column} Expansion nested deeper than {limit} levels")]
    ExpansionDepth {
        limit: usize,
        file: PathBuf,
        line: u32,
        column: u32,
    },

    /// Caller bug, e.g. sweeping past the tail sentinel
    #[error("Contract violation: {message}")]
    Contract { message: String },

    /// A node handle whose slot has been released and possibly reused
    #[error("Stale node handle {index}@{generation}")]
    StaleHandle { index: u32, generation: u32 },

    /// Failure of one refactoring target, positioned as `file:line:col`
    #[error("{position} {message}")]
    Refactor { position: String, message: String },

    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more files could not be restored
    #[error("Rollback error: {message}")]
    Rollback { message: String },

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Macro,
    Contract,
    Refactor,
    Io,
    Rollback,
    Config,
    Internal,
}

impl RefactorError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefactorError::Macro { .. }
            | RefactorError::IncludeNotFound { .. }
            | RefactorError::ExpansionDepth { .. } => ErrorKind::Macro,
            RefactorError::Contract { .. } | RefactorError::StaleHandle { .. } => {
                ErrorKind::Contract
            }
            RefactorError::Refactor { .. } => ErrorKind::Refactor,
            RefactorError::Io { .. } => ErrorKind::Io,
            RefactorError::Rollback { .. } => ErrorKind::Rollback,
            RefactorError::Config { .. } => ErrorKind::Config,
            RefactorError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable (the batch can move on to the next
    /// target or file)
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Macro | ErrorKind::Refactor)
    }

    /// Create a structural preprocessor error
    pub fn macro_error(
        file: impl Into<PathBuf>,
        line: u32,
        column: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::Macro {
            file: file.into(),
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a contract violation
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract {
            message: message.into(),
        }
    }

    /// Create a per-target refactoring failure
    pub fn refactor(position: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Refactor {
            position: position.into(),
            message: message.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for RefactorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}
