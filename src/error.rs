//! Crate-wide error taxonomy.
//!
//! Every fallible engine operation eventually bubbles up into one of these
//! variants. `main` maps each to an exit code and a log line; in verbose mode
//! the full `Display` chain (via `anyhow`'s `{:#}`) is emitted, otherwise just
//! the single-line summary carried by the variant itself.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("could not parse manifest at {path}: {message} (line {line}, column {column})\n{context}")]
    ParseError {
        path: PathBuf,
        message: String,
        line: usize,
        column: usize,
        context: String,
    },

    #[error("failed to pull image {image}: {source}")]
    ImagePullError {
        image: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to extract {path} from image {image}: {source}")]
    ExtractError {
        image: String,
        path: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("answer file not found: {0}")]
    AnswersNotFound(PathBuf),

    #[error("could not parse answer file {path} as {format}: {source}")]
    AnswersFormatError {
        path: PathBuf,
        format: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("missing value for required parameter '{namespace}.{name}'")]
    MissingParam { namespace: String, name: String },

    #[error("failed to render artifact {path}: {message}")]
    RenderError { path: PathBuf, message: String },

    #[error("provider '{provider}' does not support requirement kind '{kind}'")]
    UnsupportedRequirement { provider: String, kind: String },

    #[error("provider '{provider}' failed to initialize: {source}")]
    ProviderInitError {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("provider '{provider}' failed to apply artifact {artifact}: {source}")]
    ProviderApplyError {
        provider: String,
        artifact: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("another atomicapp invocation is already running against this host (lock at {0})")]
    Busy(PathBuf),

    #[error("cycle detected in component graph: {0}")]
    GraphCycle(String),

    #[error("interrupted by user")]
    UserInterrupt,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Process exit code for this error kind.
    pub(crate) fn exit_code(&self) -> i32 {
        match self {
            AppError::UserInterrupt => 130,
            AppError::Busy(_) => 75,
            AppError::ParseError { .. } => 65,
            AppError::ImagePullError { .. } | AppError::ExtractError { .. } => 66,
            AppError::AnswersNotFound(_) | AppError::AnswersFormatError { .. } => 67,
            AppError::MissingParam { .. } => 68,
            AppError::RenderError { .. } => 69,
            AppError::UnsupportedRequirement { .. } => 70,
            AppError::ProviderInitError { .. } | AppError::ProviderApplyError { .. } => 71,
            AppError::GraphCycle(_) => 72,
            AppError::Other(_) => 1,
        }
    }
}
