use std::io;
use std::path::PathBuf;

/// Errors raised by a [`ContextStore`](crate::context::ContextStore).
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("failed to read context file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse context: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to encode context: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to write context file '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove context file '{}': {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// User-visible failures of a chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The API credential is not available.
    #[error("{var} environment variable not set.")]
    Configuration { var: &'static str },

    /// Anything that went wrong while talking to the model API.
    #[error("{0}")]
    Request(String),

    /// The reply arrived but the updated context could not be written.
    #[error("Could not save context file: {0}")]
    Persist(#[from] ContextError),
}

impl ChatError {
    pub fn request(err: anyhow::Error) -> Self {
        Self::Request(format!("{err:#}"))
    }
}
