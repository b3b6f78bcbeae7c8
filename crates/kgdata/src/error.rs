use std::path::PathBuf;

/// Errors raised while loading a knowledge-aware dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// IO error while reading an atomic file.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required column is absent from the header row.
    #[error("{file}: missing required column `{column}`")]
    MissingColumn { file: PathBuf, column: String },

    /// A row could not be parsed.
    #[error("{file}:{line}: {message}")]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },

    /// The dataset has nothing to train on.
    #[error("empty dataset: {0}")]
    Empty(String),

    /// A token lookup missed the vocabulary.
    #[error("unknown {kind} token `{token}`")]
    UnknownToken { kind: &'static str, token: String },
}

pub type Result<T> = std::result::Result<T, DatasetError>;
