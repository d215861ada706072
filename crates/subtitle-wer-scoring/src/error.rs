use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("failed to read transcript {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed SRT timing on line {line}: '{content}'")]
    MalformedTiming { line: usize, content: String },
}
