use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to render mode map figure: {0}")]
    Plot(String),

    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
