use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// An evaluation failure local to one attribute path. The walker records
    /// it in the report and carries on with the siblings.
    #[error("{0}")]
    Eval(String),

    #[error("unsupported value: {0}")]
    UnsupportedValue(String),

    #[error("interrupted by the user")]
    Interrupted,

    #[error("{0}")]
    Usage(String),

    #[error("failed to register GC root {root}: {source}")]
    Store {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid release document: {0}")]
    Document(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Only plain evaluation errors stay inside their attribute path.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Eval(_))
    }
}
