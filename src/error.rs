use std::fmt;
use std::path::PathBuf;

use crate::fetch::FetchError;

/// Failure of a single item (article, asset, link). Never aborts the surrounding run.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Network(#[from] FetchError),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no category/slug in identifier {0:?}")]
    Identifier(String),

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ItemError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Parse { .. } => FailureKind::Parse,
            Self::Network(_) => FailureKind::Network,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Read { .. } => FailureKind::Read,
            Self::Write { .. } => FailureKind::Write,
            Self::Identifier(_) => FailureKind::Parse,
            Self::Task(_) => FailureKind::Task,
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Parse,
    Network,
    NotFound,
    Read,
    Write,
    Task,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Parse => "parse",
            Self::Network => "network",
            Self::NotFound => "not-found",
            Self::Read => "read",
            Self::Write => "write",
            Self::Task => "task",
        };
        f.write_str(name)
    }
}
