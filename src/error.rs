//! Error type shared by the store, the rejection log and recovery.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{action} failed ({path}): {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite {action} failed: {source}")]
    Sqlite {
        action: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("csv {action} failed ({path}): {source}")]
    Csv {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("store schema error: {0}")]
    StoreSchema(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub(crate) fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn sqlite(action: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Sqlite { action, source }
    }

    pub(crate) fn csv<'a>(
        action: &'static str,
        path: &'a Path,
    ) -> impl FnOnce(csv::Error) -> Self + 'a {
        move |source| Self::Csv {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}
