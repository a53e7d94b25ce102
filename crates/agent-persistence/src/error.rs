//! Errores de persistencia.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid store key: {0}")]
    InvalidKey(String),
    /// Snapshot ilegible o inconsistente; debe descartarse.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

impl PersistenceError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, PersistenceError::Corrupt(_))
    }
}
