//! agent-persistence: snapshots versionados del flujo sobre un store
//! clave-valor.
//!
//! - `kv`: contrato `KeyValueStore` con implementaciones en memoria y en
//!   archivos (escritura atómica por rename).
//! - `snapshot`: `FlowSnapshot` (versión, checksum) y `SnapshotStore`, que
//!   valida todo lo que restaura antes de devolverlo.
//! - `config`: ubicación del store y clave de sesión desde el entorno.

pub mod config;
pub mod error;
pub mod kv;
pub mod snapshot;

pub use config::StoreConfig;
pub use error::PersistenceError;
pub use kv::{FileKeyValueStore, InMemoryKeyValueStore, KeyValueStore};
pub use snapshot::{FlowSnapshot, SnapshotStore, SCHEMA_ID, SCHEMA_VERSION};

use std::sync::Arc;

/// Construye el store indicado por la configuración: archivos si hay
/// directorio de estado, memoria en otro caso.
pub fn store_from_config(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    match &config.state_dir {
        Some(dir) => Arc::new(FileKeyValueStore::new(dir.clone())),
        None => Arc::new(InMemoryKeyValueStore::new()),
    }
}
