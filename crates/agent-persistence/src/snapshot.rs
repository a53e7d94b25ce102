//! Snapshots versionados del `Flow`.
//!
//! Formato: `{schema_version, schema_id, saved_at, checksum, flow}`. El
//! checksum es blake3 del JSON canónico de `flow`. Al cargar se verifica, en
//! orden: JSON bien formado, versión y id de esquema, checksum, definición
//! del caso en el registro (hash y forma) e invariantes del flujo. Cualquier
//! fallo se reporta como `Corrupt`; el llamador decide descartar el snapshot.
use std::sync::Arc;

use agent_core::hashing::hash_value;
use agent_core::{CaseRegistry, Flow};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::kv::KeyValueStore;

pub const SCHEMA_VERSION: u32 = 1;
pub const SCHEMA_ID: &str = "agentflow.flow_snapshot";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub schema_version: u32,
    pub schema_id: String,
    pub saved_at: DateTime<Utc>,
    pub checksum: String,
    pub flow: Flow,
}

/// Forma on-disk antes de interpretar `flow`, para verificar el checksum
/// sobre exactamente lo que se leyó.
#[derive(Deserialize)]
struct RawSnapshot {
    schema_version: u32,
    schema_id: String,
    checksum: String,
    flow: Value,
}

impl FlowSnapshot {
    pub fn capture(flow: &Flow) -> Result<Self, PersistenceError> {
        let checksum = hash_value(&serde_json::to_value(flow)?);
        Ok(Self { schema_version: SCHEMA_VERSION,
                  schema_id: SCHEMA_ID.to_string(),
                  saved_at: Utc::now(),
                  checksum,
                  flow: flow.clone() })
    }

    /// Parsea y valida la envoltura (esquema y checksum). No consulta el
    /// registro.
    pub fn parse(json: &str) -> Result<Self, PersistenceError> {
        let corrupt = PersistenceError::Corrupt;
        let envelope: Value = serde_json::from_str(json).map_err(|e| corrupt(format!("invalid json: {e}")))?;
        let raw: RawSnapshot =
            serde_json::from_value(envelope.clone()).map_err(|e| corrupt(format!("invalid snapshot shape: {e}")))?;
        if raw.schema_id != SCHEMA_ID {
            return Err(corrupt(format!("unexpected schema id '{}'", raw.schema_id)));
        }
        if raw.schema_version != SCHEMA_VERSION {
            return Err(corrupt(format!("unsupported schema version {} (expected {})",
                                       raw.schema_version, SCHEMA_VERSION)));
        }
        if hash_value(&raw.flow) != raw.checksum {
            return Err(corrupt("checksum mismatch".into()));
        }
        serde_json::from_value(envelope).map_err(|e| corrupt(format!("invalid flow: {e}")))
    }

    /// Comprueba el flujo contra su definición registrada y sus invariantes.
    pub fn validate<R>(&self, registry: &R) -> Result<(), PersistenceError>
        where R: CaseRegistry + ?Sized
    {
        let definition =
            registry.definition(&self.flow.case_type)
                    .ok_or_else(|| PersistenceError::Corrupt(format!("unknown case type '{}'", self.flow.case_type)))?;
        definition.matches_shape(&self.flow)
                  .and_then(|_| self.flow.check_invariants())
                  .map_err(|e| PersistenceError::Corrupt(e.to_string()))
    }
}

/// Persistencia de un flujo bajo una clave fija.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn save(&self, flow: &Flow) -> Result<(), PersistenceError> {
        let snapshot = FlowSnapshot::capture(flow)?;
        let json = serde_json::to_string(&snapshot)?;
        self.store.set(&self.key, &json)?;
        debug!("snapshot saved key={} flow={} entries={}", self.key, flow.id, flow.ledger.len());
        Ok(())
    }

    /// `Ok(None)` si no hay snapshot; `Err(Corrupt)` si existe pero no es
    /// utilizable.
    pub fn load<R>(&self, registry: &R) -> Result<Option<Flow>, PersistenceError>
        where R: CaseRegistry + ?Sized
    {
        let Some(json) = self.store.get(&self.key)? else {
            return Ok(None);
        };
        let snapshot = FlowSnapshot::parse(&json).and_then(|s| s.validate(registry).map(|_| s));
        match snapshot {
            Ok(s) => {
                debug!("snapshot restored key={} flow={}", self.key, s.flow.id);
                Ok(Some(s.flow))
            }
            Err(e) => {
                warn!("snapshot rejected key={}: {}", self.key, e);
                Err(e)
            }
        }
    }

    pub fn clear(&self) -> Result<(), PersistenceError> {
        self.store.remove(&self.key)
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore").field("key", &self.key).finish()
    }
}
