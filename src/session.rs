//! `SessionManager`: varias sesiones concurrentes, cada una con su propio
//! scheduler, timer y snapshot.
use std::sync::Arc;

use agent_core::CaseRegistry;
use agent_persistence::{KeyValueStore, SnapshotStore};
use dashmap::DashMap;
use log::info;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::errors::SessionError;
use crate::scheduler::Scheduler;

pub struct SessionManager {
    registry: Arc<dyn CaseRegistry + Send + Sync>,
    config: SchedulerConfig,
    store: Option<(Arc<dyn KeyValueStore>, String)>,
    sessions: DashMap<Uuid, Scheduler>,
}

impl SessionManager {
    pub fn new(registry: Arc<dyn CaseRegistry + Send + Sync>, config: SchedulerConfig) -> Self {
        Self { registry,
               config,
               store: None,
               sessions: DashMap::new() }
    }

    /// Persiste cada sesión bajo `<key_prefix>-<session_id>`.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>, key_prefix: impl Into<String>) -> Self {
        self.store = Some((store, key_prefix.into()));
        self
    }

    /// Abre una sesión nueva con un flujo de `case_type`.
    pub fn open(&self, case_type: &str) -> Result<Uuid, SessionError> {
        let session_id = Uuid::new_v4();
        let mut builder = Scheduler::builder(self.registry.clone()).config(self.config.clone());
        if let Some((store, prefix)) = &self.store {
            builder = builder.snapshots(SnapshotStore::new(store.clone(), format!("{prefix}-{session_id}")));
        }
        let scheduler = builder.create(case_type)?;
        self.sessions.insert(session_id, scheduler);
        info!("session {} opened case={}", session_id, case_type);
        Ok(session_id)
    }

    pub fn get(&self, session_id: Uuid) -> Result<Scheduler, SessionError> {
        self.sessions
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::UnknownFlow(session_id))
    }

    /// Cierra la sesión y cancela su timer. El snapshot queda en el store.
    pub fn end(&self, session_id: Uuid) -> Result<(), SessionError> {
        let (_, scheduler) = self.sessions
                                 .remove(&session_id)
                                 .ok_or(SessionError::UnknownFlow(session_id))?;
        scheduler.shutdown();
        info!("session {} ended", session_id);
        Ok(())
    }

    pub fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
