use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LedgerEntry, LedgerEvent, Metadata};

/// Almacenamiento de eventos append-only.
///
/// No existe API de mutación ni borrado: sólo se agrega y se lee.
pub trait EventStore {
    /// Agrega un evento y devuelve la entrada completa (con seq y timestamp).
    fn append(&mut self, event: LedgerEvent, step_id: Option<&str>, metadata: Metadata) -> LedgerEntry;
    /// Todas las entradas en orden de inserción.
    fn read_all(&self) -> &[LedgerEntry];
    /// Entradas con timestamp estrictamente posterior a `since`.
    fn read_since(&self, since: DateTime<Utc>) -> &[LedgerEntry];
}

/// Ledger en memoria de un `Flow`.
///
/// Los timestamps son monótonos: si el reloj retrocede se reutiliza el último
/// timestamp, de modo que `read_since` puede usar búsqueda binaria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LedgerEntry> {
        self.entries.iter()
    }

    /// Entradas a partir de `seq` (inclusive); cursor para consumidores
    /// incrementales que no quieren depender del reloj.
    pub fn read_since_seq(&self, seq: u64) -> &[LedgerEntry] {
        let start = usize::try_from(seq).unwrap_or(usize::MAX).min(self.entries.len());
        &self.entries[start..]
    }

    /// Comprueba la forma de un ledger restaurado: seq contiguo desde 0 y
    /// timestamps no decrecientes.
    pub fn check_integrity(&self) -> Result<(), String> {
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.seq != i as u64 {
                return Err(format!("ledger seq {} found at position {}", entry.seq, i));
            }
            if i > 0 && entry.timestamp < self.entries[i - 1].timestamp {
                return Err(format!("ledger timestamp goes backwards at seq {}", entry.seq));
            }
        }
        Ok(())
    }
}

impl EventStore for Ledger {
    fn append(&mut self, event: LedgerEvent, step_id: Option<&str>, metadata: Metadata) -> LedgerEntry {
        let now = Utc::now();
        let timestamp = match self.entries.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        let entry = LedgerEntry { seq: self.entries.len() as u64,
                                  timestamp,
                                  event,
                                  step_id: step_id.map(str::to_string),
                                  metadata };
        self.entries.push(entry.clone());
        entry
    }

    fn read_all(&self) -> &[LedgerEntry] {
        &self.entries
    }

    fn read_since(&self, since: DateTime<Utc>) -> &[LedgerEntry] {
        let start = self.entries.partition_point(|e| e.timestamp <= since);
        &self.entries[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_assigns_contiguous_seq() {
        let mut ledger = Ledger::new();
        let a = ledger.append(LedgerEvent::FlowStarted, None, Metadata::new());
        let b = ledger.append(LedgerEvent::StepStarted, Some("plan"), Metadata::new());
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
        assert_eq!(b.step_id.as_deref(), Some("plan"));
        assert!(b.timestamp >= a.timestamp);
        assert!(ledger.check_integrity().is_ok());
    }

    #[test]
    fn iter_walks_both_directions() {
        let mut ledger = Ledger::new();
        ledger.append(LedgerEvent::FlowStarted, None, Metadata::new());
        ledger.append(LedgerEvent::StepStarted, Some("plan"), Metadata::new());
        ledger.append(LedgerEvent::StepCompleted, Some("plan"), Metadata::new());
        let newest: Vec<u64> = ledger.iter().rev().take(2).map(|e| e.seq).collect();
        assert_eq!(newest, vec![2, 1]);
        assert_eq!(ledger.iter().len(), 3);
    }

    #[test]
    fn read_since_returns_strictly_newer_entries() {
        let mut ledger = Ledger::new();
        let first = ledger.append(LedgerEvent::FlowStarted, None, Metadata::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        ledger.append(LedgerEvent::StepStarted, Some("plan"), Metadata::new());

        let newer = ledger.read_since(first.timestamp);
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].event, LedgerEvent::StepStarted);
        assert_eq!(ledger.read_since_seq(1).len(), 1);
        assert!(ledger.read_since_seq(10).is_empty());
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut ledger = Ledger::new();
        let mut meta = Metadata::new();
        meta.insert("mode".into(), json!("autoplay"));
        ledger.append(LedgerEvent::AutoplayToggled, None, meta);
        let value = serde_json::to_value(&ledger).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["event"], "autoplay_toggled");
        assert_eq!(value[0]["metadata"]["mode"], "autoplay");
    }

    #[test]
    fn integrity_rejects_gaps() {
        let mut ledger = Ledger::new();
        ledger.append(LedgerEvent::FlowStarted, None, Metadata::new());
        let mut value = serde_json::to_value(&ledger).unwrap();
        value[0]["seq"] = json!(3);
        let tampered: Ledger = serde_json::from_value(value).unwrap();
        assert!(tampered.check_integrity().is_err());
    }
}
