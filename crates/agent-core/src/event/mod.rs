//! Ledger de auditoría: tipos de evento, store append-only y export.

mod export;
mod store;
mod types;

pub use export::{ExportedEntry, ExportedStep, LedgerExport};
pub use store::{EventStore, Ledger};
pub use types::{LedgerEntry, LedgerEvent, Metadata};
