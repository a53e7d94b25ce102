//! Registro de definiciones de caso y reconstrucción de flujos desde el
//! ledger.
mod replay;
mod types;

pub use replay::replay;
pub use types::{CaseDefinition, CaseRegistry, StaticCaseRegistry};
