//! Casos registrados por defecto.
mod missing_transfer;
mod missing_transfer_chat;

use agent_core::{CaseDefinition, CoreEngineError, StaticCaseRegistry};

pub use missing_transfer::{definition as missing_transfer, MISSING_TRANSFER};
pub use missing_transfer_chat::{definition as missing_transfer_chat, MISSING_TRANSFER_CHAT};

/// Registro con todos los casos conocidos.
pub fn default_registry() -> Result<StaticCaseRegistry, CoreEngineError> {
    let definitions: [CaseDefinition; 2] = [missing_transfer()?, missing_transfer_chat()?];
    let mut registry = StaticCaseRegistry::new();
    for def in definitions {
        registry.register(def);
    }
    Ok(registry)
}
