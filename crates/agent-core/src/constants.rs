//! Constantes del motor core.
//!
//! `ENGINE_VERSION` participa en el `definition_hash` de cada definición de
//! caso: un snapshot persistido por otra versión del motor se detecta como
//! deriva de forma al restaurarlo.

/// Versión lógica del motor. Mantener estable mientras no cambie la semántica
/// de estados o el vocabulario del ledger.
pub const ENGINE_VERSION: &str = "A1.0";
