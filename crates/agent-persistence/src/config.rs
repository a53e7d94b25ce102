//! Configuración del store desde variables de entorno.
//! `AGENTFLOW_STATE_DIR` (opcional) y `AGENTFLOW_SESSION_KEY`.

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

/// Clave bajo la que se guarda la sesión por defecto.
pub const DEFAULT_SESSION_KEY: &str = "agent_flow_v1";

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directorio del store en archivos; `None` usa el store en memoria.
    pub state_dir: Option<PathBuf>,
    pub session_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { state_dir: None,
               session_key: DEFAULT_SESSION_KEY.to_string() }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        // asegura que .env se haya cargado
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Self
        where F: Fn(&str) -> Option<String>
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let state_dir = non_empty("AGENTFLOW_STATE_DIR").map(PathBuf::from);
        let session_key = non_empty("AGENTFLOW_SESSION_KEY").unwrap_or_else(|| DEFAULT_SESSION_KEY.to_string());
        Self { state_dir, session_key }
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = StoreConfig::from_lookup(|key| match key {
                      "AGENTFLOW_STATE_DIR" => Some("  ".into()),
                      _ => None,
                  });
        assert_eq!(cfg, StoreConfig::default());

        let cfg = StoreConfig::from_lookup(|key| Some(format!("/tmp/{key}")));
        assert_eq!(cfg.state_dir, Some(PathBuf::from("/tmp/AGENTFLOW_STATE_DIR")));
    }
}
