//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y expone una estructura inmutable (`CONFIG`).
//!
//! Claves reconocidas:
//! - `AGENTFLOW_MODE`: `interactive` | `autoplay`.
//! - `AGENTFLOW_SPEED`: multiplicador de autoplay, finito y > 0.
//! - `AGENTFLOW_UNDO_GRACE_MS`, `AGENTFLOW_AUTO_APPROVE_MS`,
//!   `AGENTFLOW_AUTO_EXTERNAL_MS`, `AGENTFLOW_NOTIFY_CAPACITY`.
//! - las de `agent_persistence::StoreConfig`.
//!
//! Un valor inválido no aborta: se registra un `warn!` y se usa el default.
use std::env;
use std::str::FromStr;

use agent_core::FlowMode;
use agent_persistence::config::init_dotenv;
use agent_persistence::StoreConfig;
use agent_policies::{AutoResolveParams, UndoParams};
use log::warn;
use once_cell::sync::Lazy;

/// Configuración global de la aplicación.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub store: StoreConfig,
}

/// Parámetros de un scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Modo inicial de los flujos nuevos.
    pub mode: FlowMode,
    pub speed: f64,
    pub undo: UndoParams,
    pub auto_resolve: AutoResolveParams,
    /// Capacidad del canal de notificaciones.
    pub notify_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { mode: FlowMode::Interactive,
               speed: 1.0,
               undo: UndoParams::default(),
               auto_resolve: AutoResolveParams::default(),
               notify_capacity: 64 }
    }
}

/// Instancia global perezosa de configuración, evaluada una sola vez.
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

impl AppConfig {
    pub fn from_env() -> Self {
        init_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
        where F: Fn(&str) -> Option<String>
    {
        let defaults = SchedulerConfig::default();
        let mode = parsed(&lookup, "AGENTFLOW_MODE", defaults.mode, parse_mode);
        let speed = parsed(&lookup, "AGENTFLOW_SPEED", defaults.speed, |v| {
            f64::from_str(v).ok().filter(|s| s.is_finite() && *s > 0.0)
        });
        let grace_ms = parsed(&lookup, "AGENTFLOW_UNDO_GRACE_MS", defaults.undo.grace_ms, |v| v.parse().ok());
        let approval_ms = parsed(&lookup,
                                 "AGENTFLOW_AUTO_APPROVE_MS",
                                 defaults.auto_resolve.approval_ms,
                                 |v| v.parse().ok());
        let external_action_ms = parsed(&lookup,
                                        "AGENTFLOW_AUTO_EXTERNAL_MS",
                                        defaults.auto_resolve.external_action_ms,
                                        |v| v.parse().ok());
        let notify_capacity = parsed(&lookup, "AGENTFLOW_NOTIFY_CAPACITY", defaults.notify_capacity, |v| {
            v.parse().ok().filter(|c: &usize| *c > 0)
        });

        Self { scheduler: SchedulerConfig { mode,
                                            speed,
                                            undo: UndoParams { grace_ms },
                                            auto_resolve: AutoResolveParams { approval_ms,
                                                                              external_action_ms },
                                            notify_capacity },
               store: StoreConfig::from_lookup(lookup) }
    }
}

fn parse_mode(value: &str) -> Option<FlowMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "interactive" => Some(FlowMode::Interactive),
        "autoplay" => Some(FlowMode::Autoplay),
        _ => None,
    }
}

fn parsed<T, F, P>(lookup: &F, key: &str, default: T, parse: P) -> T
    where T: std::fmt::Debug,
          F: Fn(&str) -> Option<String>,
          P: Fn(&str) -> Option<T>
{
    match lookup(key) {
        None => default,
        Some(raw) => parse(raw.trim()).unwrap_or_else(|| {
                                           warn!("invalid {}={:?}, using default {:?}", key, raw, default);
                                           default
                                       }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_pairs(&[]);
        assert_eq!(cfg.scheduler, SchedulerConfig::default());
        assert_eq!(cfg.store.session_key, "agent_flow_v1");
    }

    #[test]
    fn reads_values() {
        let cfg = from_pairs(&[("AGENTFLOW_MODE", "Autoplay"),
                               ("AGENTFLOW_SPEED", "2.5"),
                               ("AGENTFLOW_UNDO_GRACE_MS", "0"),
                               ("AGENTFLOW_AUTO_APPROVE_MS", "100"),
                               ("AGENTFLOW_SESSION_KEY", "demo")]);
        assert_eq!(cfg.scheduler.mode, FlowMode::Autoplay);
        assert_eq!(cfg.scheduler.speed, 2.5);
        assert_eq!(cfg.scheduler.undo.grace_ms, 0);
        assert_eq!(cfg.scheduler.auto_resolve.approval_ms, 100);
        assert_eq!(cfg.scheduler.auto_resolve.external_action_ms, 2500);
        assert_eq!(cfg.store.session_key, "demo");
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = from_pairs(&[("AGENTFLOW_SPEED", "0"),
                               ("AGENTFLOW_MODE", "turbo"),
                               ("AGENTFLOW_NOTIFY_CAPACITY", "0")]);
        assert_eq!(cfg.scheduler.speed, 1.0);
        assert_eq!(cfg.scheduler.mode, FlowMode::Interactive);
        assert_eq!(cfg.scheduler.notify_capacity, 64);
    }
}
