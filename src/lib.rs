//! AgentFlow Rust Library
//!
//! Este crate une las piezas del motor de pasos:
//! - `config`: configuración desde el entorno (`CONFIG`).
//! - `scheduler`: timers, autoplay y comandos sobre un flujo.
//! - `session`: varias sesiones concurrentes.
//! - `errors`: errores de la capa de sesión.
//!
//! El modelo y la máquina de estados viven en `agent-core`; los casos
//! concretos en `agent-adapters`.

pub mod config;
pub mod errors;
pub mod scheduler;
pub mod session;

pub use config::{AppConfig, SchedulerConfig, CONFIG};
pub use errors::SessionError;
pub use scheduler::{FlowView, Notification, PendingTimer, Scheduler, SchedulerBuilder, TimerKind, TimerSpec};
pub use session::SessionManager;
