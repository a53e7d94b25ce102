//! Errores de la capa de sesión.
pub mod session_error;

pub use session_error::SessionError;
