use crate::controller::ControllerState;
use flow::{FlowError, ParameterValidationError};
use flow_transport::TransportError;
use std::time::Duration;
use thiserror::Error;

// Errores de una invocación de acción.
//
// Se dividen en permanentes (requieren intervención del operador, nunca se
// reintentan) y transitorios (`Dispatch`, con reintento programado salvo que
// se haya agotado el techo de intentos).
#[derive(Error, Debug)]
pub enum InvokeError {
  /// La acción referenciada no existe o no se pudo leer.
  #[error("No se pudo resolver la acción `{action}`: {source}")]
  ActionLookup { action: String, source: FlowError },

  /// Los parámetros del step no cumplen el esquema de la acción.
  #[error("Parámetros inválidos en el step `{step}`: {source}")]
  Validation { step: String, source: ParameterValidationError },

  /// No hay transporte para el `serveType` de la acción.
  #[error("La acción `{action}` usa un transporte no soportado: {source}")]
  UnsupportedTransport { action: String, source: TransportError },

  /// Fallo de la llamada. `retry_in` es el retraso del reintento programado
  /// (`None` si se agotaron los intentos).
  #[error("Fallo al despachar el step `{step}`: {source}")]
  Dispatch { step: String, source: TransportError, retry_in: Option<Duration> },
}

impl InvokeError {
  /// `true` para errores de configuración que no se reintentan.
  pub fn is_permanent(&self) -> bool {
    !matches!(self, InvokeError::Dispatch { .. })
  }

  /// Retraso del reintento programado por este error, si lo hubo.
  pub fn retry_in(&self) -> Option<Duration> {
    match self {
      InvokeError::Dispatch { retry_in, .. } => *retry_in,
      _ => None,
    }
  }
}

// Errores del ciclo de vida del controlador.
#[derive(Error, Debug)]
pub enum ControllerError {
  /// Sin snapshot inicial el controlador no puede arrancar.
  #[error("No se pudo obtener el snapshot inicial: {0}")]
  Snapshot(#[source] FlowError),

  #[error("No se pudo abrir la suscripción de cambios: {0}")]
  Watch(#[source] FlowError),

  #[error("Configuración inválida: {0}")]
  Config(String),

  #[error("Operación `{operation}` inválida en estado {state:?}")]
  InvalidState { operation: &'static str, state: ControllerState },
}

pub type Result<T> = std::result::Result<T, ControllerError>;
