use flow::ServeType;
use thiserror::Error;

// Errores de transporte.
//
// Todos, salvo `Unsupported`, son fallos de la llamada en sí y el
// controlador los trata como transitorios.
#[derive(Error, Debug)]
pub enum TransportError {
  /// Fallo de red o de construcción de la petición.
  #[error("Error de petición a {endpoint}: {message}")]
  Request { endpoint: String, message: String },

  /// El endpoint respondió con un código no exitoso.
  #[error("El endpoint {endpoint} respondió {status}")]
  Status { endpoint: String, status: u16 },

  #[error("Endpoint inválido: {0}")]
  InvalidEndpoint(String),

  /// No hay transporte registrado para el tipo de servicio.
  #[error("Transporte no soportado: {0}")]
  Unsupported(ServeType),
}

impl TransportError {
  /// `true` si reintentar no puede cambiar el resultado.
  pub fn is_permanent(&self) -> bool {
    matches!(self, TransportError::Unsupported(_))
  }
}
