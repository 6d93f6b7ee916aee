// Archivo: errors.rs
// Propósito: definir los errores del dominio de recursos y el alias Result<T>
// usado por las APIs del crate.
use thiserror::Error;

/// Errores comunes del acceso a recursos.
///
/// - `NotFound`: recurso no encontrado.
/// - `InvalidResource`: documento sin los campos mínimos (p. ej. nombre).
/// - `Serialization`: el documento no se puede (de)serializar.
/// - `Storage`: error al acceder al almacenamiento externo.
/// - `ParameterValidation`: los parámetros del step no cumplen el esquema.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Recurso no encontrado (kind/namespace/name).
    #[error("No encontrado: {0}")]
    NotFound(String),
    #[error("Recurso inválido: {0}")]
    InvalidResource(String),
    #[error("Error de serialización: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Error genérico de almacenamiento (BD, red, etc.).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
    #[error(transparent)]
    ParameterValidation(#[from] ParameterValidationError),
}

/// Rechazo permanente de los parámetros de un step frente al esquema
/// declarado por su acción. Requiere corrección del operador.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterValidationError {
    #[error("Falta el parámetro requerido `{name}`")]
    Missing { name: String },
    #[error("El parámetro `{name}` debe ser {expected}, se recibió {found}")]
    TypeMismatch { name: String, expected: String, found: String },
    /// La acción declara una clave que el sistema reserva.
    #[error("La acción declara la clave reservada `{name}`")]
    ReservedKey { name: String },
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, FlowError>;
