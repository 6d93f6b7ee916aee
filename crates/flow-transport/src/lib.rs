//! flow-transport: transportes de invocación de acciones
//!
//! Define el punto de despacho polimórfico `Transport` y el registro
//! `TransportRegistry` indexado por `ServeType`. Añadir un transporte nuevo
//! no requiere tocar el motor de reconciliación: basta con registrarlo.

pub mod errors;
pub mod grpc;
pub mod http;
pub mod registry;

pub use errors::TransportError;
pub use grpc::GrpcTransport;
pub use http::HttpTransport;
pub use registry::TransportRegistry;

use async_trait::async_trait;
use flow::ParamMap;

/// Transporte capaz de entregar una invocación a un endpoint.
///
/// `dispatch` bloquea hasta que la llamada termina; un `Err` se considera
/// fallo transitorio y el llamador decide si reintenta.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Nombre corto para logs.
    fn name(&self) -> &str;

    async fn dispatch(&self, endpoint: &str, params: &ParamMap) -> Result<(), TransportError>;
}
