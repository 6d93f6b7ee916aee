// Archivo: registry.rs
// Propósito: registro de transportes indexado por `ServeType`.
use crate::errors::TransportError;
use crate::grpc::GrpcTransport;
use crate::http::HttpTransport;
use crate::Transport;
use flow::{ParamMap, ServeType};
use std::collections::HashMap;
use std::sync::Arc;

/// Tabla `ServeType -> Transport` consultada por el invocador.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: HashMap<ServeType, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// Registro vacío.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro con HTTP (cliente dado) y el stub gRPC.
    pub fn standard(http: HttpTransport) -> Self {
        Self::new().with(ServeType::Http, Arc::new(http))
                   .with(ServeType::Grpc, Arc::new(GrpcTransport))
    }

    /// Registra (o sustituye) el transporte de `serve_type`.
    pub fn with(mut self, serve_type: ServeType, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(serve_type, transport);
        self
    }

    pub fn get(&self, serve_type: ServeType) -> Option<&Arc<dyn Transport>> {
        self.transports.get(&serve_type)
    }

    /// Despacha por el transporte registrado para `serve_type`.
    pub async fn dispatch(&self, serve_type: ServeType, endpoint: &str, params: &ParamMap) -> Result<(), TransportError> {
        let transport = self.get(serve_type).ok_or(TransportError::Unsupported(serve_type))?;
        transport.dispatch(endpoint, params).await
    }
}
