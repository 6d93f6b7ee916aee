// Archivo: grpc.rs
// Propósito: punto de despacho para acciones `GRPC`.
//
// Todavía no existe cliente RPC: el despacho es un no-op silencioso que
// termina con éxito, así el step queda pendiente del acuse externo.
use crate::errors::TransportError;
use crate::Transport;
use async_trait::async_trait;
use flow::ParamMap;
use log::debug;

#[derive(Debug, Clone, Default)]
pub struct GrpcTransport;

#[async_trait]
impl Transport for GrpcTransport {
    fn name(&self) -> &str {
        "grpc"
    }

    async fn dispatch(&self, endpoint: &str, _params: &ParamMap) -> Result<(), TransportError> {
        // TODO: cliente gRPC real cuando exista el plano RPC de acciones.
        debug!("despacho gRPC a {} no implementado, se ignora", endpoint);
        Ok(())
    }
}
