// Archivo: http.rs
// Propósito: transporte HTTP. Envía los parámetros enriquecidos como cuerpo
// JSON de un POST al endpoint de la acción.
use crate::errors::TransportError;
use crate::Transport;
use async_trait::async_trait;
use flow::ParamMap;
use log::debug;
use std::time::Duration;

/// Transporte HTTP basado en `reqwest`.
///
/// Por defecto no hay timeout: una llamada colgada bloquea a quien la espera.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }

    /// Construye el transporte con un timeout global por petición.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let builder = reqwest::Client::builder();
        let builder = match timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        };
        let client = builder.build()
                            .map_err(|e| TransportError::Request { endpoint: String::new(),
                                                                   message: e.to_string() })?;
        Ok(Self { client })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn dispatch(&self, endpoint: &str, params: &ParamMap) -> Result<(), TransportError> {
        let url = reqwest::Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        debug!("POST {} con {} parámetros", url, params.len());
        let response = self.client
                           .post(url)
                           .json(params)
                           .send()
                           .await
                           .map_err(|e| TransportError::Request { endpoint: endpoint.to_string(),
                                                                  message: e.to_string() })?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { endpoint: endpoint.to_string(),
                                                status: status.as_u16() });
        }
        Ok(())
    }
}
