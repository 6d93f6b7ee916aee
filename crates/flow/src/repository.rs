// Archivo: repository.rs
// Propósito: definir el trait `ResourceStore` y la suscripción `WatchStream`.
// Describe el contrato que deben implementar los almacenamientos (mongo,
// in-memory, etc.) y que consume el controlador.
use crate::domain::{ChangeEvent, ListFilter};
use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

/// Contrato mínimo del almacenamiento de recursos versionados.
///
/// Los documentos viajan crudos (`JsonValue`); deserializarlos es tarea del
/// consumidor para poder descartar payloads corruptos sin cortar el flujo.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Snapshot puntual de los recursos de `kind` en `namespace` que cumplen
    /// `filter`. El llamador calcula la versión máxima a partir de los items.
    async fn list(&self, namespace: &str, kind: &str, filter: &ListFilter) -> Result<Vec<JsonValue>>;

    /// Lectura puntual por nombre. Retorna `NotFound` si no existe.
    async fn get(&self, namespace: &str, kind: &str, name: &str) -> Result<JsonValue>;

    /// Abre una suscripción a las mutaciones con versión `> since_version`.
    ///
    /// Garantías exigidas a la implementación:
    /// - nunca entrega un evento con versión `<= since_version`;
    /// - entrega los eventos en orden de versión no decreciente.
    async fn watch(&self, namespace: &str, kind: &str, since_version: i64) -> Result<WatchStream>;
}

/// Suscripción perezosa e ilimitada a eventos de cambio.
///
/// El cierre (`close`) es un control separado de la entrega de datos: tras
/// cerrarla el productor deja de poder enviar y `next` devuelve `None` una
/// vez consumido lo que ya estuviera en el buffer.
#[derive(Debug)]
pub struct WatchStream {
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Lado productor de un `WatchStream`, usado por las implementaciones del
/// store.
#[derive(Debug, Clone)]
pub struct WatchSender {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl WatchStream {
    /// Crea el par productor/consumidor de una suscripción.
    pub fn channel() -> (WatchSender, WatchStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WatchSender { tx }, WatchStream { rx })
    }

    /// Espera el siguiente evento. `None` si la suscripción terminó.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Solicita la terminación de la suscripción.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl WatchSender {
    /// Envía un evento; `false` si el consumidor cerró o se descartó.
    pub fn send(&self, event: ChangeEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
