// Archivo: stubs.rs
// Propósito: implementación en memoria de `ResourceStore` para pruebas y
// wiring rápido.
//
// No es durable: los recursos viven en el proceso. Replica el contrato del
// store real (versiones monótonas, watch sin huecos ni repeticiones) para
// poder ejercitar el controlador sin base de datos.
use crate::domain::{resource_version_of, Action, ChangeEvent, ListFilter, Step, ACTION_KIND, STEP_KIND};
use crate::errors::{FlowError, Result};
use crate::repository::{ResourceStore, WatchSender, WatchStream};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use log::debug;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

struct Subscriber {
    namespace: String,
    kind: String,
    sender: WatchSender,
}

#[derive(Default)]
struct StoreState {
    /// Documentos por (namespace, kind), en orden de inserción.
    objects: HashMap<(String, String), IndexMap<String, JsonValue>>,
    /// Último `resourceVersion` asignado (contador global).
    version: i64,
    subscribers: Vec<Subscriber>,
}

impl StoreState {
    fn next_version(&mut self) -> i64 {
        self.version += 1;
        self.version
    }

    fn publish(&mut self, namespace: &str, kind: &str, event: ChangeEvent) {
        // Se descartan las suscripciones cerradas en el mismo recorrido.
        let before = self.subscribers.len();
        self.subscribers.retain(|s| {
                            if s.namespace != namespace || s.kind != kind {
                                return !s.sender.is_closed();
                            }
                            s.sender.send(event.clone())
                        });
        let dropped = before - self.subscribers.len();
        if dropped > 0 {
            debug!("{} suscripciones cerradas descartadas al publicar v{}", dropped, event.version);
        }
    }
}

/// Store en memoria con notificación de cambios.
pub struct InMemoryResourceStore {
    state: Mutex<StoreState>,
}

impl InMemoryResourceStore {
    /// Crea una nueva instancia vacía.
    pub fn new() -> Self {
        Self { state: Mutex::new(StoreState::default()) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `FlowError::Storage`.
    fn lock(&self) -> std::result::Result<MutexGuard<'_, StoreState>, FlowError> {
        self.state
            .lock()
            .map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    /// Crea o actualiza un documento. Asigna `resourceVersion`, completa
    /// `kind`/`namespace`, conserva `uuid` y `createdAt` de la versión previa
    /// (o los genera) y notifica a las suscripciones. Devuelve el documento
    /// tal como quedó guardado.
    pub fn apply(&self, namespace: &str, kind: &str, mut object: JsonValue) -> Result<JsonValue> {
        let name = object.get("metadata")
                         .and_then(|m| m.get("name"))
                         .and_then(|n| n.as_str())
                         .unwrap_or("")
                         .to_string();
        if name.is_empty() {
            return Err(FlowError::InvalidResource("metadata.name vacío".into()));
        }

        let mut state = self.lock()?;
        let version = state.next_version();
        let key = (namespace.to_string(), kind.to_string());
        let previous = state.objects
                            .get(&key)
                            .and_then(|m| m.get(&name))
                            .and_then(|o| o.get("metadata"))
                            .cloned();

        let root = object.as_object_mut()
                         .ok_or_else(|| FlowError::InvalidResource("el documento no es un objeto".into()))?;
        let meta = root.entry("metadata")
                       .or_insert_with(|| json!({}))
                       .as_object_mut()
                       .ok_or_else(|| FlowError::InvalidResource("metadata no es un objeto".into()))?;
        meta.insert("kind".into(), json!(kind));
        meta.insert("namespace".into(), json!(namespace));
        meta.insert("resourceVersion".into(), json!(version));

        let prev_uuid = previous.as_ref().and_then(|p| p.get("uuid")).cloned();
        let own_uuid = meta.get("uuid")
                           .and_then(|u| u.as_str())
                           .and_then(|u| Uuid::parse_str(u).ok())
                           .filter(|u| !u.is_nil());
        let uuid = match (prev_uuid, own_uuid) {
            (Some(p), _) => p,
            (None, Some(u)) => json!(u.to_string()),
            (None, None) => json!(Uuid::new_v4().to_string()),
        };
        meta.insert("uuid".into(), uuid);
        let created_at = previous.as_ref()
                                 .and_then(|p| p.get("createdAt"))
                                 .cloned()
                                 .unwrap_or_else(|| json!(Utc::now()));
        meta.insert("createdAt".into(), created_at);

        state.objects.entry(key).or_default().insert(name, object.clone());
        state.publish(namespace, kind, ChangeEvent { object: object.clone(), version });
        Ok(object)
    }

    /// Escribe un `Step` y devuelve la versión guardada.
    pub fn put_step(&self, namespace: &str, step: &Step) -> Result<Step> {
        let saved = self.apply(namespace, STEP_KIND, serde_json::to_value(step)?)?;
        Ok(serde_json::from_value(saved)?)
    }

    /// Escribe una `Action` y devuelve la versión guardada.
    pub fn put_action(&self, namespace: &str, action: &Action) -> Result<Action> {
        let saved = self.apply(namespace, ACTION_KIND, serde_json::to_value(action)?)?;
        Ok(serde_json::from_value(saved)?)
    }

    /// Marca un step como terminado (`done = true`). Es la ruta de acuse
    /// externa; el controlador nunca la invoca.
    pub fn mark_step_done(&self, namespace: &str, name: &str) -> Result<Step> {
        let mut step: Step = serde_json::from_value(self.get_sync(namespace, STEP_KIND, name)?)?;
        step.spec.done = true;
        self.put_step(namespace, &step)
    }

    /// Publica un evento sin guardar el documento. Sirve para simular
    /// payloads corruptos en el flujo de cambios.
    pub fn emit_raw(&self, namespace: &str, kind: &str, object: JsonValue) -> Result<i64> {
        let mut state = self.lock()?;
        let version = state.next_version();
        state.publish(namespace, kind, ChangeEvent { object, version });
        Ok(version)
    }

    /// Número de suscripciones abiertas.
    pub fn watcher_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscribers
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }

    fn get_sync(&self, namespace: &str, kind: &str, name: &str) -> Result<JsonValue> {
        let state = self.lock()?;
        state.objects
             .get(&(namespace.to_string(), kind.to_string()))
             .and_then(|m| m.get(name))
             .cloned()
             .ok_or_else(|| FlowError::NotFound(format!("{} {}/{}", kind, namespace, name)))
    }
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn list(&self, namespace: &str, kind: &str, filter: &ListFilter) -> Result<Vec<JsonValue>> {
        let state = self.lock()?;
        Ok(state.objects
                .get(&(namespace.to_string(), kind.to_string()))
                .map(|m| m.values().filter(|o| filter.matches(o)).cloned().collect())
                .unwrap_or_default())
    }

    async fn get(&self, namespace: &str, kind: &str, name: &str) -> Result<JsonValue> {
        self.get_sync(namespace, kind, name)
    }

    /// Entrega primero los documentos guardados con versión `> since_version`
    /// (ascendente) y luego las mutaciones en vivo. Todo ocurre bajo el mismo
    /// lock que `apply`, así no hay huecos ni duplicados entre ambos tramos.
    async fn watch(&self, namespace: &str, kind: &str, since_version: i64) -> Result<WatchStream> {
        let mut state = self.lock()?;
        let (sender, stream) = WatchStream::channel();

        let mut backlog: Vec<ChangeEvent> =
            state.objects
                 .get(&(namespace.to_string(), kind.to_string()))
                 .map(|m| {
                     m.values()
                      .filter_map(|o| {
                          resource_version_of(o).filter(|v| *v > since_version)
                                                .map(|version| ChangeEvent { object: o.clone(), version })
                      })
                      .collect()
                 })
                 .unwrap_or_default();
        backlog.sort_by_key(|e| e.version);
        debug!("watch {} {}/* desde v{}: {} eventos pendientes", kind, namespace, since_version, backlog.len());
        for event in backlog {
            sender.send(event);
        }

        state.subscribers.push(Subscriber { namespace: namespace.to_string(),
                                            kind: kind.to_string(),
                                            sender });
        Ok(stream)
    }
}
