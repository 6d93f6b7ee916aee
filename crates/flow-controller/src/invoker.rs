// Archivo: invoker.rs
// Propósito: invocar la acción de un step. Resuelve la `Action`, valida y
// enriquece los parámetros, despacha por el transporte de su `serveType` y,
// si la llamada falla, programa un reintento con la política configurada.
//
// El invocador nunca escribe el estado de finalización del step: marcar
// `done` corresponde a la ruta de acuse externa que observa el callback de
// la propia acción.
use crate::config::RetryPolicy;
use crate::errors::InvokeError;
use crate::scheduler::{RetryEntry, RetryHandler, RetryScheduler};
use async_trait::async_trait;
use flow::{check_action_params, enrich_params, Action, FlowError, ResourceStore, Step, ACTION_KIND, STEP_KIND};
use flow_transport::TransportRegistry;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Resultado de una invocación que no terminó en error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOutcome {
  /// La acción se despachó con éxito.
  Dispatched,
  /// El step ya es terminal; no hubo efecto.
  SkippedDone,
  /// El recurso no es un `Step`; no hubo efecto.
  SkippedKind,
}

pub struct ActionInvoker {
  store: Arc<dyn ResourceStore>,
  transports: TransportRegistry,
  scheduler: Arc<RetryScheduler>,
  namespace: String,
  policy: RetryPolicy,
}

impl ActionInvoker {
  pub fn new(store: Arc<dyn ResourceStore>,
             transports: TransportRegistry,
             scheduler: Arc<RetryScheduler>,
             namespace: &str,
             policy: RetryPolicy)
             -> Self {
    Self { store, transports, scheduler, namespace: namespace.to_string(), policy }
  }

  pub fn scheduler(&self) -> &Arc<RetryScheduler> {
    &self.scheduler
  }

  /// Invoca la acción del step como invocación original (no reintento).
  pub async fn invoke(&self, step: &Step) -> Result<InvokeOutcome, InvokeError> {
    self.invoke_attempt(step, 0).await
  }

  /// Invoca la acción del step; `attempt` es 0 para la invocación original
  /// y el número de reintento en otro caso.
  pub async fn invoke_attempt(&self, step: &Step, attempt: u32) -> Result<InvokeOutcome, InvokeError> {
    if step.metadata.kind != STEP_KIND {
      return Ok(InvokeOutcome::SkippedKind);
    }
    if step.is_done() {
      info!("step ({}) flow ({}) ya terminado", step.name(), step.spec.flow_id);
      return Ok(InvokeOutcome::SkippedDone);
    }
    info!("invocando step ({}) flow ({}) intento {}", step.name(), step.spec.flow_id, attempt);

    let action = self.resolve_action(&step.spec.action_name).await?;
    check_action_params(&step.spec.action_params, &action.spec.params)
      .map_err(|source| InvokeError::Validation { step: step.name().to_string(), source })?;
    let params = enrich_params(step, &action);

    match self.transports
              .dispatch(action.spec.serve_type, &action.spec.endpoint, &params)
              .await
    {
      Ok(()) => Ok(InvokeOutcome::Dispatched),
      Err(source) if source.is_permanent() => {
        Err(InvokeError::UnsupportedTransport { action: action.metadata.name.clone(), source })
      }
      Err(source) => {
        let retry_in = self.schedule_retry(step, attempt);
        Err(InvokeError::Dispatch { step: step.name().to_string(), source, retry_in })
      }
    }
  }

  async fn resolve_action(&self, name: &str) -> Result<Action, InvokeError> {
    let raw = self.store
                  .get(&self.namespace, ACTION_KIND, name)
                  .await
                  .map_err(|source| InvokeError::ActionLookup { action: name.to_string(), source })?;
    serde_json::from_value(raw).map_err(|e| InvokeError::ActionLookup { action: name.to_string(),
                                                                      source: FlowError::Serialization(e) })
  }

  /// Programa el reintento que sigue al intento `attempt`. Devuelve el
  /// retraso, o `None` si la política ya no permite más reintentos.
  fn schedule_retry(&self, step: &Step, attempt: u32) -> Option<Duration> {
    let next = attempt.saturating_add(1);
    if !self.policy.allows(next) {
      error!("step ({}) agotó sus reintentos tras {} intentos", step.name(), attempt + 1);
      return None;
    }
    let delay = self.policy.delay_for(step.spec.retry_count, attempt);
    self.scheduler.schedule(step.clone(), next, delay);
    Some(delay)
  }

  /// Relee el step antes de un reintento. `None` si ya no procede: el step
  /// terminó o una versión más nueva ya pasó por el flujo de cambios. Si la
  /// lectura falla se usa la copia del momento del fallo.
  async fn refresh(&self, snapshot: &Step) -> Option<Step> {
    let raw = match self.store.get(&self.namespace, STEP_KIND, snapshot.name()).await {
      Ok(raw) => raw,
      Err(FlowError::NotFound(_)) => {
        warn!("step ({}) ya no existe, se descarta el reintento", snapshot.name());
        return None;
      }
      Err(e) => {
        warn!("no se pudo releer el step ({}): {}; se reintenta con la copia", snapshot.name(), e);
        return Some(snapshot.clone());
      }
    };
    let live: Step = match serde_json::from_value(raw) {
      Ok(step) => step,
      Err(e) => {
        warn!("step ({}) ilegible al reintentar: {}; se reintenta con la copia", snapshot.name(), e);
        return Some(snapshot.clone());
      }
    };
    if live.is_done() {
      info!("step ({}) terminado antes del reintento", live.name());
      return None;
    }
    if live.metadata.resource_version > snapshot.metadata.resource_version {
      warn!("reintento de step ({}) v{} superado por v{}",
            live.name(),
            snapshot.metadata.resource_version,
            live.metadata.resource_version);
      return None;
    }
    Some(snapshot.clone())
  }
}

#[async_trait]
impl RetryHandler for ActionInvoker {
  async fn on_timer(&self, entry: RetryEntry) {
    let Some(step) = self.refresh(&entry.step).await else {
      return;
    };
    if let Err(e) = self.invoke_attempt(&step, entry.attempt).await {
      error!("reintento {} de step ({}) flow ({}) falló: {}", entry.attempt, step.name(), step.spec.flow_id, e);
    }
  }
}
