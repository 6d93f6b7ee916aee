// Archivo: reconciler.rs
// Propósito: motor de reconciliación. Une el snapshot inicial de steps con
// el flujo de cambios en una sola secuencia ordenada y pasa cada step por el
// invocador, de uno en uno.
use crate::errors::{ControllerError, InvokeError};
use crate::invoker::{ActionInvoker, InvokeOutcome};
use flow::{resource_version_of, ChangeEvent, ListFilter, ResourceStore, Step, STEP_KIND};
use log::{debug, error, info, warn};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::watch;

/// Motor de reconciliación de steps.
///
/// El procesamiento es estrictamente secuencial: el evento N+1 no empieza
/// hasta que el despacho del evento N haya vuelto. Un despacho colgado
/// bloquea toda la reconciliación posterior de este motor.
pub struct Reconciler {
  store: Arc<dyn ResourceStore>,
  invoker: Arc<ActionInvoker>,
  namespace: String,
}

impl Reconciler {
  pub fn new(store: Arc<dyn ResourceStore>, invoker: Arc<ActionInvoker>, namespace: &str) -> Self {
    Self { store, invoker, namespace: namespace.to_string() }
  }

  /// Reproduce el snapshot y luego atiende el flujo de cambios hasta que
  /// `shutdown` pase a `true` o la suscripción termine. Un fallo al obtener
  /// el snapshot o al abrir la suscripción es fatal.
  pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ControllerError> {
    let Some(since) = self.replay_snapshot(&shutdown).await? else {
      info!("parada solicitada durante el snapshot");
      return Ok(());
    };

    let mut stream = self.store
                         .watch(&self.namespace, STEP_KIND, since)
                         .await
                         .map_err(ControllerError::Watch)?;
    info!("suscrito a steps de {} desde la versión {}", self.namespace, since);

    loop {
      if *shutdown.borrow() {
        stream.close();
        info!("reconciliación detenida");
        return Ok(());
      }
      tokio::select! {
        changed = shutdown.changed() => {
          if changed.is_err() {
            stream.close();
            return Ok(());
          }
        }
        event = stream.next() => {
          match event {
            Some(event) => self.handle_event(event).await,
            None => {
              warn!("la suscripción de steps terminó");
              return Ok(());
            }
          }
        }
      }
    }
  }

  /// Procesa cada step del snapshot en orden de iteración. Devuelve la
  /// versión máxima vista, o `None` si se pidió parada a mitad.
  async fn replay_snapshot(&self, shutdown: &watch::Receiver<bool>) -> Result<Option<i64>, ControllerError> {
    let items = self.store
                    .list(&self.namespace, STEP_KIND, &ListFilter::all())
                    .await
                    .map_err(ControllerError::Snapshot)?;
    info!("snapshot de {} steps en {}", items.len(), self.namespace);

    let mut max_version = 0i64;
    for item in items {
      if *shutdown.borrow() {
        return Ok(None);
      }
      if let Some(v) = resource_version_of(&item) {
        max_version = max_version.max(v);
      }
      match decode_step(item) {
        Ok(step) => self.reconcile(&step).await,
        Err(e) => error!("step del snapshot ilegible: {}", e),
      }
    }
    Ok(Some(max_version))
  }

  async fn handle_event(&self, event: ChangeEvent) {
    if event.name().is_empty() {
      debug!("evento v{} sin nombre, se ignora", event.version);
      return;
    }
    let name = event.name().to_string();
    let step = match decode_step(event.object) {
      Ok(step) => step,
      Err(e) => {
        error!("evento de step ({}) v{} ilegible: {}", name, event.version, e);
        return;
      }
    };
    info!("recibido step ({}) flow ({})", step.name(), step.spec.flow_id);
    self.reconcile(&step).await;
  }

  /// Pasa un step por el invocador y registra el resultado. Los errores
  /// quedan contenidos en el propio step.
  async fn reconcile(&self, step: &Step) {
    if step.is_done() {
      info!("step ({}) flow ({}) terminado, sin acción", step.name(), step.spec.flow_id);
      return;
    }
    match self.invoker.invoke(step).await {
      Ok(InvokeOutcome::Dispatched) => debug!("step ({}) despachado", step.name()),
      Ok(outcome) => debug!("step ({}) sin efecto: {:?}", step.name(), outcome),
      Err(e @ InvokeError::Dispatch { .. }) => match e.retry_in() {
        Some(delay) => warn!("flow ({}) step ({}): {}; reintento en {:?}", step.spec.flow_id, step.name(), e, delay),
        None => error!("flow ({}) step ({}): {}; sin más reintentos", step.spec.flow_id, step.name(), e),
      },
      Err(e) => error!("flow ({}) step ({}) requiere intervención: {}", step.spec.flow_id, step.name(), e),
    }
  }
}

fn decode_step(object: JsonValue) -> Result<Step, serde_json::Error> {
  serde_json::from_value(object)
}
