// Archivo: controller.rs
// Propósito: ciclo de vida del controlador de steps. Posee los dos bucles
// (reconciliación y drenado de reintentos) y su parada coordinada.
use crate::config::ControllerConfig;
use crate::errors::{ControllerError, Result};
use crate::invoker::ActionInvoker;
use crate::reconciler::Reconciler;
use crate::scheduler::RetryScheduler;
use flow::ResourceStore;
use flow_transport::TransportRegistry;
use log::{error, info};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Estados del controlador: `Created -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Controlador de steps de un namespace.
///
/// Se asume una única instancia por namespace (sin elección de líder).
pub struct Controller {
    state: Mutex<ControllerState>,
    shutdown_tx: watch::Sender<bool>,
    reconciler: Reconciler,
    invoker: Arc<ActionInvoker>,
    scheduler: Arc<RetryScheduler>,
    /// Se retiene durante toda la espera para que `run` y `stop` vuelvan
    /// sólo cuando el bucle de reintentos ya salió.
    drain: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Construye el controlador y arranca de inmediato el bucle de drenado
    /// de reintentos. Debe llamarse dentro de un runtime de tokio.
    pub fn new(store: Arc<dyn ResourceStore>, transports: TransportRegistry, config: &ControllerConfig) -> Self {
        let scheduler = Arc::new(RetryScheduler::new(config.poll_interval));
        let invoker = Arc::new(ActionInvoker::new(store.clone(),
                                                  transports,
                                                  scheduler.clone(),
                                                  &config.namespace,
                                                  config.retry));
        let reconciler = Reconciler::new(store, invoker.clone(), &config.namespace);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let drain = {
            let scheduler = scheduler.clone();
            let invoker = invoker.clone();
            tokio::spawn(async move { scheduler.run(invoker.as_ref(), shutdown_rx).await })
        };

        Self { state: Mutex::new(ControllerState::Created),
               shutdown_tx,
               reconciler,
               invoker,
               scheduler,
               drain: AsyncMutex::new(Some(drain)) }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ControllerState {
        *self.lock_state()
    }

    pub fn invoker(&self) -> &Arc<ActionInvoker> {
        &self.invoker
    }

    pub fn scheduler(&self) -> &Arc<RetryScheduler> {
        &self.scheduler
    }

    /// Reproduce el snapshot y atiende el flujo de cambios hasta la parada.
    /// Al salir (por parada, fin del flujo o error fatal) detiene también el
    /// bucle de reintentos y deja el controlador en `Stopped`.
    pub async fn run(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if *state != ControllerState::Created {
                return Err(ControllerError::InvalidState { operation: "run", state: *state });
            }
            *state = ControllerState::Running;
        }
        info!("controlador en marcha");

        let result = self.reconciler.run(self.shutdown_tx.subscribe()).await;
        if let Err(e) = &result {
            error!("la reconciliación terminó con error: {}", e);
        }
        self.shutdown_tx.send_replace(true);
        self.join_drain().await;
        *self.lock_state() = ControllerState::Stopped;
        info!("controlador detenido");
        result
    }

    /// Señala la parada a ambos bucles y espera a que el de reintentos
    /// termine. Los despachos en curso no se cancelan. Es de un solo uso: una
    /// segunda llamada falla con `InvalidState`.
    pub async fn stop(&self) -> Result<()> {
        let previous = {
            let mut state = self.lock_state();
            match *state {
                ControllerState::Created | ControllerState::Running => {
                    let previous = *state;
                    *state = ControllerState::Stopping;
                    previous
                }
                other => return Err(ControllerError::InvalidState { operation: "stop", state: other }),
            }
        };
        info!("parando controlador");
        self.shutdown_tx.send_replace(true);
        self.join_drain().await;
        if previous == ControllerState::Created {
            *self.lock_state() = ControllerState::Stopped;
        }
        Ok(())
    }

    async fn join_drain(&self) {
        let mut drain = self.drain.lock().await;
        if let Some(handle) = drain.take() {
            if let Err(e) = handle.await {
                error!("el bucle de reintentos terminó de forma anómala: {}", e);
            }
        }
    }
}
