//! Programador de reintentos: cola de retardo compartida y bucle de drenado.
//!
//! La cola la mutan dos actores (el invocador al programar, el bucle al
//! extraer); todo acceso pasa por un único `Mutex` y la pareja
//! consultar+extraer se hace en una sola sección crítica (`pop_due`).

mod delay_queue;

pub use delay_queue::DelayQueue;

use async_trait::async_trait;
use flow::Step;
use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Techo de un retraso que no cabe en un `Instant`.
pub const MAX_SCHEDULE_DELAY: Duration = Duration::from_secs(30 * 24 * 3600);

/// Reintento pendiente: copia del step en el momento del fallo.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEntry {
  pub step: Step,
  /// Número de reintento que representa esta entrada (1 = primero).
  pub attempt: u32,
  pub due: Instant,
}

/// Receptor de los reintentos vencidos.
#[async_trait]
pub trait RetryHandler: Send + Sync {
  async fn on_timer(&self, entry: RetryEntry);
}

/// Cola de reintentos compartida más su bucle de drenado con sondeo fijo.
#[derive(Debug)]
pub struct RetryScheduler {
  queue: Mutex<DelayQueue<RetryEntry>>,
  poll_interval: Duration,
}

impl RetryScheduler {
  pub fn new(poll_interval: Duration) -> Self {
    Self { queue: Mutex::new(DelayQueue::new()), poll_interval }
  }

  fn lock(&self) -> MutexGuard<'_, DelayQueue<RetryEntry>> {
    self.queue.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn poll_interval(&self) -> Duration {
    self.poll_interval
  }

  /// Programa el reintento `attempt` de `step` dentro de `delay`. La clave
  /// es la identidad del step: un reintento pendiente del mismo step se
  /// sustituye. Devuelve el vencimiento.
  pub fn schedule(&self, step: Step, attempt: u32, delay: Duration) -> Instant {
    let now = Instant::now();
    let due = now.checked_add(delay).unwrap_or_else(|| {
                                      warn!("retraso de {:?} fuera de rango, se acota a {:?}", delay, MAX_SCHEDULE_DELAY);
                                      now + MAX_SCHEDULE_DELAY
                                    });
    let key = step.metadata.identity();
    let replaced = self.lock().schedule(&key, RetryEntry { step, attempt, due }, due);
    if let Some(old) = replaced {
      debug!("reintento pendiente de {} (intento {}) sustituido", key, old.attempt);
    }
    due
  }

  /// Extrae el reintento más temprano si ya venció.
  pub fn pop_due(&self, now: Instant) -> Option<RetryEntry> {
    self.lock().pop_due(now).map(|(entry, _)| entry)
  }

  /// Vencimiento del reintento más temprano.
  pub fn next_due(&self) -> Option<Instant> {
    self.lock().peek_earliest()
  }

  /// Reintento pendiente para la identidad `namespace/name`.
  pub fn pending(&self, identity: &str) -> Option<RetryEntry> {
    self.lock().get(identity).cloned()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Bucle de drenado: dispara todo reintento vencido y, cuando la cola
  /// queda vacía o la cabeza aún no vence, duerme `poll_interval`. Termina
  /// cuando `shutdown` pasa a `true` (o su emisor desaparece). Un disparo en
  /// curso siempre termina antes de salir.
  pub async fn run<H>(&self, handler: &H, mut shutdown: watch::Receiver<bool>)
    where H: RetryHandler + ?Sized
  {
    info!("bucle de reintentos iniciado (sondeo cada {:?})", self.poll_interval);
    'outer: loop {
      if *shutdown.borrow() {
        break;
      }
      while let Some(entry) = self.pop_due(Instant::now()) {
        debug!("disparando reintento {} de {}", entry.attempt, entry.step.metadata.identity());
        handler.on_timer(entry).await;
        if *shutdown.borrow() {
          break 'outer;
        }
      }
      tokio::select! {
        _ = tokio::time::sleep(self.poll_interval) => {}
        changed = shutdown.changed() => {
          if changed.is_err() || *shutdown.borrow() {
            break;
          }
        }
      }
    }
    info!("bucle de reintentos detenido ({} pendientes descartados)", self.len());
  }
}
