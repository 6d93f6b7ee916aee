//! flow-controller: controlador de steps
//!
//! Núcleo del ejecutor declarativo de steps. Observa los recursos `Step` de
//! un namespace, resuelve la `Action` de cada uno, valida y enriquece sus
//! parámetros, la despacha por el transporte de su `serveType` y reprograma
//! los despachos fallidos en una cola de reintentos ordenada por tiempo.
//!
//! - `reconciler`: snapshot inicial + flujo de cambios, procesados en orden.
//! - `invoker`: invocación idempotente por step y clasificación de errores.
//! - `scheduler`: cola de retardo compartida y su bucle de drenado.
//! - `controller`: arranque y parada coordinada de ambos bucles.

pub mod config;
pub mod controller;
pub mod errors;
pub mod invoker;
pub mod reconciler;
pub mod scheduler;

pub use config::{Backoff, ControllerConfig, RetryPolicy, MIN_RETRY_DELAY};
pub use controller::{Controller, ControllerState};
pub use errors::{ControllerError, InvokeError};
pub use invoker::{ActionInvoker, InvokeOutcome};
pub use reconciler::Reconciler;
pub use scheduler::{DelayQueue, RetryEntry, RetryHandler, RetryScheduler, MAX_SCHEDULE_DELAY};
