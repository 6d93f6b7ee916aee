#![allow(dead_code)]

use async_trait::async_trait;
use flow::stubs::InMemoryResourceStore;
use flow::{Action, FlowError, ListFilter, ParamMap, ParamType, ResourceStore, ServeType, Step, WatchStream,
           ACTION_KIND, STEP_NAME_KEY};
use flow_controller::{ActionInvoker, RetryPolicy, RetryScheduler};
use flow_transport::{Transport, TransportError, TransportRegistry};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

pub const NS: &str = "echoer";
pub const ENDPOINT: &str = "http://actions.local/notify";

/// Llamada registrada por `RecordingTransport`.
#[derive(Debug, Clone)]
pub struct Call {
  pub endpoint: String,
  pub params: ParamMap,
  pub at: Instant,
}

/// Transporte de prueba: registra cada llamada y falla las `n` primeras.
pub struct RecordingTransport {
  calls: Mutex<Vec<Call>>,
  failures_left: AtomicUsize,
}

impl RecordingTransport {
  pub fn ok() -> Arc<Self> {
    Self::failing(0)
  }

  pub fn failing(n: usize) -> Arc<Self> {
    Arc::new(Self { calls: Mutex::new(Vec::new()), failures_left: AtomicUsize::new(n) })
  }

  pub fn always_failing() -> Arc<Self> {
    Self::failing(usize::MAX)
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

#[async_trait]
impl Transport for RecordingTransport {
  fn name(&self) -> &str {
    "recording"
  }

  async fn dispatch(&self, endpoint: &str, params: &ParamMap) -> Result<(), TransportError> {
    self.calls.lock().unwrap().push(Call { endpoint: endpoint.to_string(), params: params.clone(), at: Instant::now() });
    let failed = self.failures_left
                     .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n > 0 { Some(n - 1) } else { None })
                     .is_ok();
    if failed {
      return Err(TransportError::Request { endpoint: endpoint.to_string(), message: "connection refused".into() });
    }
    Ok(())
  }
}

/// Store en memoria que cuenta las lecturas de acciones y puede fallar el
/// snapshot.
pub struct CountingStore {
  pub inner: InMemoryResourceStore,
  action_gets: AtomicUsize,
  watches: AtomicUsize,
  fail_list: AtomicBool,
}

impl CountingStore {
  pub fn new() -> Arc<Self> {
    Arc::new(Self { inner: InMemoryResourceStore::new(),
                    action_gets: AtomicUsize::new(0),
                    watches: AtomicUsize::new(0),
                    fail_list: AtomicBool::new(false) })
  }

  pub fn failing_list() -> Arc<Self> {
    let store = Self::new();
    store.fail_list.store(true, Ordering::SeqCst);
    store
  }

  pub fn action_gets(&self) -> usize {
    self.action_gets.load(Ordering::SeqCst)
  }

  /// Número de suscripciones `watch` abiertas desde la creación.
  pub fn watches(&self) -> usize {
    self.watches.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ResourceStore for CountingStore {
  async fn list(&self, namespace: &str, kind: &str, filter: &ListFilter) -> flow::Result<Vec<Value>> {
    if self.fail_list.load(Ordering::SeqCst) {
      return Err(FlowError::Storage("connection refused".into()));
    }
    self.inner.list(namespace, kind, filter).await
  }

  async fn get(&self, namespace: &str, kind: &str, name: &str) -> flow::Result<Value> {
    if kind == ACTION_KIND {
      self.action_gets.fetch_add(1, Ordering::SeqCst);
    }
    self.inner.get(namespace, kind, name).await
  }

  async fn watch(&self, namespace: &str, kind: &str, since_version: i64) -> flow::Result<WatchStream> {
    self.watches.fetch_add(1, Ordering::SeqCst);
    self.inner.watch(namespace, kind, since_version).await
  }
}

/// Inicio de un despacho retenido por `GatedTransport`.
#[derive(Debug, Clone)]
pub struct Started {
  pub step: String,
  /// Despachos ya terminados cuando éste empezó.
  pub finished_before: usize,
}

/// Transporte que retiene cada despacho hasta que el test lo libera con
/// `release`.
pub struct GatedTransport {
  gate: Semaphore,
  started: Mutex<Vec<Started>>,
  finished: AtomicUsize,
}

impl GatedTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self { gate: Semaphore::new(0), started: Mutex::new(Vec::new()), finished: AtomicUsize::new(0) })
  }

  /// Deja terminar un despacho retenido.
  pub fn release(&self) {
    self.gate.add_permits(1);
  }

  pub fn started(&self) -> Vec<Started> {
    self.started.lock().unwrap().clone()
  }

  pub fn started_count(&self) -> usize {
    self.started.lock().unwrap().len()
  }

  pub fn finished(&self) -> usize {
    self.finished.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Transport for GatedTransport {
  fn name(&self) -> &str {
    "gated"
  }

  async fn dispatch(&self, _endpoint: &str, params: &ParamMap) -> Result<(), TransportError> {
    let step = params.get(STEP_NAME_KEY).and_then(|v| v.as_str()).unwrap_or("").to_string();
    self.started.lock().unwrap().push(Started { step, finished_before: self.finished.load(Ordering::SeqCst) });
    self.gate.acquire().await.unwrap().forget();
    self.finished.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

pub fn notify_action() -> Action {
  Action::new("notify", ServeType::Http, ENDPOINT).with_param("email", ParamType::Str)
                                                  .with_return_states(&["ok", "fail"])
}

pub fn notify_step(name: &str, retry_count: u32) -> Step {
  let params: ParamMap = serde_json::from_value(json!({"email": "ops@example.com"})).unwrap();
  let mut step = Step::new(name, "flow-1", "notify", params);
  step.spec.retry_count = retry_count;
  step
}

pub fn registry<T: Transport + 'static>(transport: &Arc<T>) -> TransportRegistry {
  TransportRegistry::new().with(ServeType::Http, transport.clone())
}

pub fn invoker(store: &Arc<CountingStore>,
               transport: &Arc<RecordingTransport>,
               policy: RetryPolicy)
               -> (ActionInvoker, Arc<RetryScheduler>) {
  let scheduler = Arc::new(RetryScheduler::new(Duration::from_millis(500)));
  let store: Arc<dyn ResourceStore> = store.clone();
  (ActionInvoker::new(store, registry(transport), scheduler.clone(), NS, policy), scheduler)
}

/// Espera (en tiempo de tokio) a que se cumpla `cond`.
pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
  for _ in 0..400 {
    if cond() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
  }
  panic!("timeout esperando: {}", what);
}
