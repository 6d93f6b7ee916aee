mod common;

use common::*;
use flow::{Action, FlowError, ParamType, ParameterValidationError, ResourceStore, ServeType, Step, ACK_STATE_KEY,
           FLOW_ID_KEY, STEP_KIND, STEP_NAME_KEY, UUID_KEY};
use flow_controller::{ActionInvoker, Backoff, InvokeError, InvokeOutcome, RetryHandler, RetryPolicy, RetryScheduler};
use flow_transport::{TransportError, TransportRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn done_step_is_a_no_op() {
  let store = CountingStore::new();
  let transport = RecordingTransport::ok();
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner.put_action(NS, &notify_action()).unwrap();
  let mut step = notify_step("s1", 0);
  step.spec.done = true;
  let step = store.inner.put_step(NS, &step).unwrap();

  assert_eq!(invoker.invoke(&step).await.unwrap(), InvokeOutcome::SkippedDone);
  assert_eq!(store.action_gets(), 0);
  assert_eq!(transport.count(), 0);
  assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn foreign_kind_is_a_no_op() {
  let store = CountingStore::new();
  let transport = RecordingTransport::ok();
  let (invoker, _) = invoker(&store, &transport, RetryPolicy::default());
  let mut step = notify_step("s1", 0);
  step.metadata.kind = "Flow".into();

  assert_eq!(invoker.invoke(&step).await.unwrap(), InvokeOutcome::SkippedKind);
  assert_eq!(store.action_gets(), 0);
  assert_eq!(transport.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_action_fails_without_retry() {
  let store = CountingStore::new();
  let transport = RecordingTransport::ok();
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  let err = invoker.invoke(&step).await.unwrap_err();
  match &err {
    InvokeError::ActionLookup { action, source } => {
      assert_eq!(action, "notify");
      assert!(matches!(source, FlowError::NotFound(_)));
    }
    other => panic!("error inesperado: {:?}", other),
  }
  assert!(err.is_permanent());
  assert!(err.retry_in().is_none());
  assert_eq!(transport.count(), 0);
  assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn invalid_params_fail_without_retry() {
  let store = CountingStore::new();
  let transport = RecordingTransport::ok();
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner
       .put_action(NS, &notify_action().with_param("attempts", ParamType::Int))
       .unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  let err = invoker.invoke(&step).await.unwrap_err();
  match err {
    InvokeError::Validation { step, source } => {
      assert_eq!(step, "s1");
      assert_eq!(source, ParameterValidationError::Missing { name: "attempts".into() });
    }
    other => panic!("error inesperado: {:?}", other),
  }
  assert_eq!(transport.count(), 0);
  assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn successful_dispatch_sends_enriched_params() {
  let store = CountingStore::new();
  let transport = RecordingTransport::ok();
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner.put_action(NS, &notify_action()).unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  assert_eq!(invoker.invoke(&step).await.unwrap(), InvokeOutcome::Dispatched);
  let calls = transport.calls();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].endpoint, ENDPOINT);
  let params = &calls[0].params;
  assert_eq!(params["email"], json!("ops@example.com"));
  assert_eq!(params[FLOW_ID_KEY], json!("flow-1"));
  assert_eq!(params[STEP_NAME_KEY], json!("s1"));
  assert_eq!(params[ACK_STATE_KEY], json!("ok,fail"));
  assert_eq!(params[UUID_KEY], json!(step.metadata.uuid.to_string()));
  assert!(scheduler.is_empty());
  // el step guardado no se toca
  let stored: Step = serde_json::from_value(store.inner.get(NS, STEP_KIND, "s1").await.unwrap()).unwrap();
  assert_eq!(stored.spec.action_params.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_dispatch_schedules_retry_after_retry_count_seconds() {
  let store = CountingStore::new();
  let transport = RecordingTransport::failing(1);
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner.put_action(NS, &notify_action()).unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 3)).unwrap();

  let before = Instant::now();
  let err = invoker.invoke(&step).await.unwrap_err();
  assert!(matches!(err, InvokeError::Dispatch { source: TransportError::Request { .. }, .. }));
  assert!(!err.is_permanent());
  assert_eq!(err.retry_in(), Some(Duration::from_secs(3)));

  let pending = scheduler.pending(&step.metadata.identity()).expect("reintento pendiente");
  assert_eq!(pending.attempt, 1);
  assert_eq!(pending.due, before + Duration::from_secs(3));
  assert_eq!(pending.step, step);
}

#[tokio::test(start_paused = true)]
async fn zero_retry_count_waits_one_second() {
  let store = CountingStore::new();
  let transport = RecordingTransport::failing(1);
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner.put_action(NS, &notify_action()).unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  let before = Instant::now();
  invoker.invoke(&step).await.unwrap_err();
  assert_eq!(scheduler.next_due(), Some(before + Duration::from_secs(1)));
}

#[tokio::test(start_paused = true)]
async fn retry_resends_identical_params() {
  let store = CountingStore::new();
  let transport = RecordingTransport::failing(1);
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner.put_action(NS, &notify_action()).unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  invoker.invoke(&step).await.unwrap_err();
  tokio::time::advance(Duration::from_secs(1)).await;
  let entry = scheduler.pop_due(Instant::now()).expect("reintento vencido");
  invoker.on_timer(entry).await;

  let calls = transport.calls();
  assert_eq!(calls.len(), 2);
  assert_eq!(calls[0].params, calls[1].params);
  assert!(scheduler.is_empty());
}

#[tokio::test(start_paused = true)]
async fn retry_is_dropped_when_step_finished_meanwhile() {
  let store = CountingStore::new();
  let transport = RecordingTransport::failing(1);
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner.put_action(NS, &notify_action()).unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  invoker.invoke(&step).await.unwrap_err();
  store.inner.mark_step_done(NS, "s1").unwrap();
  tokio::time::advance(Duration::from_secs(1)).await;
  invoker.on_timer(scheduler.pop_due(Instant::now()).unwrap()).await;
  assert_eq!(transport.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_is_dropped_when_step_was_deleted() {
  let store = CountingStore::new();
  let transport = RecordingTransport::failing(1);
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner.put_action(NS, &notify_action()).unwrap();
  // el step nunca se guarda: la relectura da NotFound
  let mut step = notify_step("ghost", 0);
  step.metadata.namespace = NS.into();

  invoker.invoke(&step).await.unwrap_err();
  tokio::time::advance(Duration::from_secs(1)).await;
  invoker.on_timer(scheduler.pop_due(Instant::now()).unwrap()).await;
  assert_eq!(transport.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_is_dropped_when_a_newer_version_exists() {
  let store = CountingStore::new();
  let transport = RecordingTransport::failing(1);
  let (invoker, scheduler) = invoker(&store, &transport, RetryPolicy::default());
  store.inner.put_action(NS, &notify_action()).unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  invoker.invoke(&step).await.unwrap_err();
  store.inner.put_step(NS, &step).unwrap();
  tokio::time::advance(Duration::from_secs(1)).await;
  invoker.on_timer(scheduler.pop_due(Instant::now()).unwrap()).await;
  assert_eq!(transport.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn unsupported_serve_type_is_permanent() {
  let store = CountingStore::new();
  let transport = RecordingTransport::ok();
  let scheduler = Arc::new(RetryScheduler::new(Duration::from_millis(500)));
  let dyn_store: Arc<dyn ResourceStore> = store.clone();
  let invoker = ActionInvoker::new(dyn_store, TransportRegistry::new(), scheduler.clone(), NS, RetryPolicy::default());
  store.inner
       .put_action(NS, &Action::new("notify", ServeType::Grpc, "actions:9000").with_param("email", ParamType::Str))
       .unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  let err = invoker.invoke(&step).await.unwrap_err();
  assert!(matches!(err, InvokeError::UnsupportedTransport { source: TransportError::Unsupported(ServeType::Grpc), .. }));
  assert!(err.is_permanent());
  assert!(scheduler.is_empty());
  assert_eq!(transport.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn max_attempts_stops_rescheduling() {
  let store = CountingStore::new();
  let transport = RecordingTransport::always_failing();
  let policy = RetryPolicy { backoff: Backoff::Flat, max_attempts: Some(2) };
  let (invoker, scheduler) = invoker(&store, &transport, policy);
  store.inner.put_action(NS, &notify_action()).unwrap();
  let step = store.inner.put_step(NS, &notify_step("s1", 0)).unwrap();

  invoker.invoke(&step).await.unwrap_err();
  for _ in 0..2 {
    tokio::time::advance(Duration::from_secs(1)).await;
    invoker.on_timer(scheduler.pop_due(Instant::now()).expect("reintento")).await;
  }
  assert_eq!(transport.count(), 3);
  assert!(scheduler.is_empty());

  let err = invoker.invoke_attempt(&step, 2).await.unwrap_err();
  assert_eq!(err.retry_in(), None);
}
