//! Tests for the events reported to a custom tracer.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use common::Directory;
use query_chain::{
    build_chain, CacheStatus, ChainRuntime, EntryStatus, ExecutionResult, InvalidationReason,
    QueryKey, SpanId, StepKind, TargetChange, Tracer,
};

#[derive(Default)]
struct RecordingTracer {
    next_span: AtomicU64,
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingTracer {
    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl Tracer for RecordingTracer {
    fn new_span_id(&self) -> SpanId {
        SpanId(self.next_span.fetch_add(1, Ordering::Relaxed))
    }

    fn on_evaluation_start(&self, _span_id: SpanId, _root: &QueryKey) {
        self.push("start".into());
    }

    fn on_step(&self, _span_id: SpanId, _key: &QueryKey, kind: StepKind) {
        self.push(format!("step {:?}", kind));
    }

    fn on_short_circuit(&self, _span_id: SpanId, _key: &QueryKey) {
        self.push("short-circuit".into());
    }

    fn on_evaluation_end(&self, _span_id: SpanId, _key: &QueryKey, result: ExecutionResult) {
        match result {
            ExecutionResult::Ok => self.push("end ok".into()),
            ExecutionResult::Error { .. } => self.push("end err".into()),
        }
    }

    fn on_target_checked(&self, _key: &QueryKey, change: TargetChange) {
        self.push(format!("target {:?}", change));
    }

    fn on_cache_check(&self, _key: &QueryKey, status: CacheStatus) {
        self.push(format!("cache {:?}", status));
    }

    fn on_produce_start(&self, _key: &QueryKey) {
        self.push("produce".into());
    }

    fn on_produce_end(&self, _key: &QueryKey, result: ExecutionResult) {
        match result {
            ExecutionResult::Ok => self.push("produced ok".into()),
            ExecutionResult::Error { .. } => self.push("produced err".into()),
        }
    }

    fn on_invalidated(&self, _key: &QueryKey, reason: InvalidationReason) {
        self.push(format!("invalidated {:?}", reason));
    }
}

fn recording_runtime() -> (ChainRuntime, Arc<Mutex<Vec<String>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let runtime = ChainRuntime::builder()
        .tracer(RecordingTracer {
            events: events.clone(),
            ..Default::default()
        })
        .build();
    (runtime, events)
}

fn take(events: &Mutex<Vec<String>>) -> Vec<String> {
    std::mem::take(&mut *events.lock())
}

#[tokio::test]
async fn test_miss_then_hit() {
    let directory = Directory::sample();
    let (runtime, events) = recording_runtime();
    let lazy = build_chain(directory.customer("A")).call("getDetailed").get("name");

    lazy.evaluate(&runtime).await.unwrap();
    assert_eq!(
        take(&events),
        vec![
            "start",
            "step Call",
            "target First",
            "cache Miss",
            "produce",
            "produced ok",
            "step Property",
            "end ok",
        ]
    );

    lazy.evaluate(&runtime).await.unwrap();
    assert_eq!(
        take(&events),
        vec![
            "start",
            "step Call",
            "target Unchanged",
            "cache Hit",
            "step Property",
            "end ok",
        ]
    );
}

#[tokio::test]
async fn test_short_circuit_and_transform_events() {
    let directory = Directory::sample();
    let (runtime, events) = recording_runtime();

    build_chain(directory.customer("A"))
        .call("findDetailed")
        .get("child")
        .transform(|v| v.clone())
        .evaluate(&runtime)
        .await
        .unwrap();

    let events = take(&events);
    assert!(events.contains(&"short-circuit".to_string()));
    assert!(events.contains(&"step Transform".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("end ok"));
}

#[tokio::test]
async fn test_invalidation_reasons() {
    let directory = Directory::sample();
    let (runtime, events) = recording_runtime();
    let lazy = build_chain(directory.customer("A")).call("getName");

    lazy.evaluate(&runtime).await.unwrap();
    lazy.invalidate(&runtime);
    assert!(take(&events).contains(&"invalidated Manual".to_string()));

    lazy.evaluate(&runtime).await.unwrap();
    directory.rename("A", "Alicia");
    build_chain(directory.customer("A"))
        .call("getName")
        .evaluate(&runtime)
        .await
        .unwrap();
    let events = take(&events);
    assert!(events.contains(&"target Changed".to_string()));
    assert!(events.contains(&"invalidated TargetChanged".to_string()));
}

#[tokio::test]
async fn test_failed_evaluation_reports_error() {
    let directory = Directory::sample();
    let (runtime, events) = recording_runtime();
    directory.set_offline(true);

    let result = build_chain(directory.customer("A"))
        .call("getName")
        .evaluate(&runtime)
        .await;
    assert!(result.is_err());

    let events = take(&events);
    assert!(events.contains(&"produced err".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("end err"));
}

/// Reads back the cache it reports on from inside its callbacks.
struct ReentrantTracer {
    runtime: Arc<Mutex<Option<ChainRuntime>>>,
    seen: Arc<Mutex<Vec<Option<EntryStatus>>>>,
}

impl ReentrantTracer {
    fn observe(&self, key: &QueryKey) {
        let runtime = self.runtime.lock().clone();
        if let Some(runtime) = runtime {
            let status = runtime.cache_status(key);
            assert!(runtime.query_keys().contains(key));
            self.seen.lock().push(status);
        }
    }
}

impl Tracer for ReentrantTracer {
    fn new_span_id(&self) -> SpanId {
        SpanId(0)
    }

    fn on_cache_check(&self, key: &QueryKey, _status: CacheStatus) {
        self.observe(key);
    }

    fn on_produce_start(&self, key: &QueryKey) {
        self.observe(key);
    }

    fn on_produce_end(&self, key: &QueryKey, _result: ExecutionResult) {
        self.observe(key);
    }

    fn on_invalidated(&self, key: &QueryKey, _reason: InvalidationReason) {
        self.observe(key);
    }
}

#[tokio::test]
async fn test_tracer_may_read_the_cache_from_callbacks() {
    let directory = Directory::sample();
    let slot = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let runtime = ChainRuntime::builder()
        .tracer(ReentrantTracer {
            runtime: slot.clone(),
            seen: seen.clone(),
        })
        .build();
    *slot.lock() = Some(runtime.clone());
    let lazy = build_chain(directory.customer("A")).call("getName");

    let run = async {
        lazy.evaluate(&runtime).await.unwrap();
        lazy.evaluate(&runtime).await.unwrap();
        assert_eq!(lazy.invalidate(&runtime), 1);
    };
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("evaluation stalled inside a tracer callback");
    *slot.lock() = None;

    assert_eq!(
        *seen.lock(),
        vec![
            // miss, produce start, produce end
            Some(EntryStatus::Pending),
            Some(EntryStatus::Pending),
            Some(EntryStatus::Pending),
            // hit
            Some(EntryStatus::Ready),
            // invalidated
            Some(EntryStatus::Stale),
        ]
    );
}

#[cfg(feature = "tracing")]
#[tokio::test]
async fn test_tracing_tracer_forwards_without_subscriber() {
    let directory = Directory::sample();
    let runtime = ChainRuntime::builder()
        .tracer(query_chain::TracingTracer::new())
        .build();

    let evaluation = build_chain(directory.customer("A"))
        .call("getName")
        .evaluate(&runtime)
        .await
        .unwrap();
    assert_eq!(evaluation.value(), &query_chain::Value::from("Customer Alice"));
}
