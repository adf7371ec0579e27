#![forbid(unsafe_code)]

//! Tracing output of the undo engine: the replay span with its fields, and
//! the levels used for episodes, failures and rejected snapshots.
//!
//! Run:
//!   cargo test -p undogrid-runtime --test tracing_replay_spans

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

use undogrid_core::{Grid, HookEvent, row};
use undogrid_harness::MemoryGrid;
use undogrid_runtime::UndoRedo;
use undogrid_runtime::undo::RowInsertion;

// ============================================================================
// Capture layer
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedSpan {
    name: String,
    fields: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: tracing::Level,
    message: String,
    fields: HashMap<String, String>,
    span: Option<String>,
}

#[derive(Default, Clone)]
struct Captured {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl Captured {
    fn spans_named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    fn events_at(&self, level: tracing::Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }
}

struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

struct CaptureLayer(Captured);

impl<S> tracing_subscriber::Layer<S> for CaptureLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        attrs.record(&mut visitor);
        self.0.spans.lock().unwrap().push(CapturedSpan {
            name: attrs.metadata().name().to_string(),
            fields: visitor.0.into_iter().collect(),
        });
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor(Vec::new());
        event.record(&mut visitor);
        let mut fields: HashMap<String, String> = visitor.0.into_iter().collect();
        let message = fields.remove("message").unwrap_or_default();
        let span = ctx.lookup_current().map(|s| s.name().to_string());
        self.0.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
            fields,
            span,
        });
    }
}

fn with_capture<R>(f: impl FnOnce() -> R) -> (R, Captured) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(captured.clone()));
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, captured)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn replay_runs_inside_a_span_with_direction_and_kind() {
    let ((), captured) = with_capture(|| {
        let grid = MemoryGrid::new(vec![row(["a"])]);
        let engine = UndoRedo::new(grid.clone());
        grid.set_data_at_cell(0, 0, "b");
        engine.undo().expect("undo");
        engine.redo().expect("redo");
    });

    let spans = captured.spans_named("undogrid.replay");
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].fields.get("direction").map(String::as_str), Some("undo"));
    assert_eq!(spans[1].fields.get("direction").map(String::as_str), Some("redo"));
    for span in &spans {
        assert_eq!(
            span.fields.get("command").map(String::as_str),
            Some("change_set")
        );
    }

    let started: Vec<_> = captured
        .events_at(tracing::Level::DEBUG)
        .into_iter()
        .filter(|e| e.message == "replay started")
        .collect();
    assert_eq!(started.len(), 2);
    assert!(
        started
            .iter()
            .all(|e| e.span.as_deref() == Some("undogrid.replay"))
    );
}

#[test]
fn episode_flush_is_logged_at_debug() {
    let ((), captured) = with_capture(|| {
        let grid = MemoryGrid::new(vec![row(["a", "b"])]);
        let engine = UndoRedo::new(grid.clone());
        engine.set_collecting(true);
        grid.set_data_at_cell(0, 0, "x");
        grid.set_data_at_cell(0, 1, "y");
        engine.set_collecting(false);
    });

    let flushed: Vec<_> = captured
        .events_at(tracing::Level::DEBUG)
        .into_iter()
        .filter(|e| e.message == "undo episode flushed")
        .collect();
    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].fields.get("items").map(String::as_str), Some("2"));
    assert_eq!(
        flushed[0].fields.get("command").map(String::as_str),
        Some("composite")
    );
}

#[test]
fn failed_replay_is_logged_at_warn() {
    let (result, captured) = with_capture(|| {
        let grid = MemoryGrid::new(vec![row(["a"])]);
        let engine = UndoRedo::new(grid.clone());
        engine.record(RowInsertion::new(9, 1));
        engine.undo()
    });

    assert!(result.is_err());
    let warnings = captured.events_at(tracing::Level::WARN);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "replay failed; entry kept");
    assert_eq!(
        warnings[0].fields.get("direction").map(String::as_str),
        Some("undo")
    );
}

#[test]
fn rejected_snapshot_is_logged_at_error() {
    let ((), captured) = with_capture(|| {
        let grid = MemoryGrid::new(Vec::new());
        let _engine = UndoRedo::new(grid.clone());
        grid.hooks().run(HookEvent::BeforeRemoveRow {
            index: 0,
            amount: 1,
        });
    });

    let errors = captured.events_at(tracing::Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "undo snapshot rejected");
    assert_eq!(
        errors[0].fields.get("hook").map(String::as_str),
        Some("beforeRemoveRow")
    );
}
