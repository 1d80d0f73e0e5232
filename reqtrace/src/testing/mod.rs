//! In-memory test doubles for the tracer collaborator.
//!
//! [`RecordingTracer`] captures every span interaction so tests can assert
//! on names, parents, tags, logs, and finish behavior without a tracing
//! backend. Wire propagation uses a single `uber-trace-id`-style field whose
//! value is the trace id itself.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::common::{SpanLog, Value};
use crate::propagation::{Extractor, Injector};
use crate::trace::{BoxedSpan, ParentRef, Span, SpanContext, TraceError, TraceResult, Tracer};

/// Wire field written and read by the recording tracer.
pub const WIRE_FIELD: &str = "uber-trace-id";

/// Everything a [`RecordingTracer`] span captured.
#[derive(Clone, Debug, Default)]
pub struct SpanRecord {
    /// Name the span was started with, updated by `set_operation_name`.
    pub operation_name: String,
    /// Trace id of the parent context, `None` for new traces.
    pub parent_trace_id: Option<String>,
    /// Tags in the order they were first set.
    pub tags: IndexMap<String, Value>,
    /// Ordered log entries.
    pub logs: Vec<SpanLog>,
    /// Whether a finish call succeeded.
    pub finished: bool,
    /// Total finish attempts, successful or not.
    pub finish_calls: u32,
}

#[derive(Clone, Debug)]
struct RecordingSpanContext {
    trace_id: String,
}

impl SpanContext for RecordingSpanContext {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_trace_id(&self) -> String {
        self.trace_id.clone()
    }
}

#[derive(Debug)]
struct RecordingSpan {
    record: Arc<Mutex<SpanRecord>>,
    context: RecordingSpanContext,
    fail_finish: bool,
}

impl RecordingSpan {
    fn record(&self) -> std::sync::MutexGuard<'_, SpanRecord> {
        match self.record.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Span for RecordingSpan {
    fn set_tag(&mut self, key: &str, value: Value) {
        self.record().tags.insert(key.to_owned(), value);
    }

    fn log(&mut self, log: SpanLog) {
        self.record().logs.push(log);
    }

    fn set_operation_name(&mut self, name: &str) {
        self.record().operation_name = name.to_owned();
    }

    fn context(&self) -> &dyn SpanContext {
        &self.context
    }

    fn finish(&mut self) -> TraceResult<()> {
        let mut record = self.record();
        record.finish_calls += 1;
        if self.fail_finish {
            return Err(TraceError::FinishRejected("injected failure".to_owned()));
        }
        if record.finished {
            return Err(TraceError::FinishRejected(
                "span already finished".to_owned(),
            ));
        }
        record.finished = true;
        Ok(())
    }
}

/// Tracer that records every span it creates.
#[derive(Debug)]
pub struct RecordingTracer {
    spans: Mutex<Vec<Arc<Mutex<SpanRecord>>>>,
    next_trace: AtomicU64,
    fail_finish: AtomicBool,
    fields: [String; 1],
}

impl Default for RecordingTracer {
    fn default() -> Self {
        RecordingTracer::new()
    }
}

impl RecordingTracer {
    /// A tracer with no recorded spans.
    pub fn new() -> Self {
        RecordingTracer {
            spans: Mutex::new(Vec::new()),
            next_trace: AtomicU64::new(0),
            fail_finish: AtomicBool::new(false),
            fields: [WIRE_FIELD.to_owned()],
        }
    }

    /// Makes finish fail on every span created afterwards.
    pub fn fail_finish(&self, fail: bool) {
        self.fail_finish.store(fail, Ordering::SeqCst);
    }

    /// Number of spans created so far.
    pub fn span_count(&self) -> usize {
        self.lock_spans().len()
    }

    /// Copy of the `index`-th created span's record.
    ///
    /// # Panics
    ///
    /// Panics when fewer than `index + 1` spans were created.
    pub fn snapshot(&self, index: usize) -> SpanRecord {
        let record = {
            let spans = self.lock_spans();
            spans
                .get(index)
                .unwrap_or_else(|| panic!("no span at index {index}, {} recorded", spans.len()))
                .clone()
        };
        let snapshot = match record.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        snapshot
    }

    fn lock_spans(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Mutex<SpanRecord>>>> {
        match self.spans.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, operation_name: &str, parent: ParentRef<'_>) -> BoxedSpan {
        let (trace_id, parent_trace_id) = match parent {
            ParentRef::Root => {
                let n = self.next_trace.fetch_add(1, Ordering::SeqCst) + 1;
                (format!("trace-{n}"), None)
            }
            // Children stay in the parent's trace.
            ParentRef::Context(context) => (context.to_trace_id(), Some(context.to_trace_id())),
        };

        let record = Arc::new(Mutex::new(SpanRecord {
            operation_name: operation_name.to_owned(),
            parent_trace_id,
            ..SpanRecord::default()
        }));
        self.lock_spans().push(Arc::clone(&record));

        Box::new(RecordingSpan {
            record,
            context: RecordingSpanContext { trace_id },
            fail_finish: self.fail_finish.load(Ordering::SeqCst),
        })
    }

    fn extract(&self, carrier: &dyn Extractor) -> Option<Box<dyn SpanContext>> {
        carrier.get(WIRE_FIELD).map(|trace_id| {
            Box::new(RecordingSpanContext {
                trace_id: trace_id.to_owned(),
            }) as Box<dyn SpanContext>
        })
    }

    fn inject(&self, context: &dyn SpanContext, injector: &mut dyn Injector) {
        injector.set(WIRE_FIELD, context.to_trace_id());
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn records_interactions() {
        let tracer = RecordingTracer::new();
        let mut span = tracer.start_span("op", ParentRef::Root);

        span.set_tag("flag", Value::from(true));
        span.log(SpanLog::event("request_received"));
        span.set_operation_name("renamed");
        assert!(span.finish().is_ok());

        let record = tracer.snapshot(0);
        assert_eq!(record.operation_name, "renamed");
        assert_eq!(record.tags["flag"], Value::from(true));
        assert_eq!(record.logs, vec![SpanLog::event("request_received")]);
        assert!(record.finished);
        assert_eq!(record.finish_calls, 1);
    }

    #[test]
    fn double_finish_is_rejected() {
        let tracer = RecordingTracer::new();
        let mut span = tracer.start_span("op", ParentRef::Root);

        assert!(span.finish().is_ok());
        assert!(span.finish().is_err());
        assert_eq!(tracer.snapshot(0).finish_calls, 2);
    }

    #[test]
    fn injected_finish_failure_leaves_span_unfinished() {
        let tracer = RecordingTracer::new();
        tracer.fail_finish(true);
        let mut span = tracer.start_span("op", ParentRef::Root);

        assert!(span.finish().is_err());
        let record = tracer.snapshot(0);
        assert!(!record.finished);
        assert_eq!(record.finish_calls, 1);
    }

    #[test]
    fn wire_roundtrip_preserves_trace_id() {
        let tracer = RecordingTracer::new();
        let span = tracer.start_span("op", ParentRef::Root);

        let mut carrier: HashMap<String, String> = HashMap::new();
        tracer.inject(span.context(), &mut carrier);
        let extracted = tracer.extract(&carrier).expect("context present");

        assert_eq!(extracted.to_trace_id(), span.context().to_trace_id());
    }

    #[test]
    fn children_share_the_parent_trace() {
        let tracer = RecordingTracer::new();
        let parent = tracer.start_span("parent", ParentRef::Root);
        let child = tracer.start_span("child", ParentRef::Context(parent.context()));

        assert_eq!(
            child.context().to_trace_id(),
            parent.context().to_trace_id()
        );
        assert_eq!(
            tracer.snapshot(1).parent_trace_id,
            Some(parent.context().to_trace_id())
        );
    }
}
