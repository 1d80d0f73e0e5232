use std::fmt;
use std::sync::{Arc, Mutex};

use crate::common::{SpanLog, Value};
use crate::trace::{SpanContext, TraceResult};

/// The interface for a single traced operation.
///
/// Implementations are owned by the tracer collaborator; this crate only
/// drives them. [`Span::finish`] must be invoked at most once -- the caller
/// side of that contract is enforced by this crate's bookkeeping (the
/// request finish latch and the invocation phase machine), never by assuming
/// the collaborator tolerates repeats.
pub trait Span: fmt::Debug + Send {
    /// Set or overwrite an attribute of this span.
    fn set_tag(&mut self, key: &str, value: Value);

    /// Append an entry to this span's log sequence.
    fn log(&mut self, log: SpanLog);

    /// Update the span's operation name.
    fn set_operation_name(&mut self, name: &str);

    /// The propagation identity of this span.
    fn context(&self) -> &dyn SpanContext;

    /// Signals that the operation described by this span has ended.
    ///
    /// May fail; whether a failure is surfaced or deliberately discarded is
    /// the caller's decision.
    fn finish(&mut self) -> TraceResult<()>;
}

/// Owned span trait object as returned by [`Tracer::start_span`].
///
/// [`Tracer::start_span`]: crate::trace::Tracer::start_span
pub type BoxedSpan = Box<dyn Span>;

/// Cheaply cloneable handle to a span shared between the request state and
/// invocation contexts.
///
/// Within one request the span is never mutated concurrently -- hook phases
/// and completion callbacks run one at a time -- so the mutex only
/// serializes, it never contends.
#[derive(Clone, Debug)]
pub struct SharedSpan {
    inner: Arc<Mutex<BoxedSpan>>,
}

impl SharedSpan {
    /// Wraps a span handed out by the tracer collaborator.
    pub fn new(span: BoxedSpan) -> Self {
        SharedSpan {
            inner: Arc::new(Mutex::new(span)),
        }
    }

    /// Runs `f` against the underlying span.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Span) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(guard.as_mut())
    }

    /// Sets an attribute on the span.
    pub fn set_tag(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        self.with(|span| span.set_tag(key, value));
    }

    /// Appends a log entry to the span.
    pub fn log(&self, log: SpanLog) {
        self.with(|span| span.log(log));
    }

    /// Updates the span's operation name.
    pub fn set_operation_name(&self, name: &str) {
        self.with(|span| span.set_operation_name(name));
    }

    /// Textual trace identity of the span.
    pub fn to_trace_id(&self) -> String {
        self.with(|span| span.context().to_trace_id())
    }

    /// Finishes the span, discarding a collaborator failure.
    ///
    /// The failure is not retried and not recorded on the span itself (the
    /// span may be unusable); it only leaves an internal diagnostic.
    pub(crate) fn finish_quietly(&self) {
        if let Err(error) = self.with(|span| span.finish()) {
            tracing::debug!(%error, "discarding span finish failure");
        }
    }
}
