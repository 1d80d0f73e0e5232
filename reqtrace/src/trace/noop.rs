//! No-op trace impls
//!
//! Useful for wiring the instrumentation without a tracing backend, and as
//! a placeholder in tests that only exercise control flow.

use std::any::Any;

use crate::common::{SpanLog, Value};
use crate::propagation::{Extractor, Injector};
use crate::trace::{BoxedSpan, ParentRef, Span, SpanContext, TraceResult, Tracer};

/// A no-op instance of a [`Tracer`].
#[derive(Clone, Debug, Default)]
pub struct NoopTracer {
    _private: (),
}

impl NoopTracer {
    /// Create a new no-op tracer
    pub fn new() -> Self {
        NoopTracer { _private: () }
    }
}

impl Tracer for NoopTracer {
    /// Starts a new `NoopSpan`.
    fn start_span(&self, _operation_name: &str, _parent: ParentRef<'_>) -> BoxedSpan {
        Box::new(NoopSpan::new())
    }

    /// Never finds context in a carrier.
    fn extract(&self, _carrier: &dyn Extractor) -> Option<Box<dyn SpanContext>> {
        None
    }

    /// Writes nothing.
    fn inject(&self, _context: &dyn SpanContext, _injector: &mut dyn Injector) {}

    /// No wire fields.
    fn fields(&self) -> &[String] {
        &[]
    }
}

/// A no-op instance of a [`Span`].
#[derive(Debug, Default)]
pub struct NoopSpan {
    context: NoopSpanContext,
}

impl NoopSpan {
    /// Creates a new `NoopSpan` instance.
    pub fn new() -> Self {
        NoopSpan {
            context: NoopSpanContext::default(),
        }
    }
}

impl Span for NoopSpan {
    /// Ignores all attributes
    fn set_tag(&mut self, _key: &str, _value: Value) {
        // Ignored
    }

    /// Ignores all log entries
    fn log(&mut self, _log: SpanLog) {
        // Ignored
    }

    /// Ignores name updates
    fn set_operation_name(&mut self, _name: &str) {
        // Ignored
    }

    /// Returns an invalid context.
    fn context(&self) -> &dyn SpanContext {
        &self.context
    }

    /// Ignores span endings, and never fails.
    fn finish(&mut self) -> TraceResult<()> {
        Ok(())
    }
}

/// The invalid context carried by [`NoopSpan`].
#[derive(Clone, Debug, Default)]
pub struct NoopSpanContext {
    _private: (),
}

impl SpanContext for NoopSpanContext {
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Always the empty string.
    fn to_trace_id(&self) -> String {
        String::new()
    }
}
