use std::any::Any;
use std::fmt;

use crate::propagation::{Extractor, Injector};
use crate::trace::BoxedSpan;

/// Propagation identity of a span or of context extracted off the wire.
///
/// Opaque to this crate apart from its textual trace id. Concrete tracers
/// recover their own type through [`SpanContext::as_any`] when a context is
/// handed back as a parent.
pub trait SpanContext: fmt::Debug + Send {
    /// The context as [`Any`], for collaborator downcasts.
    fn as_any(&self) -> &dyn Any;

    /// Textual trace identity, suitable for logging and wire handoff.
    fn to_trace_id(&self) -> String;
}

/// Parent relationship of a span being started.
#[derive(Clone, Copy, Debug)]
pub enum ParentRef<'a> {
    /// Start a new trace.
    Root,
    /// Child of a local span's context or of extracted wire context.
    Context(&'a dyn SpanContext),
}

/// The tracer collaborator capability.
///
/// One instance is injected into [`RequestTracer`] and [`InvocationTracer`]
/// at construction; there is no process-global registry in this crate.
///
/// [`RequestTracer`]: crate::request::RequestTracer
/// [`InvocationTracer`]: crate::invocation::InvocationTracer
pub trait Tracer: fmt::Debug + Send + Sync {
    /// Starts a span under the given parent.
    fn start_span(&self, operation_name: &str, parent: ParentRef<'_>) -> BoxedSpan;

    /// Reads propagation context out of a carrier, if any is present.
    fn extract(&self, carrier: &dyn Extractor) -> Option<Box<dyn SpanContext>>;

    /// Writes a context's propagation state into a carrier.
    fn inject(&self, context: &dyn SpanContext, injector: &mut dyn Injector);

    /// Wire keys written by [`Tracer::inject`], most significant first.
    ///
    /// The first entry is the field used for single-value handoff to remote
    /// services.
    fn fields(&self) -> &[String];
}
