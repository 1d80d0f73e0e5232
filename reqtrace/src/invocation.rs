//! Instrumentation around service-method invocations.
//!
//! Every invocation runs through three phases: [`InvocationTracer::begin`]
//! before the method executes, then [`InvocationTracer::end`] on success or
//! [`InvocationTracer::error`] on failure. The phases drive a small state
//! machine on the [`InvocationContext`] so a span can never be finished
//! twice, and the underlying invocation error -- when there is one -- is
//! only observed, never altered or swallowed.

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::{SpanLog, Value};
use crate::config::TraceConfig;
use crate::request::{RequestTraceState, RootSlot};
use crate::semconv;
use crate::tag::tag_object;
use crate::trace::{ParentRef, SharedSpan, Tracer};

/// Lifecycle of one instrumented invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InvocationPhase {
    /// Created, not yet begun.
    #[default]
    Pending,
    /// `begin` ran; a span may be open.
    Active,
    /// `end` ran.
    Completed,
    /// `error` ran.
    Failed,
}

/// Error observed for a failed invocation.
///
/// The error itself propagates to the host unchanged; this record is only
/// what gets tagged onto the span.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationError {
    /// Application error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Stack trace, when one exists.
    pub stack: Option<String>,
}

impl InvocationError {
    /// An error record with the given code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        InvocationError {
            code,
            message: message.into(),
            stack: None,
        }
    }

    /// Attaches a stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Per-invocation record threaded through the begin/end/error phases.
#[derive(Debug)]
pub struct InvocationContext {
    /// Path identifying the invoked service.
    pub path: String,
    /// Invoked method name.
    pub method: String,
    /// Target entity id, when the method addresses one.
    pub id: Option<Value>,
    /// Invocation payload.
    pub data: Option<Value>,
    /// Invocation query.
    pub query: Option<Value>,
    /// Result, populated by the host after execution.
    pub result: Option<Value>,
    /// Redaction-safe alternate result, preferred on the first endpoint.
    pub dispatch: Option<Value>,
    /// Failure record, populated by the host before the error phase.
    pub error: Option<InvocationError>,
    /// The invocation targets a service in another process.
    pub remote: bool,
    state: Arc<RequestTraceState>,
    span: Option<SharedSpan>,
    first_endpoint: bool,
    phase: InvocationPhase,
}

impl InvocationContext {
    /// A pending context bound to its request's trace state.
    ///
    /// Use [`RequestTraceState::detached`] for invocations running outside
    /// any HTTP request.
    pub fn new(
        path: impl Into<String>,
        method: impl Into<String>,
        state: Arc<RequestTraceState>,
    ) -> Self {
        InvocationContext {
            path: path.into(),
            method: method.into(),
            id: None,
            data: None,
            query: None,
            result: None,
            dispatch: None,
            error: None,
            remote: false,
            state,
            span: None,
            first_endpoint: false,
            phase: InvocationPhase::Pending,
        }
    }

    /// Sets the target entity id.
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the invocation payload.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Sets the invocation query.
    pub fn with_query(mut self, query: impl Into<Value>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Marks the invocation as targeting a remote service.
    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    /// The span resolved by the begin phase, if any.
    pub fn span(&self) -> Option<&SharedSpan> {
        self.span.as_ref()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> InvocationPhase {
        self.phase
    }

    /// Whether this is the invocation directly triggered by the HTTP
    /// request. Meaningful once `begin` has run.
    pub fn is_first_endpoint(&self) -> bool {
        self.first_endpoint
    }
}

/// Decision table resolving the active span of a local invocation, keyed by
/// (wire handoff present, first endpoint).
#[derive(Debug)]
enum SpanSource {
    /// Continue the trace a remote handoff serialized into the root slot.
    FromHandoff(String),
    /// The HTTP-level span doubles as the outermost service span.
    ReuseRoot(SharedSpan),
    /// Nested call: child of the root span, or a fresh root when detached.
    ChildOfRoot(Option<SharedSpan>),
}

impl SpanSource {
    fn resolve(root: RootSlot, first_endpoint: bool) -> Self {
        match (root, first_endpoint) {
            (RootSlot::Handoff(wire), _) => SpanSource::FromHandoff(wire),
            (RootSlot::Span(span), true) => SpanSource::ReuseRoot(span),
            (RootSlot::Span(span), false) => SpanSource::ChildOfRoot(Some(span)),
            (RootSlot::None, _) => SpanSource::ChildOfRoot(None),
        }
    }
}

/// Opens and finalizes spans around service-method invocations.
#[derive(Debug)]
pub struct InvocationTracer {
    tracer: Arc<dyn Tracer>,
    config: Arc<TraceConfig>,
}

impl InvocationTracer {
    /// A manager recording spans through `tracer`.
    pub fn new(tracer: Arc<dyn Tracer>, config: TraceConfig) -> Self {
        InvocationTracer {
            tracer,
            config: Arc::new(config),
        }
    }

    /// Opens the span for `context` before the method executes.
    ///
    /// Remote invocations create no local span: the root context is
    /// serialized into its wire form and left in the request state for the
    /// downstream process, which traces the call itself. Local invocations
    /// resolve their span through the handoff/first-endpoint decision table
    /// and are tagged with the configured invocation metadata.
    pub fn begin(&self, context: &mut InvocationContext) {
        if context.phase != InvocationPhase::Pending || context.state.is_skipped() {
            return;
        }

        if context.remote {
            self.hand_off(context);
            context.phase = InvocationPhase::Active;
            return;
        }

        context.first_endpoint = context.state.claim_first_endpoint();

        let span = match SpanSource::resolve(context.state.root(), context.first_endpoint) {
            SpanSource::FromHandoff(wire) => self.span_from_handoff(&context.path, &wire),
            SpanSource::ReuseRoot(span) => span,
            SpanSource::ChildOfRoot(Some(parent)) => SharedSpan::new(parent.with(|parent| {
                self.tracer
                    .start_span(&context.path, ParentRef::Context(parent.context()))
            })),
            SpanSource::ChildOfRoot(None) => {
                SharedSpan::new(self.tracer.start_span(&context.path, ParentRef::Root))
            }
        };

        if !context.first_endpoint {
            span.log(SpanLog::event("request_received"));
            span.set_operation_name(&context.path);
            if self.config.debug {
                span.set_tag(semconv::SAMPLING_PRIORITY, 1i64);
            }
            // The first endpoint already carries span.kind=request.
            span.set_tag(semconv::SPAN_KIND, semconv::SPAN_KIND_SERVICE);
        }

        span.set_tag(semconv::SERVICE_METHOD, context.method.clone());

        if self.config.tag.id.enabled() {
            if let Some(id) = &context.id {
                span.set_tag(semconv::ID, id.clone());
            }
        }
        if let Some(data) = context.data.as_ref().filter(|data| !data.is_empty()) {
            tag_object(
                &span,
                semconv::DATA,
                data,
                &self.config.tag,
                &self.config.mask,
            );
        }
        if let Some(query) = context.query.as_ref().filter(|query| !query.is_empty()) {
            tag_object(
                &span,
                semconv::QUERY,
                query,
                &self.config.tag,
                &self.config.mask,
            );
        }

        context.span = Some(span);
        context.phase = InvocationPhase::Active;
    }

    /// Closes the span after a successful invocation.
    ///
    /// A failing finish never fails the invocation; it is discarded.
    pub fn end(&self, context: &mut InvocationContext) {
        if context.remote {
            context.phase = InvocationPhase::Completed;
            return;
        }
        if context.phase != InvocationPhase::Active {
            return;
        }
        let Some(span) = context.span.clone() else {
            context.phase = InvocationPhase::Completed;
            return;
        };

        if self.config.tag.result.enabled() {
            let dispatch = context
                .dispatch
                .as_ref()
                .filter(|dispatch| context.first_endpoint && !dispatch.is_empty());
            let chosen = dispatch.or(context.result.as_ref().filter(|result| !result.is_empty()));
            if let Some(result) = chosen {
                tag_object(
                    &span,
                    semconv::RESULT,
                    result,
                    &self.config.tag,
                    &self.config.mask,
                );
            }
        }

        if !context.first_endpoint {
            span.log(SpanLog::event("request_finished"));
            span.finish_quietly();
        }

        context.phase = InvocationPhase::Completed;
    }

    /// Records a failed invocation on its span.
    ///
    /// When the failure happened before `begin` ran (e.g. in an upstream
    /// hook), `begin` is run lazily first; if that still produces no span
    /// the phase aborts silently. The hide-list can suppress the
    /// erroneous-span flags per path and error code, but `error.code` and
    /// `error.stack` are always recorded.
    pub fn error(&self, context: &mut InvocationContext) {
        if context.remote {
            context.phase = InvocationPhase::Failed;
            return;
        }
        if matches!(
            context.phase,
            InvocationPhase::Completed | InvocationPhase::Failed
        ) {
            return;
        }

        if context.span.is_none() {
            self.begin(context);
        }
        let Some(span) = context.span.clone() else {
            return;
        };
        let Some(error) = context.error.clone() else {
            return;
        };

        if !self.config.error_hidden(&context.path, error.code) {
            span.set_tag(semconv::SAMPLING_PRIORITY, 1i64);
            span.set_tag(semconv::ERROR, true);
        }
        span.set_tag(semconv::ERROR_CODE, error.code);
        span.set_tag(semconv::ERROR_STACK, error.stack.clone().unwrap_or_default());

        if !context.first_endpoint {
            span.log(SpanLog::with_message("request_error", error.message));
            span.finish_quietly();
        }

        context.phase = InvocationPhase::Failed;
    }

    /// Serializes the root span's context into its wire handoff form and
    /// leaves it in the request state.
    fn hand_off(&self, context: &InvocationContext) {
        let Some(root) = context.state.root_span() else {
            return;
        };
        let Some(field) = self.tracer.fields().first() else {
            tracing::debug!("tracer exposes no wire fields, keeping local root span");
            return;
        };

        let mut carrier: HashMap<String, String> = HashMap::new();
        root.with(|span| self.tracer.inject(span.context(), &mut carrier));

        match carrier.remove(&field.to_lowercase()) {
            Some(wire) => context.state.set_root(RootSlot::Handoff(wire)),
            None => tracing::debug!("tracer injected no handoff value, keeping local root span"),
        }
    }

    fn span_from_handoff(&self, path: &str, wire: &str) -> SharedSpan {
        let mut carrier: HashMap<String, String> = HashMap::new();
        if let Some(field) = self.tracer.fields().first() {
            carrier.insert(field.to_lowercase(), wire.to_owned());
        }

        let span = match self.tracer.extract(&carrier) {
            Some(context) => self
                .tracer
                .start_span(path, ParentRef::Context(context.as_ref())),
            None => {
                tracing::debug!(%wire, "wire handoff did not extract, starting a new trace");
                self.tracer.start_span(path, ParentRef::Root)
            }
        };
        SharedSpan::new(span)
    }
}

/// Flags an arbitrary span as erroneous.
///
/// Applies the same forced-sampling and error tagging as the error phase,
/// for failures recorded outside the begin/end/error flow -- for instance
/// directly against the HTTP-level root span.
pub fn mark_span_error(span: &SharedSpan, error: &InvocationError) {
    span.set_tag(semconv::SAMPLING_PRIORITY, 1i64);
    span.set_tag(semconv::ERROR, true);
    span.set_tag(semconv::ERROR_CODE, error.code);
    span.set_tag(semconv::ERROR_STACK, error.stack.clone().unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_source_decision_table() {
        let handoff = RootSlot::Handoff("trace-1".to_owned());
        assert!(matches!(
            SpanSource::resolve(handoff.clone(), true),
            SpanSource::FromHandoff(_)
        ));
        assert!(matches!(
            SpanSource::resolve(handoff, false),
            SpanSource::FromHandoff(_)
        ));
        assert!(matches!(
            SpanSource::resolve(RootSlot::None, false),
            SpanSource::ChildOfRoot(None)
        ));
    }
}
