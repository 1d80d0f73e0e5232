//! HTTP request entry instrumentation.
//!
//! [`RequestTracer::on_request_start`] runs once per inbound request before
//! any handler: it decides whether the request is traced at all, opens the
//! root span as a child of whatever context arrived in the request headers,
//! echoes the propagation context back through the response headers, and
//! hands out a [`RequestTrace`] whose completion callbacks finalize the span
//! exactly once no matter how the request terminates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::common::{SpanLog, Value};
use crate::config::TraceConfig;
use crate::propagation::Injector;
use crate::semconv;
use crate::tag::tag_object;
use crate::trace::{ParentRef, SharedSpan, Tracer};

/// Wire prefix replaced by `X` when trace headers are echoed on responses.
const WIRE_PREFIX: &str = "uber";

/// What the interceptor reads off an inbound request.
///
/// Header keys are expected lowercase, the way HTTP/2 and the `http` crate
/// deliver them.
#[derive(Clone, Debug, Default)]
pub struct RequestHead {
    /// Matched route pattern, preferred over `target` for the span name.
    pub route_pattern: Option<String>,
    /// Raw request target: a path or an absolute URL.
    pub target: String,
    /// Request method.
    pub method: String,
    /// Host the request was addressed to.
    pub hostname: Option<String>,
    /// Resolved client address.
    pub client_addr: Option<String>,
    /// Single-valued view of the request headers.
    pub headers: HashMap<String, String>,
}

impl RequestHead {
    /// A request head with the given target and method.
    pub fn new(target: impl Into<String>, method: impl Into<String>) -> Self {
        RequestHead {
            target: target.into(),
            method: method.into(),
            ..RequestHead::default()
        }
    }

    /// Sets the matched route pattern.
    pub fn with_route_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.route_pattern = Some(pattern.into());
        self
    }

    /// Sets the host name.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Sets the resolved client address.
    pub fn with_client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = Some(addr.into());
        self
    }

    /// Adds a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }
}

/// Response data available when a completion signal fires.
#[derive(Clone, Debug, Default)]
pub struct ResponseHead {
    /// Response status code.
    pub status: u16,
    /// Status message, logged on error responses.
    pub status_message: Option<String>,
    /// Single-valued view of the response headers.
    pub headers: HashMap<String, String>,
}

impl ResponseHead {
    /// A response head with the given status.
    pub fn new(status: u16) -> Self {
        ResponseHead {
            status,
            ..ResponseHead::default()
        }
    }

    /// Sets the status message.
    pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Adds a response header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }
}

/// The root span slot shared between the request state and invocations.
#[derive(Clone, Debug, Default)]
pub enum RootSlot {
    /// No HTTP-level span exists.
    #[default]
    None,
    /// Live local span.
    Span(SharedSpan),
    /// Serialized wire handoff left behind by a remote invocation.
    Handoff(String),
}

/// Per-request trace state consumed by the invocation manager.
///
/// Created by [`RequestTracer::on_request_start`] and stored wherever the
/// host keeps request-scoped data; lives for the request/response cycle.
#[derive(Debug)]
pub struct RequestTraceState {
    root: Mutex<RootSlot>,
    first_endpoint: AtomicBool,
    skipped: bool,
}

impl RequestTraceState {
    /// State for a request this layer decided not to trace.
    ///
    /// Downstream invocation instrumentation is disabled along with the
    /// request span.
    pub fn skipped() -> Arc<Self> {
        Arc::new(RequestTraceState {
            root: Mutex::new(RootSlot::None),
            first_endpoint: AtomicBool::new(false),
            skipped: true,
        })
    }

    /// State for invocations running outside any HTTP request.
    pub fn detached() -> Arc<Self> {
        Arc::new(RequestTraceState {
            root: Mutex::new(RootSlot::None),
            first_endpoint: AtomicBool::new(false),
            skipped: false,
        })
    }

    fn traced(span: SharedSpan) -> Arc<Self> {
        Arc::new(RequestTraceState {
            root: Mutex::new(RootSlot::Span(span)),
            first_endpoint: AtomicBool::new(true),
            skipped: false,
        })
    }

    /// Whether tracing was skipped for this request.
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Snapshot of the root span slot.
    pub fn root(&self) -> RootSlot {
        self.lock_root().clone()
    }

    /// The live root span, when one exists.
    pub fn root_span(&self) -> Option<SharedSpan> {
        match &*self.lock_root() {
            RootSlot::Span(span) => Some(span.clone()),
            _ => None,
        }
    }

    pub(crate) fn set_root(&self, slot: RootSlot) {
        *self.lock_root() = slot;
    }

    /// Claims the first-endpoint marker; only the first caller sees `true`.
    pub(crate) fn claim_first_endpoint(&self) -> bool {
        self.first_endpoint.swap(false, Ordering::AcqRel)
    }

    fn lock_root(&self) -> std::sync::MutexGuard<'_, RootSlot> {
        match self.root.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Handle returned by [`RequestTracer::on_request_start`].
///
/// The host must call [`RequestTrace::on_response_finished`] when the
/// response is fully written and [`RequestTrace::on_connection_closed`] if
/// the peer goes away early. Both may fire, in either order; whichever comes
/// first finalizes the root span and the other is a no-op.
#[derive(Debug)]
pub struct RequestTrace {
    state: Arc<RequestTraceState>,
    finalizer: Option<RequestFinalizer>,
}

impl RequestTrace {
    /// The request-scoped state to store for the invocation manager.
    pub fn state(&self) -> Arc<RequestTraceState> {
        Arc::clone(&self.state)
    }

    /// Whether a root span was created for this request.
    pub fn is_traced(&self) -> bool {
        self.finalizer.is_some()
    }

    /// Completion signal: the response was fully sent.
    pub fn on_response_finished(&self, response: &ResponseHead) {
        if let Some(finalizer) = &self.finalizer {
            finalizer.finalize(response);
        }
    }

    /// Completion signal: the connection closed before the response
    /// completed.
    pub fn on_connection_closed(&self, response: &ResponseHead) {
        if let Some(finalizer) = &self.finalizer {
            finalizer.finalize(response);
        }
    }
}

#[derive(Debug)]
struct RequestFinalizer {
    span: SharedSpan,
    finished: AtomicBool,
    method: String,
    hostname: Option<String>,
    client_addr: Option<String>,
    /// Captured at entry so finalization needs no access to the request.
    request_headers: Option<Value>,
    config: Arc<TraceConfig>,
}

impl RequestFinalizer {
    fn finalize(&self, response: &ResponseHead) {
        // Both completion signals race here; the latch admits exactly one.
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        if response.status >= 400 {
            self.span.log(SpanLog {
                event: "request_error".into(),
                message: response.status_message.clone(),
            });
        } else {
            self.span.log(SpanLog::event("request_finished"));
        }

        self.span
            .set_tag(semconv::HTTP_STATUS_CODE, i64::from(response.status));
        self.span
            .set_tag(semconv::HTTP_METHOD, self.method.clone());
        if let Some(hostname) = &self.hostname {
            self.span.set_tag(semconv::PEER_HOSTNAME, hostname.clone());
        }
        if let Some(addr) = &self.client_addr {
            self.span.set_tag(semconv::PEER_ADDRESS, addr.clone());
        }

        if let Some(headers) = &self.request_headers {
            tag_object(
                &self.span,
                semconv::REQUEST_HEADERS,
                headers,
                &self.config.tag,
                &self.config.mask,
            );
        }
        if self.config.tag.response_headers.enabled() && !response.headers.is_empty() {
            tag_object(
                &self.span,
                semconv::RESPONSE_HEADERS,
                &headers_value(&response.headers),
                &self.config.tag,
                &self.config.mask,
            );
        }

        self.span.finish_quietly();
    }
}

/// Opens and finalizes the root span of inbound HTTP requests.
#[derive(Debug)]
pub struct RequestTracer {
    tracer: Arc<dyn Tracer>,
    config: Arc<TraceConfig>,
}

impl RequestTracer {
    /// An interceptor recording spans through `tracer`.
    pub fn new(tracer: Arc<dyn Tracer>, config: TraceConfig) -> Self {
        RequestTracer {
            tracer,
            config: Arc::new(config),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Runs once per inbound request, before any handler.
    ///
    /// Writes the renamed propagation headers through `response_headers` and
    /// returns the per-request trace handle. A skipped request produces no
    /// side effects: no span, no headers.
    pub fn on_request_start(
        &self,
        request: &RequestHead,
        response_headers: &mut dyn Injector,
    ) -> RequestTrace {
        let path = normalize_path(
            request
                .route_pattern
                .as_deref()
                .unwrap_or(&request.target),
        );

        if self.skip(&path) {
            tracing::debug!(%path, "path outside included prefixes, not tracing");
            return RequestTrace {
                state: RequestTraceState::skipped(),
                finalizer: None,
            };
        }

        let parent = self.tracer.extract(&request.headers);
        let span = SharedSpan::new(match &parent {
            Some(context) => self
                .tracer
                .start_span(&path, ParentRef::Context(context.as_ref())),
            None => self.tracer.start_span(&path, ParentRef::Root),
        });

        span.log(SpanLog::event("request_received"));
        span.set_operation_name(&path);
        if self.config.debug {
            span.set_tag(semconv::SAMPLING_PRIORITY, 1i64);
        }
        span.set_tag(semconv::SPAN_KIND, semconv::SPAN_KIND_REQUEST);

        // Echo the trace identity to the caller under response-style names.
        let mut carrier: HashMap<String, String> = HashMap::new();
        span.with(|span| self.tracer.inject(span.context(), &mut carrier));
        for (key, value) in carrier {
            response_headers.set(&response_header_name(&key), value);
        }

        let request_headers = (self.config.tag.request_headers.enabled()
            && !request.headers.is_empty())
        .then(|| headers_value(&request.headers));

        let finalizer = RequestFinalizer {
            span: span.clone(),
            finished: AtomicBool::new(false),
            method: request.method.clone(),
            hostname: request.hostname.clone(),
            client_addr: request.client_addr.clone(),
            request_headers,
            config: Arc::clone(&self.config),
        };

        RequestTrace {
            state: RequestTraceState::traced(span),
            finalizer: Some(finalizer),
        }
    }

    fn skip(&self, path: &str) -> bool {
        let prefixes = &self.config.included_prefixes;
        !prefixes.is_empty() && !prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// Normalizes a request target into a span-name path: the path component of
/// absolute URLs, query and fragment dropped, surrounding `/` stripped.
pub fn normalize_path(target: &str) -> String {
    let path = match Url::parse(target) {
        Ok(url) => url.path().to_owned(),
        Err(_) => target
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_owned(),
    };
    path.trim_matches('/').to_owned()
}

/// Response header name for an injected wire key: the wire prefix becomes
/// `X` and each word boundary is title-cased, so `uber-trace-id` maps to
/// `X-Trace-Id`.
pub fn response_header_name(field: &str) -> String {
    let renamed = field.replacen(WIRE_PREFIX, "X", 1);
    let mut out = String::with_capacity(renamed.len());
    let mut boundary = true;
    for ch in renamed.chars() {
        if ch.is_alphanumeric() {
            if boundary {
                out.extend(ch.to_uppercase());
            } else {
                out.push(ch);
            }
            boundary = false;
        } else {
            out.push(ch);
            boundary = true;
        }
    }
    out
}

fn headers_value(headers: &HashMap<String, String>) -> Value {
    let mut names: Vec<_> = headers.keys().collect();
    names.sort();
    Value::Map(
        names
            .into_iter()
            .map(|name| (name.clone(), Value::String(headers[name].clone())))
            .collect(),
    )
}
