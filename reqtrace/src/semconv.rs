//! Names of the span tags recorded by this crate.
//!
//! The names follow the OpenTracing-era semantic conventions the wire
//! backends understand (`span.kind`, `sampling.priority`, `error`), plus the
//! invocation-level names used by the service pipeline.

/// Role of the span: [`SPAN_KIND_REQUEST`] or [`SPAN_KIND_SERVICE`].
pub const SPAN_KIND: &str = "span.kind";

/// `span.kind` value for the HTTP-level root span.
pub const SPAN_KIND_REQUEST: &str = "request";

/// `span.kind` value for service-method invocation spans.
pub const SPAN_KIND_SERVICE: &str = "service";

/// Set to `1` to force sampling of debug or erroneous spans.
pub const SAMPLING_PRIORITY: &str = "sampling.priority";

/// Marks a span as erroneous.
pub const ERROR: &str = "error";

/// Application error code of a failed invocation.
pub const ERROR_CODE: &str = "error.code";

/// Stack trace of a failed invocation; may be empty.
pub const ERROR_STACK: &str = "error.stack";

/// Service method executed by an invocation.
pub const SERVICE_METHOD: &str = "service.method";

/// Identifier of the entity an invocation targets.
pub const ID: &str = "id";

/// Invocation payload tree.
pub const DATA: &str = "data";

/// Invocation query tree.
pub const QUERY: &str = "query";

/// Invocation result tree.
pub const RESULT: &str = "result";

/// Numeric HTTP response status.
pub const HTTP_STATUS_CODE: &str = "http.status_code";

/// HTTP request method.
pub const HTTP_METHOD: &str = "http.method";

/// Host name the request was addressed to.
pub const PEER_HOSTNAME: &str = "peer.hostname";

/// Resolved client address of the request.
pub const PEER_ADDRESS: &str = "peer.address";

/// Inbound request headers, recorded at response finalization.
pub const REQUEST_HEADERS: &str = "request.headers";

/// Outbound response headers, recorded at response finalization.
pub const RESPONSE_HEADERS: &str = "response.headers";
