//! Request-scoped distributed tracing instrumentation with field redaction.
//!
//! `reqtrace` attaches tracing spans to inbound HTTP requests and to the
//! service-method invocations they trigger, propagates trace context across
//! process boundaries, and redacts sensitive payload fields before anything
//! is recorded. The tracer itself -- span storage, sampling, wire formats --
//! is a collaborator injected behind the [`trace::Tracer`] trait.
//!
//! Two components drive the span lifecycle:
//!
//! * [`request::RequestTracer`] runs once per inbound request: it decides
//!   whether the request is traced (path-prefix allow-list), opens the root
//!   span as a child of extracted wire context, echoes the propagation
//!   context back on renamed response headers, and finalizes the span
//!   exactly once no matter which completion signal fires first.
//! * [`invocation::InvocationTracer`] runs around each service-method
//!   invocation: it reuses the root span for the outermost call, nests child
//!   spans for internal calls, serializes a wire handoff for remote calls,
//!   and records invocation metadata -- id, payload, query, result -- with
//!   blacklisted fields masked by the [`mask`] engine and trees optionally
//!   flattened by the [`tag`] module.
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use reqtrace::request::{RequestHead, RequestTracer, ResponseHead};
//! use reqtrace::invocation::{InvocationContext, InvocationTracer};
//! use reqtrace::trace::noop::NoopTracer;
//! use reqtrace::{TraceConfig, Value};
//!
//! let tracer = Arc::new(NoopTracer::new());
//! let config = TraceConfig::new().with_included_prefixes(["v1"]);
//! let requests = RequestTracer::new(tracer.clone(), config.clone());
//! let invocations = InvocationTracer::new(tracer, config);
//!
//! // Inbound request arrives.
//! let head = RequestHead::new("/v1/users?page=2", "GET");
//! let mut response_headers: HashMap<String, String> = HashMap::new();
//! let trace = requests.on_request_start(&head, &mut response_headers);
//!
//! // The request triggers a service-method invocation.
//! let mut context = InvocationContext::new("v1/users", "find", trace.state())
//!     .with_query(Value::object([("name", Value::from("Dave"))]));
//! invocations.begin(&mut context);
//! // ... the method executes ...
//! invocations.end(&mut context);
//!
//! // The response completes (either signal may fire first, or both).
//! trace.on_response_finished(&ResponseHead::new(200));
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(
    docsrs,
    feature(doc_cfg, doc_auto_cfg),
    deny(rustdoc::broken_intra_doc_links)
)]
#![cfg_attr(test, deny(warnings))]

mod common;

pub use common::{SpanLog, Value, ValueMap};

pub mod config;

pub use config::TraceConfig;

pub mod invocation;
pub mod mask;
pub mod propagation;
pub mod request;
pub mod semconv;
pub mod tag;
pub mod trace;

#[cfg(any(feature = "testing", test))]
pub mod testing;
