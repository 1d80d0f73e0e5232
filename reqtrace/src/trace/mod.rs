//! Span and tracer abstractions consumed by the instrumentation layer.
//!
//! The actual tracer -- span storage, sampling, wire formats -- is a
//! collaborator behind the [`Tracer`] trait, injected where this crate's
//! components are constructed. This module only fixes the capabilities the
//! instrumentation relies on: starting spans with a parent relationship,
//! extracting and injecting propagation context through
//! [carriers](crate::propagation), and the span surface itself.

pub mod noop;
mod span;
mod tracer;

pub use span::{BoxedSpan, SharedSpan, Span};
pub use tracer::{ParentRef, SpanContext, Tracer};

use thiserror::Error;

/// Describe the result of operations on the tracer collaborator.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors raised by the tracer collaborator.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// A finish call was rejected, e.g. because the span had already been
    /// submitted downstream.
    #[error("span finish rejected: {0}")]
    FinishRejected(String),

    /// Other errors propagated from the collaborator.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(Box::new(Custom(err_msg)))
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);
