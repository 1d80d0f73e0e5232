//! Instrumentation configuration.

use std::collections::HashMap;

use crate::mask::MaskConfig;
use crate::tag::TagConfig;

/// Configuration consumed by [`RequestTracer`] and [`InvocationTracer`].
///
/// Everything defaults to "trace every request, record the usual
/// categories, mask nothing".
///
/// [`RequestTracer`]: crate::request::RequestTracer
/// [`InvocationTracer`]: crate::invocation::InvocationTracer
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct TraceConfig {
    /// Force sampling on every span this layer creates.
    pub debug: bool,
    /// Path prefixes eligible for tracing; empty means trace everything.
    pub included_prefixes: Vec<String>,
    /// Field-masking rules applied before payloads are recorded.
    pub mask: MaskConfig,
    /// Which attribute categories are recorded, and how.
    pub tag: TagConfig,
    /// Error codes whose spans are not flagged erroneous, keyed by path.
    pub hide_errors: HashMap<String, Vec<i64>>,
}

impl TraceConfig {
    /// Configuration with all defaults.
    pub fn new() -> Self {
        TraceConfig::default()
    }

    /// Forces sampling on every created span.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Restricts tracing to paths starting with one of `prefixes`.
    pub fn with_included_prefixes<S: Into<String>>(
        mut self,
        prefixes: impl IntoIterator<Item = S>,
    ) -> Self {
        self.included_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the masking rules.
    pub fn with_mask(mut self, mask: MaskConfig) -> Self {
        self.mask = mask;
        self
    }

    /// Replaces the tagging categories.
    pub fn with_tag(mut self, tag: TagConfig) -> Self {
        self.tag = tag;
        self
    }

    /// Suppresses the erroneous-span flags for `code` on `path`.
    pub fn hide_error(mut self, path: impl Into<String>, code: i64) -> Self {
        self.hide_errors.entry(path.into()).or_default().push(code);
        self
    }

    pub(crate) fn error_hidden(&self, path: &str, code: i64) -> bool {
        self.hide_errors
            .get(path)
            .is_some_and(|codes| codes.contains(&code))
    }
}
