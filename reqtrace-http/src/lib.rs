//! `http`-crate integration for [`reqtrace`].
//!
//! Provides [`Extractor`]/[`Injector`] carriers over [`http::HeaderMap`] and
//! adapters that turn `http` request/response types into the
//! [`RequestHead`]/[`ResponseHead`] views consumed by the request
//! interceptor.

#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(test, deny(warnings))]

use std::collections::HashMap;

#[doc(no_inline)]
pub use http::{Request, Response};

use reqtrace::propagation::{Extractor, Injector};
use reqtrace::request::{RequestHead, ResponseHead};

/// Helper for injecting propagation fields into an [`http::HeaderMap`].
///
/// Invalid header names or values are skipped.
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            }
        }
    }
}

/// Helper for extracting propagation fields from an [`http::HeaderMap`].
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the `HeaderMap`. If the value is not
    /// valid ASCII, returns `None`.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    /// Collect all the keys from the `HeaderMap`.
    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
    }
}

/// Builds the interceptor's view of an inbound request.
///
/// `route_pattern` is the matched route, when the router exposes one; the
/// raw URI path is the fallback for the span name. The client address is
/// resolved from `x-forwarded-for` and the host from the URI authority or
/// the `host` header.
pub fn request_head<B>(request: &Request<B>, route_pattern: Option<&str>) -> RequestHead {
    let headers = header_pairs(request.headers());

    RequestHead {
        route_pattern: route_pattern.map(str::to_owned),
        target: request.uri().to_string(),
        method: request.method().as_str().to_owned(),
        hostname: request
            .uri()
            .host()
            .map(str::to_owned)
            .or_else(|| host_header(&headers)),
        client_addr: client_address(&headers),
        headers,
    }
}

/// Builds the finalizer's view of an outbound response.
///
/// The status message is the code's canonical reason phrase.
pub fn response_head<B>(response: &Response<B>) -> ResponseHead {
    ResponseHead {
        status: response.status().as_u16(),
        status_message: response
            .status()
            .canonical_reason()
            .map(str::to_owned),
        headers: header_pairs(response.headers()),
    }
}

/// First address in `x-forwarded-for`: the original client when the request
/// came through proxies.
pub fn client_address(headers: &HashMap<String, String>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(|addr| addr.trim().to_owned())
        .filter(|addr| !addr.is_empty())
}

fn host_header(headers: &HashMap<String, String>) -> Option<String> {
    headers
        .get("host")
        .and_then(|host| host.split(':').next())
        .map(str::to_owned)
        .filter(|host| !host.is_empty())
}

/// Collapses a `HeaderMap` into the single-valued lowercase view the core
/// crate consumes; repeated headers are comma-joined.
fn header_pairs(headers: &http::HeaderMap) -> HashMap<String, String> {
    let mut pairs: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let Ok(text) = value.to_str() else {
            continue;
        };
        pairs
            .entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(text);
            })
            .or_insert_with(|| text.to_owned());
    }
    pairs
}
