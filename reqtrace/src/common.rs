use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;

/// An ordered map of field names to values.
///
/// Insertion order is preserved so traversal, flattened tagging, and test
/// assertions are deterministic.
pub type ValueMap = IndexMap<String, Value>;

/// A heterogeneous value recorded against a span, either as one payload tree
/// or as individually flattened leaves.
///
/// The set of kinds is closed on purpose: containers ([`Value::Map`],
/// [`Value::Array`]) are descended into, every other kind is a leaf that is
/// carried or rendered as-is. Timestamp and binary leaves get their own
/// variants because they render to text differently from plain strings.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(String),
    /// Timestamp leaf, rendered as RFC 3339 with millisecond precision.
    Timestamp(DateTime<Utc>),
    /// Binary leaf, rendered as its lossy UTF-8 decoding.
    Bytes(Vec<u8>),
    /// Element list, possibly heterogeneous.
    Array(Vec<Value>),
    /// Ordered field map.
    Map(ValueMap),
}

impl Value {
    /// Builds a [`Value::Map`] from key-value pairs, preserving order.
    ///
    /// # Examples
    ///
    /// ```
    /// use reqtrace::Value;
    ///
    /// let payload = Value::object([("name", Value::from("John"))]);
    /// ```
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Builds a [`Value::Array`] from elements.
    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Value {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Returns `true` for kinds that are traversed rather than recorded.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Map(_))
    }

    /// Whether the value carries nothing worth recording.
    ///
    /// Payload tagging skips empty values the same way the host skips empty
    /// request bodies.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// String representation of the `Value`.
    ///
    /// This will allocate iff the underlying value is not a `String`.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Value::String(v) => Cow::Borrowed(v.as_str()),
            v => Cow::Owned(v.to_string()),
        }
    }
}

/// RFC 3339 rendering used for timestamp leaves, e.g.
/// `1970-01-01T00:00:00.000Z`.
pub(crate) fn timestamp_text(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => fmt.write_str("null"),
            Value::Bool(v) => v.fmt(fmt),
            Value::I64(v) => v.fmt(fmt),
            Value::F64(v) => v.fmt(fmt),
            Value::String(v) => fmt.write_str(v),
            Value::Timestamp(v) => fmt.write_str(&timestamp_text(v)),
            Value::Bytes(v) => fmt.write_str(&String::from_utf8_lossy(v)),
            Value::Array(items) => {
                write!(fmt, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ",")?;
                    }
                    item.fmt(fmt)?;
                }
                write!(fmt, "]")
            }
            Value::Map(entries) => {
                write!(fmt, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ",")?;
                    }
                    write!(fmt, "{}={}", key, value)?;
                }
                write!(fmt, "}}")
            }
        }
    }
}

macro_rules! from_values {
    (
        $(
            ($t:ty, $val:expr);
        )+
    ) => {
        $(
            impl From<$t> for Value {
                fn from(t: $t) -> Self {
                    $val(t)
                }
            }
        )+
    }
}

from_values!(
    (bool, Value::Bool);
    (i64, Value::I64);
    (f64, Value::F64);
    (String, Value::String);
    (DateTime<Utc>, Value::Timestamp);
    (Vec<u8>, Value::Bytes);
    (Vec<Value>, Value::Array);
    (ValueMap, Value::Map);
);

impl From<i32> for Value {
    fn from(t: i32) -> Self {
        Value::I64(t.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl From<SystemTime> for Value {
    fn from(time: SystemTime) -> Self {
        Value::Timestamp(time.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => Value::I64(v),
                None => Value::F64(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(v) => Value::String(v),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}

/// An entry in a span's ordered log sequence.
///
/// Timestamps are assigned by the tracer collaborator when the entry is
/// recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanLog {
    /// Event name, e.g. `request_received`.
    pub event: Cow<'static, str>,
    /// Optional human-readable message.
    pub message: Option<String>,
}

impl SpanLog {
    /// A log entry carrying only an event name.
    pub fn event(name: impl Into<Cow<'static, str>>) -> Self {
        SpanLog {
            event: name.into(),
            message: None,
        }
    }

    /// A log entry with an event name and message.
    pub fn with_message(name: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        SpanLog {
            event: name.into(),
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_preserves_insertion_order() {
        let value = Value::object([("b", 1i64), ("a", 2i64)]);
        match value {
            Value::Map(entries) => {
                assert_eq!(
                    entries.keys().collect::<Vec<_>>(),
                    vec![&"b".to_owned(), &"a".to_owned()]
                );
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn empty_values() {
        assert!(Value::Null.is_empty());
        assert!(Value::Map(ValueMap::new()).is_empty());
        assert!(Value::Array(Vec::new()).is_empty());
        assert!(Value::from("").is_empty());
        assert!(!Value::from(false).is_empty());
        assert!(!Value::from(0i64).is_empty());
        assert!(!Value::from("x").is_empty());
    }

    #[test]
    fn timestamp_renders_rfc3339_millis() {
        let epoch = DateTime::from_timestamp(0, 0).expect("valid epoch");
        assert_eq!(
            Value::Timestamp(epoch).to_string(),
            "1970-01-01T00:00:00.000Z"
        );
    }

    #[test]
    fn bytes_render_lossy_utf8() {
        assert_eq!(Value::from(&b"test"[..]).to_string(), "test");
    }

    #[test]
    fn display_containers() {
        let value = Value::object([
            ("flag", Value::from(true)),
            ("items", Value::array([1i64, 2i64])),
        ]);
        assert_eq!(value.to_string(), "{flag=true,items=[1,2]}");
    }

    #[cfg(feature = "json")]
    #[test]
    fn from_json_value() {
        let value: Value = serde_json::json!({
            "name": "Dave",
            "count": 3,
            "tags": ["a", "b"],
            "missing": null,
        })
        .into();

        let expected = Value::object([
            ("count", Value::from(3i64)),
            ("missing", Value::Null),
            ("name", Value::from("Dave")),
            ("tags", Value::array(["a", "b"])),
        ]);
        assert_eq!(value, expected);
    }
}
