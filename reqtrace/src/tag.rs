//! Attaching payload trees to spans, whole or flattened.

use crate::common::{timestamp_text, Value};
use crate::mask::{mask, MaskConfig};
use crate::trace::{SharedSpan, Span};

/// Per-category tagging behavior.
///
/// In configuration files a category accepts either a boolean or an object
/// with an `index` flag, so `true` maps to [`TagSetting::On`] and
/// `{ "index": true }` to [`TagSetting::Indexed`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(from = "TagSettingRepr")
)]
pub enum TagSetting {
    /// The category is not recorded.
    Off,
    /// The category is recorded as one aggregate attribute.
    #[default]
    On,
    /// Every leaf of the category is recorded under its own dotted path.
    Indexed,
}

impl TagSetting {
    /// Whether the category is recorded at all.
    pub fn enabled(&self) -> bool {
        !matches!(self, TagSetting::Off)
    }

    /// Whether flattened per-leaf attributes were requested.
    pub fn indexed(&self) -> bool {
        matches!(self, TagSetting::Indexed)
    }
}

impl From<bool> for TagSetting {
    fn from(enabled: bool) -> Self {
        if enabled {
            TagSetting::On
        } else {
            TagSetting::Off
        }
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum TagSettingRepr {
    Flag(bool),
    Object { index: bool },
}

#[cfg(feature = "serde")]
impl From<TagSettingRepr> for TagSetting {
    fn from(repr: TagSettingRepr) -> Self {
        match repr {
            TagSettingRepr::Flag(enabled) => enabled.into(),
            TagSettingRepr::Object { index: true } => TagSetting::Indexed,
            TagSettingRepr::Object { index: false } => TagSetting::On,
        }
    }
}

/// Which attribute categories are recorded, and how.
///
/// Everything defaults to on except `result`, which can be large and is
/// opt-in.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(default, rename_all = "camelCase")
)]
pub struct TagConfig {
    /// The invocation target id.
    pub id: TagSetting,
    /// The invocation payload.
    pub data: TagSetting,
    /// The invocation query.
    pub query: TagSetting,
    /// The invocation result (or its dispatch alternate).
    pub result: TagSetting,
    /// Inbound request headers.
    pub request_headers: TagSetting,
    /// Outbound response headers.
    pub response_headers: TagSetting,
}

impl Default for TagConfig {
    fn default() -> Self {
        TagConfig {
            id: TagSetting::On,
            data: TagSetting::On,
            query: TagSetting::On,
            result: TagSetting::Off,
            request_headers: TagSetting::On,
            response_headers: TagSetting::On,
        }
    }
}

impl TagConfig {
    /// Overrides the `id` setting.
    pub fn with_id(mut self, setting: impl Into<TagSetting>) -> Self {
        self.id = setting.into();
        self
    }

    /// Overrides the `data` setting.
    pub fn with_data(mut self, setting: impl Into<TagSetting>) -> Self {
        self.data = setting.into();
        self
    }

    /// Overrides the `query` setting.
    pub fn with_query(mut self, setting: impl Into<TagSetting>) -> Self {
        self.query = setting.into();
        self
    }

    /// Overrides the `result` setting.
    pub fn with_result(mut self, setting: impl Into<TagSetting>) -> Self {
        self.result = setting.into();
        self
    }

    /// Overrides the `request_headers` setting.
    pub fn with_request_headers(mut self, setting: impl Into<TagSetting>) -> Self {
        self.request_headers = setting.into();
        self
    }

    /// Overrides the `response_headers` setting.
    pub fn with_response_headers(mut self, setting: impl Into<TagSetting>) -> Self {
        self.response_headers = setting.into();
        self
    }

    /// Looks up the setting governing an attribute label.
    ///
    /// Lookup is insensitive to case and to `.`/`_`/`-` separators, so
    /// `request.headers`, `requestHeaders` and `request_headers` resolve to
    /// the same category. Unknown labels are recorded as-is.
    pub fn setting_for(&self, label: &str) -> TagSetting {
        match normalize_label(label).as_str() {
            "id" => self.id,
            "data" => self.data,
            "query" => self.query,
            "result" => self.result,
            "requestheaders" => self.request_headers,
            "responseheaders" => self.response_headers,
            _ => TagSetting::On,
        }
    }
}

fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, '.' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Attaches `value` to `span` under `label`, honoring the label's category
/// setting and the masking rules.
///
/// Three modes, resolved in order:
///
/// - category off: nothing is recorded;
/// - indexed: the tree is flattened and every leaf is recorded under its
///   fully qualified path (`data.obj.arr[0]`), with timestamp leaves
///   rendered as RFC 3339 text, binary leaves as their lossy UTF-8
///   decoding, and blacklisted fields as the replacement marker; the
///   aggregate label itself is not recorded;
/// - otherwise: the tree is recorded as one attribute under `label`, masked
///   first when a blacklist is configured.
///
/// Empty containers produce no attributes in indexed mode. Owned [`Value`]
/// trees cannot be self-referential, so traversal always terminates.
pub fn tag_object(
    span: &SharedSpan,
    label: &str,
    value: &Value,
    tags: &TagConfig,
    masking: &MaskConfig,
) {
    let setting = tags.setting_for(label);
    if !setting.enabled() {
        return;
    }

    if setting.indexed() {
        span.with(|span| index_node(span, label, value, masking));
        return;
    }

    span.set_tag(label, mask(value, masking).into_owned());
}

fn index_node(span: &mut dyn Span, path: &str, value: &Value, masking: &MaskConfig) {
    match value {
        Value::Map(entries) => {
            for (key, child) in entries {
                let child_path = format!("{path}.{key}");
                if masking.is_active() && masking.matches(key) {
                    span.set_tag(&child_path, Value::String(masking.replacement.clone()));
                } else {
                    index_node(span, &child_path, child, masking);
                }
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                index_node(span, &format!("{path}[{index}]"), item, masking);
            }
        }
        leaf => span.set_tag(path, leaf_text(leaf)),
    }
}

/// Leaves are recorded as-is apart from the two textual special cases.
fn leaf_text(leaf: &Value) -> Value {
    match leaf {
        Value::Timestamp(timestamp) => Value::String(timestamp_text(timestamp)),
        Value::Bytes(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        other => other.clone(),
    }
}
