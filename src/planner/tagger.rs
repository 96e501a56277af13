//! Ownership metadata tagging.
//!
//! Every object a run manages carries two reserved keys in its `data` map:
//! the owner marker of the generation that created it and the retention
//! policy applied when it disappears from configuration.

use serde_json::{Map, Value};

use crate::catalog::DesiredObject;
use crate::config::{Generation, RetentionPolicy};

/// Reserved `data` key holding the owner marker.
pub const OWNER_TAG_KEY: &str = "owner_tag";

/// Reserved `data` key holding the retention policy.
pub const RETENTION_POLICY_KEY: &str = "retention_policy";

/// Values stamped on objects that do not set them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDefaults {
    /// Owner marker of the active generation.
    pub owner_tag: String,
    /// Retention policy for objects that do not declare one.
    pub retention_policy: RetentionPolicy,
}

impl RuntimeDefaults {
    /// Builds the defaults for a generation.
    #[must_use]
    pub fn new(generation: Generation, retention_policy: RetentionPolicy) -> Self {
        Self {
            owner_tag: generation.owner_tag().to_string(),
            retention_policy,
        }
    }
}

/// Merges reserved metadata into desired attributes.
#[derive(Debug, Default)]
pub struct MetadataTagger;

impl MetadataTagger {
    /// Creates a new tagger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns `attributes` with the reserved keys merged underneath `data`.
    ///
    /// Keys the user set win over the defaults. Both reserved keys are
    /// present in the result.
    #[must_use]
    pub fn tag(&self, attributes: &Map<String, Value>, defaults: &RuntimeDefaults) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert(OWNER_TAG_KEY.to_string(), Value::from(defaults.owner_tag.clone()));
        data.insert(
            RETENTION_POLICY_KEY.to_string(),
            Value::from(defaults.retention_policy.as_str()),
        );
        if let Some(Value::Object(user)) = attributes.get("data") {
            for (key, value) in user {
                data.insert(key.clone(), value.clone());
            }
        }

        let mut tagged = attributes.clone();
        tagged.insert(String::from("data"), Value::Object(data));
        tagged
    }

    /// Tags every object of a desired set.
    #[must_use]
    pub fn tag_all(&self, objects: Vec<DesiredObject>, defaults: &RuntimeDefaults) -> Vec<DesiredObject> {
        objects
            .into_iter()
            .map(|object| {
                let attributes = self.tag(&object.attributes, defaults);
                DesiredObject { attributes, ..object }
            })
            .collect()
    }
}

/// Reads the owner marker from stored attributes.
#[must_use]
pub fn owner_tag_of(attributes: &Map<String, Value>) -> Option<&str> {
    attributes
        .get("data")
        .and_then(|data| data.get(OWNER_TAG_KEY))
        .and_then(Value::as_str)
}

/// Reads the retention policy from stored attributes.
///
/// A missing or unrecognised value reads as the default policy.
#[must_use]
pub fn retention_of(attributes: &Map<String, Value>) -> RetentionPolicy {
    attributes
        .get("data")
        .and_then(|data| data.get(RETENTION_POLICY_KEY))
        .and_then(Value::as_str)
        .and_then(RetentionPolicy::parse)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_defaults_are_added() {
        let defaults = RuntimeDefaults::new(Generation::Current, RetentionPolicy::Destroy);
        let tagged = MetadataTagger::new().tag(&Map::new(), &defaults);
        assert_eq!(
            Value::Object(tagged),
            json!({"data": {"owner_tag": "managed:v2", "retention_policy": "destroy"}})
        );
    }

    #[test]
    fn test_user_keys_win() {
        let defaults = RuntimeDefaults::new(Generation::Legacy, RetentionPolicy::Destroy);
        let tagged = MetadataTagger::new().tag(
            &attrs(json!({"body": "x", "data": {"retention_policy": "retain", "team": "core"}})),
            &defaults,
        );
        assert_eq!(tagged["body"], json!("x"));
        assert_eq!(
            tagged["data"],
            json!({"owner_tag": "managed:v1", "retention_policy": "retain", "team": "core"})
        );
    }

    #[test]
    fn test_tag_is_pure() {
        let defaults = RuntimeDefaults::new(Generation::Current, RetentionPolicy::Retain);
        let original = attrs(json!({"data": {"k": 1}}));
        let _ = MetadataTagger::new().tag(&original, &defaults);
        assert_eq!(Value::Object(original), json!({"data": {"k": 1}}));
    }

    #[test]
    fn test_readers() {
        let stored = attrs(json!({"data": {"owner_tag": "managed:v2", "retention_policy": "retain"}}));
        assert_eq!(owner_tag_of(&stored), Some("managed:v2"));
        assert_eq!(retention_of(&stored), RetentionPolicy::Retain);

        let bare = attrs(json!({"data": {"retention_policy": "keep"}}));
        assert_eq!(owner_tag_of(&bare), None);
        assert_eq!(retention_of(&bare), RetentionPolicy::Destroy);
    }
}
