//! The day-scoped, merged view of every section fetched so far.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Citation list attached to a generated payload.
pub const SOURCES_KEY: &str = "_sources";
/// Marker a generator may set on an incomplete payload.
pub const PARTIAL_KEY: &str = "_partial";
/// Side mapping from section key to that section's citations.
pub const SOURCES_BY_SECTION_KEY: &str = "_sourcesBySection";

/// Accumulated insight state. Serializes as a plain JSON object so it can be
/// persisted and rendered as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedInsights(Map<String, Value>);

impl MergedInsights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one section's payload.
    ///
    /// Reserved `_`-prefixed keys never reach the top level: `_sources` moves
    /// to `_sourcesBySection[section]` and the rest are dropped. For every
    /// other key, two objects are unioned one level deep with incoming fields
    /// winning; anything else replaces the existing value.
    pub fn merge_section(&mut self, section: &str, mut payload: Map<String, Value>) {
        if let Some(sources) = payload.remove(SOURCES_KEY) {
            let by_section = self
                .0
                .entry(SOURCES_BY_SECTION_KEY)
                .or_insert_with(|| Value::Object(Map::new()));
            if !by_section.is_object() {
                *by_section = Value::Object(Map::new());
            }
            if let Value::Object(map) = by_section {
                map.insert(section.to_string(), sources);
            }
        }
        payload.remove(PARTIAL_KEY);

        for (key, incoming) in payload {
            if key.starts_with('_') {
                continue;
            }
            match incoming {
                Value::Object(fields) if self.0.get(&key).is_some_and(Value::is_object) => {
                    if let Some(Value::Object(existing)) = self.0.get_mut(&key) {
                        existing.extend(fields);
                    }
                }
                incoming => {
                    self.0.insert(key, incoming);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Citations recorded for `section`, if any.
    pub fn sources_for(&self, section: &str) -> Option<&Value> {
        self.0.get(SOURCES_BY_SECTION_KEY)?.get(section)
    }

    /// True when no content key has been merged yet.
    pub fn is_empty(&self) -> bool {
        !self.0.keys().any(|k| !k.starts_with('_'))
    }

    /// Number of top-level content keys.
    pub fn content_keys(&self) -> usize {
        self.0.keys().filter(|k| !k.starts_with('_')).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_objects_union_one_level() {
        let mut merged = MergedInsights(obj(json!({"a": {"y": 2}})));
        merged.merge_section("s1", obj(json!({"a": {"x": 1}})));
        assert_eq!(Value::Object(merged.0), json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn test_arrays_replace() {
        let mut merged = MergedInsights(obj(json!({"a": [9]})));
        merged.merge_section("s2", obj(json!({"a": [1, 2]})));
        assert_eq!(Value::Object(merged.0), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_incoming_field_wins() {
        let mut merged = MergedInsights::new();
        merged.merge_section("us_economy", obj(json!({"us_daily": {"economy": {"macro": "old"}}})));
        merged.merge_section("us_industry", obj(json!({"us_daily": {"industry": {"demand": "up"}}})));
        merged.merge_section("us_economy", obj(json!({"us_daily": {"economy": {"jobs": "new"}}})));

        // Second level is replaced, not unioned.
        assert_eq!(
            merged.get("us_daily").unwrap(),
            &json!({"economy": {"jobs": "new"}, "industry": {"demand": "up"}})
        );
    }

    #[test]
    fn test_type_mismatch_replaces() {
        let mut merged = MergedInsights(obj(json!({"a": "text"})));
        merged.merge_section("s", obj(json!({"a": {"k": 1}})));
        assert_eq!(merged.get("a").unwrap(), &json!({"k": 1}));
        merged.merge_section("s", obj(json!({"a": 3})));
        assert_eq!(merged.get("a").unwrap(), &json!(3));
    }

    #[test]
    fn test_sources_relocated_and_partial_stripped() {
        let mut merged = MergedInsights::new();
        merged.merge_section(
            "collectibles",
            obj(json!({
                "collectibles": {"intro": "hi"},
                "_sources": [{"url": "https://a", "title": "A"}],
                "_partial": true,
                "_debug": "ignored"
            })),
        );
        assert!(merged.get(SOURCES_KEY).is_none());
        assert!(merged.get(PARTIAL_KEY).is_none());
        assert!(merged.get("_debug").is_none());
        assert_eq!(
            merged.sources_for("collectibles").unwrap(),
            &json!([{"url": "https://a", "title": "A"}])
        );
        assert_eq!(merged.content_keys(), 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let payload = obj(json!({
            "global_daily": {"europe": "e", "china": "c"},
            "_sources": [{"url": "https://b", "title": "B"}]
        }));
        let mut once = MergedInsights(obj(json!({"global_daily": {"gold": "g"}})));
        once.merge_section("global_daily", payload.clone());
        let mut twice = once.clone();
        twice.merge_section("global_daily", payload);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_is_empty_ignores_side_mapping() {
        let mut merged = MergedInsights::new();
        assert!(merged.is_empty());
        merged.merge_section("s", obj(json!({"_sources": []})));
        assert!(merged.is_empty());
        merged.merge_section("s", obj(json!({"k": 1})));
        assert!(!merged.is_empty());
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut merged = MergedInsights::new();
        merged.merge_section("s", obj(json!({"k": [1]})));
        let text = serde_json::to_string(&merged).unwrap();
        assert_eq!(text, r#"{"k":[1]}"#);
        let back: MergedInsights = serde_json::from_str(&text).unwrap();
        assert_eq!(back, merged);
    }
}
