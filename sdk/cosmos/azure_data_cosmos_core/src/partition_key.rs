// Copyright (c) Microsoft Corporation. All rights reserved.
// Licensed under the MIT License.

use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};

/// A single component of a partition key.
#[derive(Clone, Debug, PartialEq)]
pub enum PartitionKeyValue {
    String(String),
    Number(Number),
    Bool(bool),
    Null,
    /// The item has no value at the partition key path. Sent on the wire as `{}`.
    Undefined,
}

impl Serialize for PartitionKeyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PartitionKeyValue::String(s) => serializer.serialize_str(s),
            PartitionKeyValue::Number(n) => n.serialize(serializer),
            PartitionKeyValue::Bool(b) => serializer.serialize_bool(*b),
            PartitionKeyValue::Null => serializer.serialize_unit(),
            PartitionKeyValue::Undefined => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

impl From<&str> for PartitionKeyValue {
    fn from(value: &str) -> Self {
        PartitionKeyValue::String(value.to_owned())
    }
}

impl From<String> for PartitionKeyValue {
    fn from(value: String) -> Self {
        PartitionKeyValue::String(value)
    }
}

impl From<i64> for PartitionKeyValue {
    fn from(value: i64) -> Self {
        PartitionKeyValue::Number(value.into())
    }
}

impl From<f64> for PartitionKeyValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(PartitionKeyValue::Null, PartitionKeyValue::Number)
    }
}

impl From<bool> for PartitionKeyValue {
    fn from(value: bool) -> Self {
        PartitionKeyValue::Bool(value)
    }
}

/// A partition key value, possibly hierarchical.
///
/// Sent in the `x-ms-documentdb-partitionkey` header as a JSON array:
///
/// ```rust
/// # use azure_data_cosmos_core::PartitionKey;
/// assert_eq!(PartitionKey::from("tenant1").to_header_value().unwrap(), r#"["tenant1"]"#);
/// assert_eq!(PartitionKey::undefined().to_header_value().unwrap(), "[{}]");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PartitionKey(Vec<PartitionKeyValue>);

impl PartitionKey {
    pub fn new(values: Vec<PartitionKeyValue>) -> Self {
        Self(values)
    }

    /// The partition key of items with no value at the key path.
    pub fn undefined() -> Self {
        Self(vec![PartitionKeyValue::Undefined])
    }

    pub fn null() -> Self {
        Self(vec![PartitionKeyValue::Null])
    }

    pub fn values(&self) -> &[PartitionKeyValue] {
        &self.0
    }

    pub fn to_header_value(&self) -> azure_core::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self(vec![value.into()])
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self(vec![value.into()])
    }
}

impl From<i64> for PartitionKey {
    fn from(value: i64) -> Self {
        Self(vec![value.into()])
    }
}

impl From<f64> for PartitionKey {
    fn from(value: f64) -> Self {
        Self(vec![value.into()])
    }
}

impl From<bool> for PartitionKey {
    fn from(value: bool) -> Self {
        Self(vec![value.into()])
    }
}

impl From<Vec<PartitionKeyValue>> for PartitionKey {
    fn from(values: Vec<PartitionKeyValue>) -> Self {
        Self(values)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum PartitionKind {
    #[default]
    Hash,
    MultiHash,
    Range,
}

/// How a container is partitioned, as returned in the container's `partitionKey` property.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyDefinition {
    pub paths: Vec<String>,
    #[serde(default)]
    pub kind: PartitionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Set on the definition the service reports for containers created without a partition key.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub system_key: bool,
}

/// Splits a partition key path such as `/address/"zip/code"` into its segments.
fn parse_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut chars = path.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '/' => {
                chars.next();
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut segment = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                segment.push(escaped);
                            }
                        }
                        c if c == quote => break,
                        c => segment.push(c),
                    }
                }
                segments.push(segment);
            }
            _ => {
                let mut segment = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '/' {
                        break;
                    }
                    segment.push(c);
                    chars.next();
                }
                segments.push(segment.trim().to_owned());
            }
        }
    }
    segments
}

/// Reads the partition key of `document` according to `definition`.
///
/// Paths that are missing, or that lead to an object or array, yield [`PartitionKeyValue::Undefined`].
pub fn extract_partition_key(
    document: &Value,
    definition: &PartitionKeyDefinition,
) -> PartitionKey {
    let values = definition
        .paths
        .iter()
        .map(|path| {
            let mut current = Some(document);
            for segment in parse_path(path) {
                current = current.and_then(|v| v.get(segment.as_str()));
            }
            match current {
                Some(Value::String(s)) => PartitionKeyValue::String(s.clone()),
                Some(Value::Number(n)) => PartitionKeyValue::Number(n.clone()),
                Some(Value::Bool(b)) => PartitionKeyValue::Bool(*b),
                Some(Value::Null) => PartitionKeyValue::Null,
                Some(Value::Object(_)) | Some(Value::Array(_)) | None => {
                    PartitionKeyValue::Undefined
                }
            }
        })
        .collect();
    PartitionKey(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(paths: &[&str]) -> PartitionKeyDefinition {
        PartitionKeyDefinition {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn parses_quoted_segments() {
        assert_eq!(parse_path("/a/b"), vec!["a", "b"]);
        assert_eq!(parse_path(r#"/address/"zip/code""#), vec!["address", "zip/code"]);
        assert_eq!(parse_path(r#"/'it\'s'"#), vec!["it's"]);
    }

    #[test]
    fn extracts_nested_values() {
        let doc = json!({ "id": "1", "address": { "city": "Seattle" }, "n": 5 });
        assert_eq!(
            extract_partition_key(&doc, &definition(&["/address/city"])),
            PartitionKey::from("Seattle")
        );
        assert_eq!(
            extract_partition_key(&doc, &definition(&["/n"])).to_header_value().unwrap(),
            "[5]"
        );
    }

    #[test]
    fn missing_or_structured_values_are_undefined() {
        let doc = json!({ "id": "1", "address": { "city": "Seattle" }, "tag": null });
        assert_eq!(
            extract_partition_key(&doc, &definition(&["/missing"])),
            PartitionKey::undefined()
        );
        assert_eq!(
            extract_partition_key(&doc, &definition(&["/address"])),
            PartitionKey::undefined()
        );
        assert_eq!(
            extract_partition_key(&doc, &definition(&["/tag"])),
            PartitionKey::null()
        );
    }

    #[test]
    fn hierarchical_keys_serialize_in_order() {
        let doc = json!({ "tenant": "t1", "user": 42, "flag": true });
        let pk = extract_partition_key(&doc, &definition(&["/tenant", "/user", "/flag"]));
        assert_eq!(pk.to_header_value().unwrap(), r#"["t1",42,true]"#);
    }

    #[test]
    fn definition_deserializes_service_shape() {
        let def: PartitionKeyDefinition =
            serde_json::from_str(r#"{"paths":["/pk"],"kind":"Hash","version":2}"#).unwrap();
        assert_eq!(def.paths, vec!["/pk"]);
        assert_eq!(def.kind, PartitionKind::Hash);
        assert_eq!(def.version, Some(2));
    }
}
