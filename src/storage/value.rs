use serde::{Deserialize, Serialize};

/// A typed value as it is written to the key-value store.
///
/// Encoded as `{"type": "...", "value": ...}`; `Null` carries no value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
}

impl StoredValue {
    /// Picks the narrowest variant for an arbitrary JSON value.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => StoredValue::Null,
            serde_json::Value::Bool(b) => StoredValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => StoredValue::Number(f),
                None => StoredValue::Json(serde_json::Value::Number(n)),
            },
            serde_json::Value::String(s) => StoredValue::String(s),
            other => StoredValue::Json(other),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StoredValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_f64()
            .filter(|n| n.is_finite() && *n >= 0.0 && *n <= u32::MAX as f64 && n.fract() == 0.0)
            .map(|n| n as u32)
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            StoredValue::Null => "null",
            StoredValue::Bool(_) => "bool",
            StoredValue::Number(_) => "number",
            StoredValue::String(_) => "string",
            StoredValue::Json(_) => "json",
        }
    }
}

impl From<bool> for StoredValue {
    fn from(value: bool) -> Self {
        StoredValue::Bool(value)
    }
}

impl From<f64> for StoredValue {
    fn from(value: f64) -> Self {
        StoredValue::Number(value)
    }
}

impl From<i32> for StoredValue {
    fn from(value: i32) -> Self {
        StoredValue::Number(value as f64)
    }
}

impl From<u32> for StoredValue {
    fn from(value: u32) -> Self {
        StoredValue::Number(value as f64)
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        StoredValue::String(value.to_string())
    }
}

impl From<String> for StoredValue {
    fn from(value: String) -> Self {
        StoredValue::String(value)
    }
}

impl From<serde_json::Value> for StoredValue {
    fn from(value: serde_json::Value) -> Self {
        StoredValue::from_json(value)
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub(super) enum LegacyDecodeError {
    #[error("missing `tag|` prefix")]
    MissingTag,
    #[error("invalid json payload: {0}")]
    BadJson(String),
    #[error("invalid number payload `{0}`")]
    BadNumber(String),
}

/// Reads the older `tag|payload` encoding. The split happens on the first `|`,
/// so payloads may contain the separator.
pub(super) fn decode_legacy(raw: &str) -> Result<StoredValue, LegacyDecodeError> {
    let Some((tag, payload)) = raw.split_once('|') else {
        return Err(LegacyDecodeError::MissingTag);
    };

    match tag {
        "json" => serde_json::from_str::<serde_json::Value>(payload)
            .map(StoredValue::from_json)
            .map_err(|err| LegacyDecodeError::BadJson(err.to_string())),
        "boolean" => Ok(StoredValue::Bool(payload == "true")),
        "number" => {
            let trimmed = payload.trim();
            if trimmed.is_empty() {
                return Ok(StoredValue::Number(0.0));
            }
            trimmed
                .parse::<f64>()
                .map(StoredValue::Number)
                .map_err(|_| LegacyDecodeError::BadNumber(payload.to_string()))
        }
        _ => Ok(StoredValue::String(payload.to_string())),
    }
}

/// Encodes a value for the backend. JSON has no literal for non-finite
/// numbers, so those are written in the `number|payload` form instead.
pub(super) fn encode(value: &StoredValue) -> Result<String, serde_json::Error> {
    match value {
        StoredValue::Number(n) if !n.is_finite() => Ok(format!("number|{n}")),
        _ => serde_json::to_string(value),
    }
}

/// Writes the older `tag|payload` encoding.
#[cfg(test)]
pub(super) fn encode_legacy(value: &StoredValue) -> Result<String, serde_json::Error> {
    Ok(match value {
        StoredValue::Null => "json|null".to_string(),
        StoredValue::Bool(b) => format!("boolean|{b}"),
        StoredValue::Number(n) => format!("number|{n}"),
        StoredValue::String(s) => format!("string|{s}"),
        StoredValue::Json(v) => format!("json|{}", serde_json::to_string(v)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_uses_type_and_value_fields() {
        let encoded = serde_json::to_string(&StoredValue::Number(1.5)).unwrap();
        assert_eq!(encoded, r#"{"type":"number","value":1.5}"#);
        let encoded = serde_json::to_string(&StoredValue::Null).unwrap();
        assert_eq!(encoded, r#"{"type":"null"}"#);
    }

    #[test]
    fn arrays_and_objects_are_distinct_json_values() {
        let array = StoredValue::from_json(json!([1, 2]));
        let object = StoredValue::from_json(json!({"0": 1, "1": 2}));
        assert_ne!(array, object);
    }

    #[test]
    fn legacy_tags_dispatch_to_types() {
        assert_eq!(decode_legacy("boolean|true"), Ok(StoredValue::Bool(true)));
        assert_eq!(decode_legacy("boolean|yes"), Ok(StoredValue::Bool(false)));
        assert_eq!(decode_legacy("number|-3.5"), Ok(StoredValue::Number(-3.5)));
        assert_eq!(decode_legacy("json|null"), Ok(StoredValue::Null));
        assert_eq!(
            decode_legacy(r#"json|{"a":1}"#),
            Ok(StoredValue::Json(json!({"a": 1})))
        );
        assert_eq!(
            decode_legacy("string|a|b"),
            Ok(StoredValue::String("a|b".to_string()))
        );
    }

    #[test]
    fn legacy_errors_are_reported() {
        assert_eq!(decode_legacy("no separator"), Err(LegacyDecodeError::MissingTag));
        assert!(matches!(
            decode_legacy("number|abc"),
            Err(LegacyDecodeError::BadNumber(_))
        ));
        assert!(matches!(
            decode_legacy("json|{"),
            Err(LegacyDecodeError::BadJson(_))
        ));
    }

    #[test]
    fn legacy_encoding_reads_back() {
        for value in [
            StoredValue::Null,
            StoredValue::Bool(false),
            StoredValue::Number(0.0),
            StoredValue::String(String::new()),
            StoredValue::Json(json!({"a": 1})),
        ] {
            let raw = encode_legacy(&value).unwrap();
            assert_eq!(decode_legacy(&raw).unwrap(), value);
        }
    }

    #[test]
    fn integral_numbers_convert_to_u32() {
        assert_eq!(StoredValue::Number(4.0).as_u32(), Some(4));
        assert_eq!(StoredValue::Number(-1.0).as_u32(), None);
        assert_eq!(StoredValue::Number(1.5).as_u32(), None);
        assert_eq!(StoredValue::Bool(true).as_u32(), None);
    }
}
