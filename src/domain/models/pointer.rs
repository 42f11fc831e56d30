//! Graph pointers and the tagged value model for store-originated fields.
//!
//! The replicated store hands back loosely-typed JSON. Every field value goes
//! through [`GraphValue::classify`], which is the only place that decides
//! whether a value is a pointer to another node or an inline scalar.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::{SyncError, SyncResult};

/// Key under which a pointer object stores its target path (`{"#": "games/g1"}`).
pub const POINTER_KEY: &str = "#";

/// Raw node as stored: field name -> JSON value.
pub type RawNode = serde_json::Map<String, Value>;

/// Path-like identifier naming a node in the replicated store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GraphPointer(String);

impl GraphPointer {
    /// Parse and validate a pointer path.
    pub fn parse(raw: &str) -> SyncResult<Self> {
        if raw.is_empty() {
            return Err(SyncError::malformed(raw, "empty path"));
        }
        for segment in raw.split('/') {
            validate_segment(raw, segment)?;
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    pub fn segment_count(&self) -> usize {
        self.segments().count()
    }

    /// Last path segment; for entity pointers this is the entity id.
    pub fn last_segment(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Pointer to a child node under this one.
    pub fn child(&self, key: &str) -> SyncResult<Self> {
        validate_segment(key, key)?;
        Ok(Self(format!("{}/{key}", self.0)))
    }

    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Wire representation: `{"#": "<path>"}`.
    pub fn to_raw(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(POINTER_KEY.to_string(), Value::String(self.0.clone()));
        Value::Object(map)
    }
}

fn validate_segment(raw: &str, segment: &str) -> SyncResult<()> {
    if segment.is_empty() {
        return Err(SyncError::malformed(raw, "empty path segment"));
    }
    if let Some(bad) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '~' | '@')))
    {
        return Err(SyncError::malformed(
            raw,
            format!("invalid character {bad:?} in segment {segment:?}"),
        ));
    }
    Ok(())
}

impl fmt::Display for GraphPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GraphPointer {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GraphPointer {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GraphPointer> for String {
    fn from(pointer: GraphPointer) -> Self {
        pointer.0
    }
}

/// Inline scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn to_raw(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(n) => Value::from(*n),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// A field value as seen by the resolver: either a pointer or an inline scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Pointer(GraphPointer),
    Inline(Scalar),
}

impl GraphValue {
    /// Classify a raw store value.
    ///
    /// Arrays, nested objects without a `#` key and pointer objects whose
    /// target is not a valid path are rejected as `MalformedPointer`.
    pub fn classify(raw: &Value) -> SyncResult<Self> {
        match raw {
            Value::Null => Ok(Self::Inline(Scalar::Null)),
            Value::Bool(b) => Ok(Self::Inline(Scalar::Bool(*b))),
            Value::Number(n) => Ok(Self::Inline(
                n.as_i64()
                    .map(Scalar::Int)
                    .or_else(|| n.as_f64().map(Scalar::Float))
                    .unwrap_or(Scalar::Null),
            )),
            Value::String(s) => Ok(Self::Inline(Scalar::Text(s.clone()))),
            Value::Object(map) => match map.get(POINTER_KEY) {
                Some(Value::String(path)) => Ok(Self::Pointer(GraphPointer::parse(path)?)),
                Some(other) => Err(SyncError::malformed(
                    other.to_string(),
                    "pointer target is not a string",
                )),
                None => Err(SyncError::malformed(
                    raw.to_string(),
                    "nested object without pointer key",
                )),
            },
            Value::Array(_) => Err(SyncError::malformed(
                raw.to_string(),
                "arrays are not representable in the graph",
            )),
        }
    }

    pub fn to_raw(&self) -> Value {
        match self {
            Self::Pointer(p) => p.to_raw(),
            Self::Inline(s) => s.to_raw(),
        }
    }

    pub fn as_pointer(&self) -> Option<&GraphPointer> {
        match self {
            Self::Pointer(p) => Some(p),
            Self::Inline(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid_pointers() {
        let p = GraphPointer::parse("games/g-1/actors").unwrap();
        assert_eq!(p.segment_count(), 3);
        assert_eq!(p.last_segment(), "actors");
        assert_eq!(p.parent().unwrap().as_str(), "games/g-1");
        assert_eq!(p.child("a7").unwrap().as_str(), "games/g-1/actors/a7");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "/games", "games/", "games//g1", "games/g 1", "games/é"] {
            let err = GraphPointer::parse(raw).unwrap_err();
            assert!(
                matches!(err, SyncError::MalformedPointer { .. }),
                "expected malformed for {raw:?}"
            );
        }
    }

    #[test]
    fn test_classify_pointer_and_scalars() {
        assert_eq!(
            GraphValue::classify(&json!({"#": "actors/a1"})).unwrap(),
            GraphValue::Pointer(GraphPointer::parse("actors/a1").unwrap())
        );
        assert_eq!(
            GraphValue::classify(&json!("hello")).unwrap(),
            GraphValue::Inline(Scalar::Text("hello".to_string()))
        );
        assert_eq!(
            GraphValue::classify(&json!(42)).unwrap(),
            GraphValue::Inline(Scalar::Int(42))
        );
        assert_eq!(
            GraphValue::classify(&json!(null)).unwrap(),
            GraphValue::Inline(Scalar::Null)
        );
    }

    #[test]
    fn test_classify_rejects_unexpected_shapes() {
        for raw in [
            json!([1, 2]),
            json!({"name": "nested"}),
            json!({"#": 5}),
            json!({"#": "bad path"}),
        ] {
            assert!(GraphValue::classify(&raw).is_err(), "{raw} should be malformed");
        }
    }

    #[test]
    fn test_pointer_serde_validates() {
        let p: GraphPointer = serde_json::from_value(json!("cards/c1")).unwrap();
        assert_eq!(p.as_str(), "cards/c1");
        assert!(serde_json::from_value::<GraphPointer>(json!("cards//c1")).is_err());
    }
}
