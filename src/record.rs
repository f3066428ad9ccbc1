use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// Attribute holding a record's identity.
pub const ID_ATTR: &str = "Id";

/// Attribute holding a record's expiry, in epoch seconds.
pub const TTL_ATTR: &str = "ttl";

static TABLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,63}$").expect("valid table regex"));

/// Validated destination table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        if TABLE_NAME_RE.is_match(&name) {
            Ok(Self(name))
        } else {
            Err(StoreError::InvalidTable(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TableName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}

/// Identity of a record within its table.
///
/// Most portal entities are keyed by integer, a few by string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Canonical key used by the store backends, tagged with the id's kind
    /// so that `5` and `"5"` stay distinct.
    pub fn key(&self) -> String {
        match self {
            Self::Int(n) => format!("n:{n}"),
            Self::Str(s) => format!("s:{s}"),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RecordId {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        match id {
            RecordId::Int(n) => Value::from(n),
            RecordId::Str(s) => Value::from(s),
        }
    }
}

/// An opaque attribute mapping handed over by the portal client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record carrying only an identity.
    pub fn with_id(id: impl Into<RecordId>) -> Self {
        let id: RecordId = id.into();
        let mut record = Self::new();
        record.set(ID_ATTR, id);
        record
    }

    /// Builder-style attribute insertion.
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Read the identity attribute.
    ///
    /// Accepts an integer or a non-empty string; anything else is a malformed item.
    pub fn id(&self) -> Result<RecordId, StoreError> {
        match self.0.get(ID_ATTR) {
            Some(Value::Number(n)) => n.as_i64().map(RecordId::Int).ok_or(StoreError::MissingId),
            Some(Value::String(s)) if !s.is_empty() => Ok(RecordId::Str(s.clone())),
            _ => Err(StoreError::MissingId),
        }
    }

    /// Expiry attribute in epoch seconds, if set.
    pub fn ttl(&self) -> Option<i64> {
        self.0.get(TTL_ATTR).and_then(Value::as_i64)
    }

    /// Copy of this record with the expiry attribute set.
    pub fn with_ttl(&self, expires_at: i64) -> Self {
        let mut stamped = self.clone();
        stamped.set(TTL_ATTR, expires_at);
        stamped
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidItem(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}
