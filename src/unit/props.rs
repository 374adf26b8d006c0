use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::consts::PARENT_ID_KEY;
use crate::prelude::{Result, RuntimeError};

/// Externally supplied parameter bag.
///
/// This is what a `PROPS` dependency resolves to. Every bag stored through a
/// [`Trigger`](crate::manager::Trigger) also carries the id of the unit it
/// was attached under, see [`Props::parent_id`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    inner: Map<String, Value>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Values that fail to serialize are stored as `null`.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.inner.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    /// Deserialize one entry into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.inner.get(key).ok_or_else(|| RuntimeError::InvalidArgument {
            name: key.to_string(),
            reason: Some("missing from props".into()),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| RuntimeError::InvalidArgument {
            name: key.to_string(),
            reason: Some(e.to_string()),
        })
    }

    /// Deserialize the whole bag into `T`, e.g. a `#[derive(Deserialize)]` settings struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.inner.clone())).map_err(|e| {
            RuntimeError::InvalidArgument {
                name: "props".into(),
                reason: Some(e.to_string()),
            }
        })
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.inner.get(PARENT_ID_KEY).and_then(Value::as_str)
    }

    pub(crate) fn set_parent_id(&mut self, id: &str) {
        self.inner
            .insert(PARENT_ID_KEY.to_string(), Value::String(id.to_string()));
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<Map<String, Value>> for Props {
    fn from(inner: Map<String, Value>) -> Self {
        Self { inner }
    }
}

impl TryFrom<Value> for Props {
    type Error = RuntimeError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(inner) => Ok(Self { inner }),
            other => Err(RuntimeError::InvalidArgument {
                name: "props".into(),
                reason: Some(format!("expected a JSON object, found {other}")),
            }),
        }
    }
}
