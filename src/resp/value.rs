use crate::{Error, RedisError, Result};
use bytes::Bytes;
use std::collections::HashMap;

/// Generic RESP reply, as sent by a Redis or Sentinel server
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    SimpleString(String),
    Error(RedisError),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Option<Vec<Value>>),
}

impl Value {
    /// Convert a simple string or a bulk string reply into a `String`.
    pub fn into_string(self) -> Result<String> {
        match self {
            Value::SimpleString(s) => Ok(s),
            Value::BulkString(Some(bytes)) => {
                Ok(std::str::from_utf8(&bytes)?.to_owned())
            }
            _ => Err(Error::Client(format!("Unexpected value {self:?}"))),
        }
    }

    /// Convert an array reply into its elements, mapping a nil array to empty.
    pub fn into_array(self) -> Result<Vec<Value>> {
        match self {
            Value::Array(Some(values)) => Ok(values),
            Value::Array(None) | Value::BulkString(None) => Ok(Vec::new()),
            _ => Err(Error::Client(format!("Unexpected value {self:?}"))),
        }
    }

    /// `true` for a nil bulk string or a nil array.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::BulkString(None) | Value::Array(None))
    }

    /// Convert a flat array of alternating field names and values,
    /// as returned by `SENTINEL SLAVES` and `SENTINEL SENTINELS`,
    /// into a field map.
    pub fn into_field_map(self) -> Result<HashMap<String, String>> {
        let values = self.into_array()?;

        if values.len() % 2 != 0 {
            return Err(Error::Client(
                "Unexpected odd number of fields in reply".to_owned(),
            ));
        }

        let mut map = HashMap::with_capacity(values.len() / 2);
        let mut iter = values.into_iter();

        while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
            map.insert(key.into_string()?, value.into_string()?);
        }

        Ok(map)
    }
}
