//! MPD reports everything as strings; these accept either form.

use serde::de::Error;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
        Value::String(s) => match s.trim() {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(D::Error::custom(format!("invalid flag: {other:?}"))),
        },
        other => Err(D::Error::custom(format!("invalid flag: {other}"))),
    }
}

pub fn opt_num<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(None),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("not an integer: {n}")))?,
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| D::Error::custom(format!("invalid number {s:?}: {e}")))?,
        other => return Err(D::Error::custom(format!("invalid number: {other}"))),
    };
    T::try_from(raw)
        .map(Some)
        .map_err(|_| D::Error::custom(format!("number out of range: {raw}")))
}
