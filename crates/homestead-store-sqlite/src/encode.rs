//! Conversions between JSON row values and SQLite values, plus the text
//! forms of ids and timestamps.
//!
//! Booleans are stored as integers, nested arrays and objects as compact
//! JSON text. Blobs never come from this crate's own writes; they read back
//! as hex strings.

use chrono::{DateTime, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Row values ──────────────────────────────────────────────────────────────

pub fn encode_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
    },
    Value::String(s) => SqlValue::Text(s.clone()),
    nested @ (Value::Array(_) | Value::Object(_)) => SqlValue::Text(nested.to_string()),
  }
}

pub fn decode_value(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::from(i),
    ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
    ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => Value::String(hex::encode(b)),
  }
}

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { homestead_core::remote::encode_timestamp(dt) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn scalars_map_to_native_sqlite_types() {
    assert_eq!(encode_value(&json!(null)), SqlValue::Null);
    assert_eq!(encode_value(&json!(true)), SqlValue::Integer(1));
    assert_eq!(encode_value(&json!(42)), SqlValue::Integer(42));
    assert_eq!(encode_value(&json!(1.5)), SqlValue::Real(1.5));
    assert_eq!(encode_value(&json!("₹80L")), SqlValue::Text("₹80L".into()));
  }

  #[test]
  fn nested_values_are_stored_as_json_text() {
    assert_eq!(encode_value(&json!({ "a": [1] })), SqlValue::Text(r#"{"a":[1]}"#.into()));
  }

  #[test]
  fn decoding_reads_every_storage_class() {
    assert_eq!(decode_value(ValueRef::Null), Value::Null);
    assert_eq!(decode_value(ValueRef::Integer(7)), json!(7));
    assert_eq!(decode_value(ValueRef::Real(2.5)), json!(2.5));
    assert_eq!(decode_value(ValueRef::Text(b"Bangalore")), json!("Bangalore"));
    assert_eq!(decode_value(ValueRef::Blob(&[0xde, 0xad])), json!("dead"));
  }

  #[test]
  fn timestamps_parse_back() {
    let now = Utc::now();
    let parsed = decode_dt(&encode_dt(now)).unwrap();
    assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    assert!(matches!(decode_dt("yesterday"), Err(Error::DateParse(_))));
  }
}
