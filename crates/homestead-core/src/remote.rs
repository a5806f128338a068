//! The `RemoteClient` trait and the row/filter/order types it speaks.
//!
//! The trait is the only way the session-facing components reach persisted
//! data. It is implemented by storage backends (`homestead-store-sqlite`, the
//! in-memory [`MemoryRemote`](crate::memory::MemoryRemote)) and mirrors the
//! row-level API of a hosted database: select, insert and delete against a
//! named collection, with rows exchanged as JSON objects.

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::RemoteError;

/// One row of a collection, keyed by column name.
pub type Row = serde_json::Map<String, Value>;

// ─── Collections ─────────────────────────────────────────────────────────────

/// The remote collections this workspace reads and writes. The `Display`
/// form is the table name as known to the server.
///
/// The column lists are part of the persisted contract and must not change
/// shape: the hosted database uses the same names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
  Favorites,
  UserRoles,
}

impl Collection {
  /// Every column of the collection, in storage order.
  pub fn columns(&self) -> &'static [&'static str] {
    match self {
      Self::Favorites => &[
        "id",
        "user_id",
        "property_id",
        "property_title",
        "property_image",
        "property_price",
        "property_location",
        "created_at",
      ],
      Self::UserRoles => {
        &["id", "user_id", "role", "created_at", "updated_at"]
      }
    }
  }

  /// Column sets that must be unique across the collection, besides `id`.
  pub fn unique_keys(&self) -> &'static [&'static [&'static str]] {
    match self {
      Self::Favorites => &[&["user_id", "property_id"]],
      Self::UserRoles => &[&["user_id", "role"]],
    }
  }

  /// Timestamp columns the server fills with the insertion time when the
  /// caller leaves them out.
  pub fn server_timestamps(&self) -> &'static [&'static str] {
    match self {
      Self::Favorites => &["created_at"],
      Self::UserRoles => &["created_at", "updated_at"],
    }
  }

  pub fn has_column(&self, column: &str) -> bool {
    self.columns().contains(&column)
  }

  /// [`has_column`](Self::has_column) as a result, for query validation.
  pub fn check_column(self, column: &str) -> Result<(), RemoteError> {
    if self.has_column(column) {
      return Ok(());
    }
    Err(RemoteError::UnknownColumn { collection: self, column: column.to_owned() })
  }

  /// Validate every column a filter and optional order refer to.
  pub fn check_query(self, filter: &Filter, order: Option<&Order>) -> Result<(), RemoteError> {
    for (column, _) in filter.conditions() {
      self.check_column(column)?;
    }
    match order {
      Some(order) => self.check_column(&order.column),
      None => Ok(()),
    }
  }
}

// ─── Query types ─────────────────────────────────────────────────────────────

/// A conjunction of column equality tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
  conditions: Vec<(String, Value)>,
}

impl Filter {
  pub fn new() -> Self { Self::default() }

  /// Add a `column = value` condition.
  pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
    self.conditions.push((column.into(), value.into()));
    self
  }

  pub fn conditions(&self) -> &[(String, Value)] { &self.conditions }

  /// Whether `row` satisfies every condition. A missing column reads as null.
  pub fn matches(&self, row: &Row) -> bool {
    self
      .conditions
      .iter()
      .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
  }
}

/// Sort order for [`RemoteClient::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
  pub column:     String,
  pub descending: bool,
}

impl Order {
  pub fn asc(column: impl Into<String>) -> Self {
    Self { column: column.into(), descending: false }
  }

  pub fn desc(column: impl Into<String>) -> Self {
    Self { column: column.into(), descending: true }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Generic request/response access to named remote collections.
///
/// Implementations enforce the uniqueness constraints listed by
/// [`Collection::unique_keys`] and report violations as
/// [`RemoteError::Conflict`]. They assign `id` and the
/// [`Collection::server_timestamps`] columns on insert when absent.
pub trait RemoteClient: Send + Sync {
  /// Return every row matching `filter`, sorted by `order` when given.
  fn select<'a>(
    &'a self,
    collection: Collection,
    filter: &'a Filter,
    order: Option<&'a Order>,
  ) -> impl Future<Output = Result<Vec<Row>, RemoteError>> + Send + 'a;

  /// Insert `row` and return it as stored, server-assigned columns included.
  fn insert(
    &self,
    collection: Collection,
    row: Row,
  ) -> impl Future<Output = Result<Row, RemoteError>> + Send + '_;

  /// Delete every row matching `filter` and return how many were removed.
  /// Matching nothing is not an error.
  fn delete<'a>(
    &'a self,
    collection: Collection,
    filter: &'a Filter,
  ) -> impl Future<Output = Result<u64, RemoteError>> + Send + 'a;
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

/// Serialise a typed value into a row for `collection`.
pub fn to_row<T: Serialize>(collection: Collection, value: &T) -> Result<Row, RemoteError> {
  let malformed = |source| RemoteError::MalformedRow { collection, source };
  match serde_json::to_value(value).map_err(malformed)? {
    Value::Object(row) => Ok(row),
    _ => Err(malformed(<serde_json::Error as serde::ser::Error>::custom(
      "expected a JSON object",
    ))),
  }
}

/// Deserialise rows returned by `collection` into typed values.
pub fn from_rows<T: DeserializeOwned>(
  collection: Collection,
  rows: Vec<Row>,
) -> Result<Vec<T>, RemoteError> {
  rows
    .into_iter()
    .map(|row| {
      serde_json::from_value(Value::Object(row))
        .map_err(|source| RemoteError::MalformedRow { collection, source })
    })
    .collect()
}

/// Complete `row` for insertion into `collection`: reject unknown columns,
/// assign `id` and the server timestamps when missing, and set every other
/// absent column to null.
pub fn prepare_insert(collection: Collection, mut row: Row) -> Result<Row, RemoteError> {
  for column in row.keys() {
    collection.check_column(column)?;
  }
  if row.get("id").is_none_or(Value::is_null) {
    row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
  }
  let now = encode_timestamp(Utc::now());
  for column in collection.server_timestamps() {
    if row.get(*column).is_none_or(Value::is_null) {
      row.insert((*column).into(), Value::String(now.clone()));
    }
  }
  for column in collection.columns() {
    row.entry(*column).or_insert(Value::Null);
  }
  Ok(row)
}

/// Render a server-assigned timestamp.
///
/// Fixed microsecond precision keeps the text form sortable, which backends
/// that order on the stored string rely on.
pub fn encode_timestamp(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn row(value: Value) -> Row {
    match value {
      Value::Object(map) => map,
      _ => unreachable!(),
    }
  }

  #[test]
  fn filter_matches_all_conditions() {
    let r = row(json!({ "user_id": "u1", "property_id": "p1" }));
    assert!(Filter::new().eq("user_id", "u1").matches(&r));
    assert!(
      Filter::new()
        .eq("user_id", "u1")
        .eq("property_id", "p1")
        .matches(&r)
    );
    assert!(
      !Filter::new()
        .eq("user_id", "u1")
        .eq("property_id", "p2")
        .matches(&r)
    );
  }

  #[test]
  fn missing_column_reads_as_null() {
    let r = row(json!({ "user_id": "u1" }));
    assert!(Filter::new().eq("property_title", Value::Null).matches(&r));
    assert!(!Filter::new().eq("property_title", "x").matches(&r));
  }

  #[test]
  fn empty_filter_matches_everything() {
    assert!(Filter::new().matches(&Row::new()));
  }

  #[test]
  fn collection_names_match_strum_display() {
    assert_eq!(Collection::Favorites.to_string(), "favorites");
    assert_eq!(Collection::UserRoles.to_string(), "user_roles");
    assert_eq!("user_roles".parse::<Collection>().unwrap(), Collection::UserRoles);
  }

  #[test]
  fn query_columns_are_checked() {
    let c = Collection::Favorites;
    assert!(c.check_query(&Filter::new().eq("user_id", "u1"), Some(&Order::desc("created_at"))).is_ok());
    assert!(c.check_query(&Filter::new().eq("role", "admin"), None).is_err());
    assert!(c.check_query(&Filter::new(), Some(&Order::asc("updated_at"))).is_err());
  }

  #[test]
  fn to_row_rejects_non_objects() {
    let err = to_row(Collection::Favorites, &"just a string").unwrap_err();
    assert!(matches!(err, RemoteError::MalformedRow { .. }));
  }

  #[test]
  fn prepare_insert_assigns_server_columns() {
    let prepared = prepare_insert(
      Collection::UserRoles,
      row(json!({ "user_id": "u1", "role": "admin" })),
    )
    .unwrap();
    assert!(Uuid::parse_str(prepared["id"].as_str().unwrap()).is_ok());
    assert!(prepared["created_at"].is_string());
    assert_eq!(prepared["created_at"], prepared["updated_at"]);
    assert_eq!(prepared.len(), Collection::UserRoles.columns().len());
  }

  #[test]
  fn prepare_insert_keeps_caller_values_and_nulls_the_rest() {
    let prepared = prepare_insert(
      Collection::Favorites,
      row(json!({ "id": "fixed", "user_id": "u1", "property_id": "p1" })),
    )
    .unwrap();
    assert_eq!(prepared["id"], "fixed");
    assert_eq!(prepared["property_price"], Value::Null);
  }

  #[test]
  fn prepare_insert_rejects_unknown_columns() {
    let err = prepare_insert(
      Collection::Favorites,
      row(json!({ "user_id": "u1", "property_id": "p1", "bogus": 1 })),
    )
    .unwrap_err();
    assert!(matches!(err, RemoteError::UnknownColumn { ref column, .. } if column == "bogus"));
  }

  #[test]
  fn timestamps_have_fixed_width() {
    use chrono::TimeZone;
    let whole = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let fractional = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
    assert_eq!(encode_timestamp(whole).len(), encode_timestamp(fractional).len());
    assert!(encode_timestamp(whole) < encode_timestamp(fractional));
    assert!(encode_timestamp(whole).ends_with('Z'));
  }
}
