//! [`MemoryRemote`] is a process-local [`RemoteClient`].
//!
//! Enforces the same column lists and uniqueness constraints as the hosted
//! collections, so code exercised against it sees the same conflicts it would
//! see in production. Rows live only as long as the value.

use std::{
  cmp::Ordering,
  collections::HashMap,
  sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
  error::RemoteError,
  remote::{Collection, Filter, Order, RemoteClient, Row, prepare_insert},
};

/// In-memory collections, one insertion-ordered row list per collection.
#[derive(Debug, Default)]
pub struct MemoryRemote {
  tables: Mutex<HashMap<Collection, Vec<Row>>>,
}

impl MemoryRemote {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, HashMap<Collection, Vec<Row>>> {
    self.tables.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn conflict(collection: Collection, existing: &[Row], row: &Row) -> Option<String> {
    let same = |a: &Row, columns: &[&str]| {
      columns.iter().all(|c| a.get(*c) == row.get(*c))
    };
    if existing.iter().any(|r| same(r, &["id"])) {
      return Some("duplicate id".into());
    }
    collection
      .unique_keys()
      .iter()
      .find(|key| existing.iter().any(|r| same(r, key)))
      .map(|key| format!("duplicate ({})", key.join(", ")))
  }
}

/// Order two column values: timestamps chronologically, numbers numerically,
/// everything else by its text. Nulls sort first.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  let a = a.unwrap_or(&Value::Null);
  let b = b.unwrap_or(&Value::Null);
  match (a, b) {
    (Value::Null, Value::Null) => Ordering::Equal,
    (Value::Null, _) => Ordering::Less,
    (_, Value::Null) => Ordering::Greater,
    (Value::Number(x), Value::Number(y)) => x
      .as_f64()
      .partial_cmp(&y.as_f64())
      .unwrap_or(Ordering::Equal),
    (Value::String(x), Value::String(y)) => {
      match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => x.cmp(y),
      }
    }
    _ => a.to_string().cmp(&b.to_string()),
  }
}

impl RemoteClient for MemoryRemote {
  async fn select(
    &self,
    collection: Collection,
    filter: &Filter,
    order: Option<&Order>,
  ) -> Result<Vec<Row>, RemoteError> {
    collection.check_query(filter, order)?;
    let tables = self.lock();
    let mut rows: Vec<Row> = tables
      .get(&collection)
      .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
      .unwrap_or_default();

    if let Some(order) = order {
      // Later insertions win ties in descending order, as a rowid
      // tiebreak would.
      if order.descending {
        rows.reverse();
        rows.sort_by(|a, b| compare(b.get(&order.column), a.get(&order.column)));
      } else {
        rows.sort_by(|a, b| compare(a.get(&order.column), b.get(&order.column)));
      }
    }
    Ok(rows)
  }

  async fn insert(&self, collection: Collection, row: Row) -> Result<Row, RemoteError> {
    let row = prepare_insert(collection, row)?;
    let mut tables = self.lock();
    let table = tables.entry(collection).or_default();
    if let Some(detail) = Self::conflict(collection, table, &row) {
      return Err(RemoteError::Conflict { collection, detail });
    }
    table.push(row.clone());
    Ok(row)
  }

  async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, RemoteError> {
    collection.check_query(filter, None)?;
    let mut tables = self.lock();
    let Some(table) = tables.get_mut(&collection) else {
      return Ok(0);
    };
    let before = table.len();
    table.retain(|r| !filter.matches(r));
    Ok((before - table.len()) as u64)
  }
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

  fn favorite(user: &str, property: &str) -> Row {
    row(json!({ "user_id": user, "property_id": property, "property_title": "t" }))
  }

  #[tokio::test]
  async fn insert_returns_the_stored_row() {
    let remote = MemoryRemote::new();
    let stored = remote
      .insert(Collection::Favorites, favorite("u1", "p1"))
      .await
      .unwrap();
    assert!(stored["id"].is_string());
    assert_eq!(stored["property_price"], Value::Null);

    let all = remote
      .select(Collection::Favorites, &Filter::new(), None)
      .await
      .unwrap();
    assert_eq!(all, [stored]);
  }

  #[tokio::test]
  async fn duplicate_id_is_a_conflict() {
    let remote = MemoryRemote::new();
    let mut first = favorite("u1", "p1");
    first.insert("id".into(), json!("same"));
    let mut second = favorite("u1", "p2");
    second.insert("id".into(), json!("same"));
    remote.insert(Collection::Favorites, first).await.unwrap();
    assert!(remote.insert(Collection::Favorites, second).await.unwrap_err().is_conflict());
  }

  #[tokio::test]
  async fn unique_key_violation_is_a_conflict() {
    let remote = MemoryRemote::new();
    remote.insert(Collection::Favorites, favorite("u1", "p1")).await.unwrap();
    remote.insert(Collection::Favorites, favorite("u2", "p1")).await.unwrap();

    let err = remote
      .insert(Collection::Favorites, favorite("u1", "p1"))
      .await
      .unwrap_err();
    assert!(err.is_conflict());
  }

  #[tokio::test]
  async fn unknown_column_is_rejected() {
    let remote = MemoryRemote::new();
    let err = remote
      .insert(Collection::Favorites, row(json!({ "user_id": "u1", "property_id": "p1", "bogus": 1 })))
      .await
      .unwrap_err();
    assert!(matches!(err, RemoteError::UnknownColumn { ref column, .. } if column == "bogus"));
  }

  #[tokio::test]
  async fn unknown_filter_column_is_rejected() {
    let remote = MemoryRemote::new();
    let filter = Filter::new().eq("role", "admin");
    assert!(remote.select(Collection::Favorites, &filter, None).await.is_err());
    assert!(remote.delete(Collection::Favorites, &filter).await.is_err());
  }

  #[tokio::test]
  async fn select_orders_and_breaks_ties_by_insertion() {
    let remote = MemoryRemote::new();
    for (property, at) in [
      ("old", "2026-01-01T00:00:00.000000Z"),
      ("tie-a", "2026-06-01T00:00:00.000000Z"),
      ("tie-b", "2026-06-01T00:00:00.000000Z"),
    ] {
      let mut r = favorite("u1", property);
      r.insert("created_at".into(), json!(at));
      remote.insert(Collection::Favorites, r).await.unwrap();
    }

    let filter = Filter::new().eq("user_id", "u1");
    let newest_first = remote
      .select(Collection::Favorites, &filter, Some(&Order::desc("created_at")))
      .await
      .unwrap();
    let ids: Vec<_> = newest_first.iter().map(|r| r["property_id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["tie-b", "tie-a", "old"]);

    let oldest_first = remote
      .select(Collection::Favorites, &filter, Some(&Order::asc("created_at")))
      .await
      .unwrap();
    assert_eq!(oldest_first[0]["property_id"], "old");
  }

  #[tokio::test]
  async fn delete_reports_count_and_zero_is_fine() {
    let remote = MemoryRemote::new();
    remote.insert(Collection::Favorites, favorite("u1", "p1")).await.unwrap();
    remote.insert(Collection::Favorites, favorite("u1", "p2")).await.unwrap();

    let everything_for_u1 = Filter::new().eq("user_id", "u1");
    let missing = Filter::new().eq("user_id", "u1").eq("property_id", "nope");
    assert_eq!(remote.delete(Collection::Favorites, &missing).await.unwrap(), 0);
    assert_eq!(remote.delete(Collection::Favorites, &everything_for_u1).await.unwrap(), 2);
    assert_eq!(remote.delete(Collection::UserRoles, &everything_for_u1).await.unwrap(), 0);
  }
}
