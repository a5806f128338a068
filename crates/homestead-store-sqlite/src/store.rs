//! [`SqliteStore`]: the SQLite implementation of [`RemoteClient`].

use std::path::Path;

use rusqlite::{ErrorCode, OptionalExtension as _, ffi, params_from_iter, types::Value as SqlValue};
use tracing::debug;

use homestead_core::{
  RemoteError,
  identity::Identity,
  remote::{Collection, Filter, Order, RemoteClient, Row, prepare_insert},
};

use crate::{
  Error, Result,
  auth::AuthSettings,
  encode::{decode_uuid, decode_value, encode_value},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Homestead accounts, favorites and roles in a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  pub(crate) auth: AuthSettings,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests and throwaway sessions.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, auth: AuthSettings::default() })
  }

  /// Replace the password policy, session lifetime and hashing cost.
  pub fn with_auth_settings(mut self, auth: AuthSettings) -> Self {
    self.auth = auth;
    self
  }

  /// Look up an account by email address.
  pub async fn find_user(&self, email: &str) -> Result<Option<Identity>> {
    let email = homestead_core::auth::normalize_email(email);
    let found: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        let found = conn
          .query_row(
            "SELECT user_id, email FROM auth_users WHERE email = ?1",
            [email],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        Ok(found)
      })
      .await?;

    found
      .map(|(user_id, email)| Ok(Identity { user_id: decode_uuid(&user_id)?, email }))
      .transpose()
  }
}

// ─── SQL building ────────────────────────────────────────────────────────────

/// `WHERE a IS ?1 AND b IS ?2`, or nothing for an empty filter. `IS` makes a
/// null condition match null cells the way [`Filter::matches`] does.
///
/// Column names come from the collection's fixed list, never from input.
fn where_clause(filter: &Filter) -> (String, Vec<SqlValue>) {
  if filter.conditions().is_empty() {
    return (String::new(), Vec::new());
  }
  let tests: Vec<String> = filter
    .conditions()
    .iter()
    .enumerate()
    .map(|(i, (column, _))| format!("{column} IS ?{}", i + 1))
    .collect();
  let params = filter
    .conditions()
    .iter()
    .map(|(_, value)| encode_value(value))
    .collect();
  (format!("WHERE {}", tests.join(" AND ")), params)
}

/// Ties on the sort column fall back to insertion order, so the newest row
/// leads a descending listing.
fn order_clause(order: Option<&Order>) -> String {
  match order {
    Some(Order { column, descending: true }) => format!("ORDER BY {column} DESC, rowid DESC"),
    Some(Order { column, descending: false }) => format!("ORDER BY {column} ASC, rowid ASC"),
    None => "ORDER BY rowid ASC".to_owned(),
  }
}

fn read_row(columns: &[&str], r: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
  columns
    .iter()
    .enumerate()
    .map(|(i, column)| Ok(((*column).to_owned(), decode_value(r.get_ref(i)?))))
    .collect()
}

/// Whether `e` is a UNIQUE or PRIMARY KEY violation.
pub(crate) fn is_unique_violation(e: &tokio_rusqlite::Error) -> bool {
  match e {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _)) => {
      f.code == ErrorCode::ConstraintViolation
        && matches!(
          f.extended_code,
          ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
    }
    _ => false,
  }
}

// ─── RemoteClient impl ───────────────────────────────────────────────────────

impl RemoteClient for SqliteStore {
  async fn select(
    &self,
    collection: Collection,
    filter: &Filter,
    order: Option<&Order>,
  ) -> Result<Vec<Row>, RemoteError> {
    collection.check_query(filter, order)?;
    let columns = collection.columns();
    let (where_sql, params) = where_clause(filter);
    let sql = format!(
      "SELECT {} FROM {collection} {where_sql} {}",
      columns.join(", "),
      order_clause(order),
    );

    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(params), |r| read_row(columns, r))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::from)?;
    Ok(rows)
  }

  async fn insert(&self, collection: Collection, row: Row) -> Result<Row, RemoteError> {
    let row = prepare_insert(collection, row)?;
    let columns = collection.columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let insert_sql = format!(
      "INSERT INTO {collection} ({}) VALUES ({})",
      columns.join(", "),
      placeholders.join(", "),
    );
    let select_sql = format!(
      "SELECT {} FROM {collection} WHERE rowid = ?1",
      columns.join(", "),
    );
    let params: Vec<SqlValue> = columns
      .iter()
      .map(|c| row.get(*c).map_or(SqlValue::Null, encode_value))
      .collect();

    let result = self
      .conn
      .call(move |conn| {
        conn.execute(&insert_sql, params_from_iter(params))?;
        let rowid = conn.last_insert_rowid();
        let stored = conn.query_row(&select_sql, [rowid], |r| read_row(columns, r))?;
        Ok(stored)
      })
      .await;

    match result {
      Ok(stored) => {
        debug!(%collection, id = ?stored.get("id"), "row inserted");
        Ok(stored)
      }
      Err(e) if is_unique_violation(&e) => {
        Err(RemoteError::Conflict { collection, detail: e.to_string() })
      }
      Err(e) => Err(Error::from(e).into()),
    }
  }

  async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, RemoteError> {
    collection.check_query(filter, None)?;
    let (where_sql, params) = where_clause(filter);
    let sql = format!("DELETE FROM {collection} {where_sql}");

    let deleted = self
      .conn
      .call(move |conn| Ok(conn.execute(&sql, params_from_iter(params))?))
      .await
      .map_err(Error::from)?;
    debug!(%collection, deleted, "rows deleted");
    Ok(deleted as u64)
  }
}
