//! Favorite entries: one saved property per (identity, property) pair.
//!
//! Entries carry a display snapshot of the property taken when it was saved.
//! The snapshot is never refreshed and entries are never updated in place:
//! they are only created and deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FavoritesError;

/// A persisted row of the `favorites` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteEntry {
  pub id:          Uuid,
  pub user_id:     Uuid,
  /// Caller-supplied; not checked against any property catalog.
  pub property_id: String,
  #[serde(rename = "property_title")]
  pub title:       Option<String>,
  #[serde(rename = "property_image")]
  pub image:       Option<String>,
  #[serde(rename = "property_price")]
  pub price:       Option<String>,
  #[serde(rename = "property_location")]
  pub location:    Option<String>,
  /// Server-assigned; the cache is ordered newest-first on this.
  pub created_at:  DateTime<Utc>,
}

/// What a consumer knows about a property when it asks to save it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySummary {
  pub id:       String,
  pub title:    String,
  pub image:    String,
  pub price:    String,
  pub location: String,
}

impl PropertySummary {
  /// Reject summaries with an empty identifier or display field.
  pub fn validate(&self) -> Result<(), FavoritesError> {
    let fields = [
      ("id", &self.id),
      ("title", &self.title),
      ("image", &self.image),
      ("price", &self.price),
      ("location", &self.location),
    ];
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
      Some((field, _)) => Err(FavoritesError::InvalidInput { field: *field }),
      None => Ok(()),
    }
  }
}

/// Insert shape for the `favorites` collection. `id` and `created_at` are
/// left to the server.
#[derive(Debug, Clone, Serialize)]
pub struct NewFavorite<'a> {
  pub user_id:           Uuid,
  pub property_id:       &'a str,
  pub property_title:    &'a str,
  pub property_image:    &'a str,
  pub property_price:    &'a str,
  pub property_location: &'a str,
}

impl<'a> NewFavorite<'a> {
  pub fn new(user_id: Uuid, summary: &'a PropertySummary) -> Self {
    Self {
      user_id,
      property_id: &summary.id,
      property_title: &summary.title,
      property_image: &summary.image,
      property_price: &summary.price,
      property_location: &summary.location,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn summary() -> PropertySummary {
    PropertySummary {
      id:       "p100".into(),
      title:    "Lakeview Flat".into(),
      image:    "img.jpg".into(),
      price:    "₹80L".into(),
      location: "Bangalore".into(),
    }
  }

  #[test]
  fn complete_summary_is_valid() {
    assert!(summary().validate().is_ok());
  }

  #[test]
  fn blank_field_is_named_in_the_error() {
    let mut s = summary();
    s.price = "  ".into();
    assert!(matches!(
      s.validate(),
      Err(FavoritesError::InvalidInput { field: "price" })
    ));
  }

  #[test]
  fn new_favorite_uses_collection_column_names() {
    let s = summary();
    let user_id = Uuid::new_v4();
    let value = serde_json::to_value(NewFavorite::new(user_id, &s)).unwrap();
    assert_eq!(
      value,
      json!({
        "user_id": user_id.to_string(),
        "property_id": "p100",
        "property_title": "Lakeview Flat",
        "property_image": "img.jpg",
        "property_price": "₹80L",
        "property_location": "Bangalore",
      })
    );
  }

  #[test]
  fn entry_reads_nullable_display_columns() {
    let id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let entry: FavoriteEntry = serde_json::from_value(json!({
      "id": id.to_string(),
      "user_id": user_id.to_string(),
      "property_id": "p7",
      "property_title": null,
      "property_image": null,
      "property_price": "₹1Cr",
      "property_location": null,
      "created_at": "2026-10-18T09:30:00.000000Z",
    }))
    .unwrap();
    assert_eq!(entry.id, id);
    assert_eq!(entry.title, None);
    assert_eq!(entry.price.as_deref(), Some("₹1Cr"));
  }
}
