use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A user-authored text note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
  /// Opaque identifier, unique within the store
  pub id: String,
  /// Trimmed, never blank
  pub text: String,
  /// Creation time, used for ordering; never changes on edit
  #[serde(with = "iso_millis")]
  pub created_at: DateTime<Utc>,
}

impl Note {
  /// Build a fresh note with a random id.
  ///
  /// The timestamp is truncated to milliseconds so it survives the slot's
  /// ISO-8601 encoding unchanged.
  pub fn new(text: &str, created_at: DateTime<Utc>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      text: text.trim().to_string(),
      created_at: created_at.trunc_subsecs(3),
    }
  }
}

/// `createdAt` as RFC 3339 UTC with millisecond precision.
mod iso_millis {
  use chrono::{DateTime, SecondsFormat, Utc};
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
      .map(|dt| dt.with_timezone(&Utc))
      .map_err(serde::de::Error::custom)
  }
}
