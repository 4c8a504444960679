//! Durable key-value slots.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};

use super::Database;

/// A durable string slot store.
pub trait KeyValueStore {
  /// Read the value stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Overwrite the value stored under `key`.
  fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl KeyValueStore for Database {
  fn get(&self, key: &str) -> Result<Option<String>> {
    self
      .conn()
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read slot '{}': {}", key, e))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self
      .conn()
      .execute(
        "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write slot '{}': {}", key, e))?;
    Ok(())
  }
}
