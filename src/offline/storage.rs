//! Cache bucket storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use url::Url;

use super::traits::{Request, Response, ResponseType};
use crate::db::schema::CACHE_SCHEMA;

/// Persisted lifecycle of the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerState {
  /// Version currently in control of requests
  pub active_version: Option<String>,
  /// Version installed and waiting to activate
  pub waiting_version: Option<String>,
}

/// Trait for cache bucket backends.
pub trait CacheStorage: Send + Sync {
  /// Names of all existing buckets.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Delete a bucket and every entry in it. Returns whether it existed.
  fn delete_bucket(&self, name: &str) -> Result<bool>;

  /// Exact lookup of a request in one bucket.
  fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>>;

  /// Store one entry, creating the bucket if needed.
  fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<()>;

  /// Store many entries in one transaction; either all land or none do.
  fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// URLs cached in a bucket, in insertion order.
  fn entry_urls(&self, bucket: &str) -> Result<Vec<String>>;

  fn load_state(&self) -> Result<ControllerState>;

  fn store_state(&self, state: &ControllerState) -> Result<()>;
}

impl<T: CacheStorage + ?Sized> CacheStorage for std::sync::Arc<T> {
  fn bucket_names(&self) -> Result<Vec<String>> {
    (**self).bucket_names()
  }

  fn delete_bucket(&self, name: &str) -> Result<bool> {
    (**self).delete_bucket(name)
  }

  fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>> {
    (**self).match_request(bucket, request)
  }

  fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<()> {
    (**self).put(bucket, request, response)
  }

  fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<()> {
    (**self).put_all(bucket, entries)
  }

  fn entry_urls(&self, bucket: &str) -> Result<Vec<String>> {
    (**self).entry_urls(bucket)
  }

  fn load_state(&self) -> Result<ControllerState> {
    (**self).load_state()
  }

  fn store_state(&self, state: &ControllerState) -> Result<()> {
    (**self).store_state(state)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteCacheStorage {
  conn: Mutex<Connection>,
}

impl SqliteCacheStorage {
  /// Open (or create) cache storage in the database file at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn insert_entry(conn: &Connection, bucket: &str, request: &Request, response: &Response) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (bucket, request_key, method, url, status, response_type, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        bucket,
        request.cache_key(),
        request.method.to_ascii_uppercase(),
        request.url.as_str(),
        response.status,
        response.response_type.as_str(),
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store entry for {}: {}", request.url, e))?;

  Ok(())
}

impl CacheStorage for SqliteCacheStorage {
  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn delete_bucket(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;
    // Entries go with the bucket via ON DELETE CASCADE
    let removed = conn
      .execute("DELETE FROM cache_buckets WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", name, e))?;
    Ok(removed > 0)
  }

  fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let row: Option<(String, u16, String, String, Vec<u8>)> = conn
      .query_row(
        "SELECT url, status, response_type, headers, body FROM cache_entries
         WHERE bucket = ? AND request_key = ?",
        params![bucket, request.cache_key()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", request.url, e))?;

    let Some((url, status, response_type, headers, body)) = row else {
      return Ok(None);
    };

    let url = Url::parse(&url).map_err(|e| eyre!("Invalid cached url '{}': {}", url, e))?;
    let response_type = ResponseType::parse(&response_type)
      .ok_or_else(|| eyre!("Unknown cached response type '{}'", response_type))?;
    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

    Ok(Some(Response {
      url,
      status,
      response_type,
      headers,
      body,
    }))
  }

  fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    insert_entry(&conn, bucket, request, response)
  }

  fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Make sure an empty manifest still leaves an opened bucket behind
    tx.execute(
      "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

    for (request, response) in entries {
      insert_entry(&tx, bucket, request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn entry_urls(&self, bucket: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT url FROM cache_entries WHERE bucket = ? ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let urls = stmt
      .query_map(params![bucket], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list entries: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read entry url: {}", e))?;

    Ok(urls)
  }

  fn load_state(&self) -> Result<ControllerState> {
    let conn = self.lock()?;
    let state = conn
      .query_row(
        "SELECT active_version, waiting_version FROM controller_state WHERE id = 1",
        [],
        |row| {
          Ok(ControllerState {
            active_version: row.get(0)?,
            waiting_version: row.get(1)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read controller state: {}", e))?;

    Ok(state.unwrap_or_default())
  }

  fn store_state(&self, state: &ControllerState) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO controller_state (id, active_version, waiting_version)
         VALUES (1, ?, ?)",
        params![state.active_version, state.waiting_version],
      )
      .map_err(|e| eyre!("Failed to write controller state: {}", e))?;
    Ok(())
  }
}
