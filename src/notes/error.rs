use thiserror::Error;

#[derive(Error, Debug)]
pub enum NoteError {
  #[error("Note text must not be empty")]
  EmptyText,

  #[error("Stored notes under '{key}' are malformed: {reason}")]
  Corrupt { key: String, reason: String },

  #[error("Storage error: {0}")]
  Storage(String),

  #[error("Failed to persist notes: {0}")]
  Persist(String),
}
