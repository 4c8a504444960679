use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::{CorruptPolicy, Durability, NotesConfig};
use crate::db::KeyValueStore;

use super::error::NoteError;
use super::types::Note;

type Clock = Box<dyn FnMut() -> DateTime<Utc> + Send>;

/// Owns the in-memory note list and keeps its persisted copy in sync.
///
/// Mutations take `&mut self`, so calls on one store are serialized and each
/// persistence write finishes before the next mutation starts.
pub struct NoteStore<S: KeyValueStore> {
  storage: S,
  slot_key: String,
  durability: Durability,
  notes: Vec<Note>,
  clock: Clock,
}

impl<S: KeyValueStore> NoteStore<S> {
  /// Rehydrate the store from its slot.
  ///
  /// A missing slot yields an empty store. A slot that does not parse, or
  /// holds duplicate ids or blank text, is handled according to `on_corrupt`.
  pub fn load(storage: S, config: &NotesConfig) -> Result<Self, NoteError> {
    let raw = storage
      .get(&config.slot_key)
      .map_err(|e| NoteError::Storage(e.to_string()))?;

    let notes = match raw {
      None => Vec::new(),
      Some(raw) => match parse_notes(&raw) {
        Ok(notes) => notes,
        Err(reason) => match config.on_corrupt {
          CorruptPolicy::Fail => {
            return Err(NoteError::Corrupt {
              key: config.slot_key.clone(),
              reason,
            })
          }
          CorruptPolicy::Reset => {
            let backup_key = format!("{}.corrupt", config.slot_key);
            storage
              .set(&backup_key, &raw)
              .map_err(|e| NoteError::Storage(e.to_string()))?;
            warn!(
              slot = %config.slot_key,
              backup = %backup_key,
              error = %reason,
              "Stored notes are malformed, starting empty"
            );
            Vec::new()
          }
        },
      },
    };

    debug!(count = notes.len(), slot = %config.slot_key, "Loaded notes");

    Ok(Self {
      storage,
      slot_key: config.slot_key.clone(),
      durability: config.durability,
      notes,
      clock: Box::new(Utc::now),
    })
  }

  /// Replace the time source used for `createdAt`.
  #[cfg(test)]
  pub fn with_clock(mut self, clock: impl FnMut() -> DateTime<Utc> + Send + 'static) -> Self {
    self.clock = Box::new(clock);
    self
  }

  /// All notes, newest first. Equal timestamps keep insertion order.
  pub fn list(&self) -> Vec<Note> {
    let mut sorted = self.notes.clone();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
  }

  /// Look up one note by id.
  pub fn get(&self, id: &str) -> Option<&Note> {
    self.notes.iter().find(|note| note.id == id)
  }

  /// Append a new note with trimmed `text`.
  pub fn create(&mut self, text: &str) -> Result<Vec<Note>, NoteError> {
    let text = non_blank(text)?;
    let note = Note::new(text, (self.clock)());
    debug!(id = %note.id, "Creating note");
    self.notes.push(note);
    self.persist()?;
    Ok(self.list())
  }

  /// The most recently appended note, regardless of its timestamp.
  pub fn last_created(&self) -> Option<&Note> {
    self.notes.last()
  }

  /// Replace the text of the note with `id`. Unknown ids leave the list unchanged.
  pub fn update(&mut self, id: &str, text: &str) -> Result<Vec<Note>, NoteError> {
    let text = non_blank(text)?;
    match self.notes.iter_mut().find(|note| note.id == id) {
      Some(note) => note.text = text.to_string(),
      None => debug!(id, "Update target not found"),
    }
    self.persist()?;
    Ok(self.list())
  }

  /// Remove the note with `id`. Unknown ids are a no-op.
  pub fn delete(&mut self, id: &str) -> Result<Vec<Note>, NoteError> {
    let before = self.notes.len();
    self.notes.retain(|note| note.id != id);
    if self.notes.len() == before {
      debug!(id, "Delete target not found");
    }
    self.persist()?;
    Ok(self.list())
  }

  /// Write the whole collection to the slot.
  ///
  /// The in-memory list is never rolled back on failure.
  fn persist(&self) -> Result<(), NoteError> {
    let result = serde_json::to_string(&self.notes)
      .map_err(|e| e.to_string())
      .and_then(|json| {
        self
          .storage
          .set(&self.slot_key, &json)
          .map_err(|e| e.to_string())
      });

    match (result, self.durability) {
      (Ok(()), _) => Ok(()),
      (Err(e), Durability::BestEffort) => {
        warn!(slot = %self.slot_key, error = %e, "Failed to persist notes");
        Ok(())
      }
      (Err(e), Durability::Strict) => Err(NoteError::Persist(e)),
    }
  }
}

/// Decode a persisted list and check that ids are unique and text is
/// trimmed and non-empty.
fn parse_notes(raw: &str) -> Result<Vec<Note>, String> {
  let notes: Vec<Note> = serde_json::from_str(raw).map_err(|e| e.to_string())?;

  let mut seen = HashSet::new();
  for note in &notes {
    if !seen.insert(note.id.as_str()) {
      return Err(format!("duplicate id '{}'", note.id));
    }
    if note.text.is_empty() || note.text.trim() != note.text {
      return Err(format!("note '{}' has blank or untrimmed text", note.id));
    }
  }

  Ok(notes)
}

fn non_blank(text: &str) -> Result<&str, NoteError> {
  let trimmed = text.trim();
  if trimmed.is_empty() {
    Err(NoteError::EmptyText)
  } else {
    Ok(trimmed)
  }
}
