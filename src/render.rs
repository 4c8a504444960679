//! Plain-text rendering of notes for the terminal.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt::Display;
use std::fmt::Write;

use crate::notes::Note;

pub const EMPTY_HINT: &str = "No notes yet. Create your first one!";

/// `dd.mm.yyyy HH:MM` in the given timezone.
pub fn format_date<Tz>(value: &DateTime<Utc>, tz: &Tz) -> String
where
  Tz: TimeZone,
  Tz::Offset: Display,
{
  value.with_timezone(tz).format("%d.%m.%Y %H:%M").to_string()
}

/// Render an already ordered list of notes.
pub fn render_notes<Tz>(notes: &[Note], tz: &Tz) -> String
where
  Tz: TimeZone,
  Tz::Offset: Display,
{
  if notes.is_empty() {
    return format!("{EMPTY_HINT}\n");
  }

  let mut out = String::new();
  for note in notes {
    let _ = writeln!(out, "{}  {}", note.id, format_date(&note.created_at, tz));
    for line in note.text.lines() {
      let _ = writeln!(out, "    {line}");
    }
  }
  out
}

/// Resolve a full id or a unique id prefix against the known notes.
pub fn resolve_id(notes: &[Note], input: &str) -> Option<String> {
  if let Some(note) = notes.iter().find(|n| n.id == input) {
    return Some(note.id.clone());
  }
  if input.is_empty() {
    return None;
  }

  let mut matches = notes.iter().filter(|n| n.id.starts_with(input));
  match (matches.next(), matches.next()) {
    (Some(note), None) => Some(note.id.clone()),
    _ => None,
  }
}
