//! Note state management with a persistent copy in a key-value slot.
//!
//! The in-memory list is authoritative for the session. After every mutation
//! the whole list is written back to the slot, and reads are ordered
//! newest-first at read time.

mod error;
mod store;
mod types;

pub use store::NoteStore;
pub use types::Note;
