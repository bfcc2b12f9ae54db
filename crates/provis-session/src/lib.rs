//! Captured-session persistence.
//!
//! A [`SessionState`] is everything needed to put a browser back into an
//! authenticated state without logging in again: cookies and localStorage.
//! [`SessionStore`] abstracts where that state lives; the file-backed store
//! is what production runs use, the in-memory store backs tests.

mod error;
mod state;
mod store;

pub use error::StoreError;
pub use state::SessionState;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
