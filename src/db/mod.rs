//! Database module: entity models and SQL repositories.
//!
//! - `model`: persisted rows (`SyncRun`, `Episode`) and update payloads.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! Callers import from `weekly_digest::db`; the repository API and the entity
//! types are re-exported here.

pub mod model;
pub mod repo;

pub use model::{DuplicateEpisode, Episode, SyncRun, SyncUpdate};
pub use repo::*;
