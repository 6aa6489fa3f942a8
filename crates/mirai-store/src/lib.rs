pub mod database;
pub mod draft;
pub mod error;
pub mod kv;
pub mod schema;

pub use database::Database;
pub use draft::{DraftCache, DRAFT_KEY};
pub use error::StoreError;
pub use kv::{KvEntry, KvRepo};
