//! Messages database access and row decoding
//!
//! Everything here is synchronous: the store is a local SQLite file and the
//! decoders are pure.

pub mod attributed_body;
pub mod normalize;
pub mod store;
pub mod timestamp;

use std::path::PathBuf;

pub use normalize::{normalize, normalize_with, NormalizeOptions};
pub use store::MessageStore;

/// Default location of the Messages database: `~/Library/Messages/chat.db`.
pub fn default_db_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| {
        dirs.home_dir()
            .join("Library")
            .join("Messages")
            .join("chat.db")
    })
}
