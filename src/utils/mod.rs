//!
//! Utility module for the syncer.
//!
//! Re-exports hashing helpers used by the parser, the transformers and the store.
/// Chain hashing and checksum helpers
pub mod hash;

pub use hash::{crc32, script_hash};
