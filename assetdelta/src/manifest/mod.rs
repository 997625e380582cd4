//! Manifest snapshots and the diff engine.
//!
//! - `hashed`: parse snapshot text into a [`HashedManifest`]
//! - `diff`: compute added/changed paths and persist diff records

mod diff;
mod error;
mod hashed;

pub use diff::{
    diff, diff_files, diff_record_name, load_diff_record, save_diff_record, DiffResult,
};
pub use error::{ManifestError, ManifestResult};
pub use hashed::{ContentHash, HashedManifest, HASH_HEX_LEN};
