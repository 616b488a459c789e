//! Random alphanumeric identifiers for upload filenames and download names.
//!
//! Not suitable for anything security related; the only requirement is that
//! two names picked for the same bucket practically never collide.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length used for uploaded object names.
pub const DEFAULT_ID_LEN: usize = 21;

/// Length used for locally saved downloads.
pub const SHORT_ID_LEN: usize = 6;

/// Generate `length` characters drawn uniformly from `A-Za-z0-9`.
pub fn nano_id(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
