//! Random identifiers: coherency tags, lock ids, bucket suffixes.

use uuid::Uuid;

/// Length of a dataset coherency tag.
pub const CTAG_LEN: usize = 16;

/// Length of the random part of a lock id.
const LOCK_ID_SUFFIX_LEN: usize = 18;

/// Prefix marking a write lock id.
pub const WRITE_LOCK_PREFIX: char = 'W';

/// Prefix marking a read lock id.
pub const READ_LOCK_PREFIX: char = 'R';

/// Generate a random alphanumeric id of `len` characters.
///
/// Characters come from concatenated v4 UUIDs rendered in hex, so the id
/// carries 4 bits of entropy per character.
pub fn make_id(len: usize) -> String {
    let mut out = String::with_capacity(len);
    while out.len() < len {
        let simple = Uuid::new_v4().simple().to_string();
        let take = (len - out.len()).min(simple.len());
        out.push_str(&simple[..take]);
    }
    out
}

/// Generate a fresh coherency tag.
pub fn make_ctag() -> String {
    make_id(CTAG_LEN)
}

/// Generate a fresh write lock id (`W` + random suffix).
pub fn make_write_lock_id() -> String {
    format!("{WRITE_LOCK_PREFIX}{}", make_id(LOCK_ID_SUFFIX_LEN))
}

/// Generate a fresh read lock id (`R` + random suffix).
pub fn make_read_lock_id() -> String {
    format!("{READ_LOCK_PREFIX}{}", make_id(LOCK_ID_SUFFIX_LEN))
}

/// Whether `id` is shaped like a write lock id.
pub fn is_write_lock_id(id: &str) -> bool {
    id.len() > 1 && id.starts_with(WRITE_LOCK_PREFIX)
}

/// Whether `id` is shaped like a read lock id.
pub fn is_read_lock_id(id: &str) -> bool {
    id.len() > 1 && id.starts_with(READ_LOCK_PREFIX)
}
