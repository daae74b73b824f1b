//! Timestamp and identifier helpers shared by the link store and audit sink.

use ulid::Ulid;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Link row identifiers: `DL_` + ULID. A re-asserted link gets a fresh one.
pub fn new_link_id() -> String {
    format!("DL_{}", Ulid::new())
}
