use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// return second
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
