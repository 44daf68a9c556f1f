use crate::session::{Session, SessionDirectory};

/// A typing flag older than this counts as "not typing".
pub const TYPING_TIMEOUT_MS: i64 = 3000;

/// Update one session's typing flag. Turning it on refreshes the timestamp.
pub fn set_typing(session: &mut Session, is_typing: bool, now_ms: i64) {
    session.is_typing = is_typing;
    if is_typing {
        session.last_typing_ms = now_ms;
    }
}

/// Names of sessions typing in a room right now, sorted. Stale flags are
/// skipped rather than cleared.
pub fn typing_names(sessions: &SessionDirectory, group: &str, room: &str, now_ms: i64) -> Vec<String> {
    let mut names: Vec<String> = sessions
        .iter()
        .filter(|s| s.is_typing && s.is_in(group, room))
        .filter(|s| now_ms - s.last_typing_ms <= TYPING_TIMEOUT_MS)
        .map(|s| s.display_name.clone())
        .collect();
    names.sort();
    names
}
