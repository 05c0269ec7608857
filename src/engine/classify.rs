//! Maps engine error text onto [`ResolveError`]

use crate::error::ResolveError;

/// True when the message carries the blocked-access signature (HTTP 403)
pub fn is_blocked_access(message: &str) -> bool {
    message.contains("403") || message.contains("Forbidden")
}

/// Classify an engine error message, most specific pattern first
///
/// The order matters: a blocked request's text usually also mentions "unavailable" or
/// words containing "age", so earlier rules shadow later ones.
pub fn classify_error(message: &str) -> ResolveError {
    let lower = message.to_lowercase();

    if is_blocked_access(message) {
        ResolveError::BlockedAccess
    } else if message.contains("Join this channel") {
        ResolveError::MembersOnly
    } else if message.contains("Private video") || lower.contains("private video") {
        ResolveError::Private
    } else if lower.contains("members-only") {
        ResolveError::MembersOnly
    } else if message.contains("Sign in") || lower.contains("login") {
        ResolveError::LoginRequired
    } else if lower.contains("unavailable") {
        ResolveError::Unavailable
    } else if lower.contains("age") {
        ResolveError::AgeRestricted
    } else if lower.contains("copyright") {
        ResolveError::Copyright
    } else {
        ResolveError::Other(message.trim().to_string())
    }
}
