//! Syntactic mailbox validation.

use lettre::message::Mailbox;

/// Parse a sender/recipient field as an RFC 5322 mailbox.
///
/// Accepts both a bare `user@domain` and the `Name <user@domain>` form.
pub fn parse_mailbox(raw: &str) -> Result<Mailbox, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("address is empty".to_string());
    }
    raw.parse::<Mailbox>()
        .map_err(|e| format!("invalid address '{raw}': {e}"))
}
