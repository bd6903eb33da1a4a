// src/poll/mod.rs

//! Message intake: fetch, authorize, deduplicate, strip mentions, dispatch.

pub mod access;
pub mod dedup;
pub mod poller;

pub use access::AuthorizationSet;
pub use dedup::DedupSet;
pub use poller::{Inbound, MessagePoller, PollerHandle, spawn_poller};

/// In group rooms messages addressed to the bot start with its nickname.
pub fn strip_mention<'a>(text: &'a str, nickname: &str) -> &'a str {
    let text = text.trim();
    if nickname.is_empty() {
        return text;
    }
    match text.strip_prefix(nickname) {
        Some(rest) => rest.trim(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::strip_mention;

    #[test]
    fn leading_nickname_is_removed() {
        assert_eq!(strip_mention("Shelly cmd uptime", "Shelly"), "cmd uptime");
        assert_eq!(strip_mention("  Shelly   help ", "Shelly"), "help");
    }

    #[test]
    fn other_text_is_untouched() {
        assert_eq!(strip_mention("cmd echo Shelly", "Shelly"), "cmd echo Shelly");
        assert_eq!(strip_mention("shelly help", "Shelly"), "shelly help");
        assert_eq!(strip_mention("help", ""), "help");
    }
}
