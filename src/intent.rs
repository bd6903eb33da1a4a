// src/intent.rs

//! Classification of chat text into operator intents.
//!
//! Supported surface (case-insensitive keywords):
//! - `help`
//! - `cmd <shell line>`
//! - `kill <command id>`
//! - `list active` / `list completed`
//!
//! Anything else is [`Intent::Unknown`].

use crate::types::{CommandId, ListFilter};

/// The classified meaning of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Help,
    /// Run the remainder as a shell line. May be empty; that fails later at
    /// execution time rather than here.
    Run(String),
    Kill(CommandId),
    /// `kill` followed by something that is not a command ID.
    InvalidKill(String),
    List(ListFilter),
    Unknown,
}

const CMD: &str = "cmd";
const KILL: &str = "kill";
const LIST: &str = "list";

/// Parse already-normalized message text (mention token removed).
pub fn parse_intent(text: &str) -> Intent {
    let text = text.trim();

    if text.eq_ignore_ascii_case("help") {
        return Intent::Help;
    }

    if let Some(rest) = strip_keyword(text, CMD) {
        return Intent::Run(rest.trim().to_string());
    }

    if let Some(rest) = strip_keyword(text, KILL) {
        let raw = rest.trim();
        return match raw.parse::<CommandId>() {
            Ok(id) => Intent::Kill(id),
            Err(_) => Intent::InvalidKill(raw.to_string()),
        };
    }

    if let Some(rest) = strip_keyword(text, LIST) {
        return match rest.parse::<ListFilter>() {
            Ok(filter) => Intent::List(filter),
            Err(_) => Intent::Unknown,
        };
    }

    Intent::Unknown
}

/// Case-insensitive prefix match returning the remainder.
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        Some(&text[keyword.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_is_an_exact_match() {
        assert_eq!(parse_intent("help"), Intent::Help);
        assert_eq!(parse_intent("HeLp"), Intent::Help);
        assert_eq!(parse_intent("help me"), Intent::Unknown);
    }

    #[test]
    fn cmd_prefix_keeps_the_trimmed_remainder() {
        assert_eq!(parse_intent("cmd echo hi"), Intent::Run("echo hi".to_string()));
        assert_eq!(
            parse_intent("CMD   ls -la  /tmp "),
            Intent::Run("ls -la  /tmp".to_string())
        );
    }

    #[test]
    fn empty_cmd_is_still_a_run_intent() {
        assert_eq!(parse_intent("cmd"), Intent::Run(String::new()));
        assert_eq!(parse_intent("cmd    "), Intent::Run(String::new()));
    }

    #[test]
    fn kill_requires_a_uuid() {
        let id = CommandId::new();
        assert_eq!(parse_intent(&format!("kill {id}")), Intent::Kill(id));
        assert_eq!(parse_intent(&format!("KILL   {id}")), Intent::Kill(id));
        assert_eq!(
            parse_intent("kill 42"),
            Intent::InvalidKill("42".to_string())
        );
        assert_eq!(parse_intent("kill"), Intent::InvalidKill(String::new()));
    }

    #[test]
    fn list_subcommands() {
        assert_eq!(parse_intent("list active"), Intent::List(ListFilter::Active));
        assert_eq!(
            parse_intent("LIST Completed"),
            Intent::List(ListFilter::Completed)
        );
        assert_eq!(parse_intent("list everything"), Intent::Unknown);
        assert_eq!(parse_intent("list"), Intent::Unknown);
    }

    #[test]
    fn anything_else_is_unknown() {
        assert_eq!(parse_intent(""), Intent::Unknown);
        assert_eq!(parse_intent("hello there"), Intent::Unknown);
        assert_eq!(parse_intent("é"), Intent::Unknown);
    }
}
