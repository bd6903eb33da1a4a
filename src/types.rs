// src/types.rs

//! Small shared value types: command identifiers, submitted commands and
//! listing filters.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::errors::ChatShellError;

/// Opaque identifier of a submitted command.
///
/// Generated once per accepted `cmd` message and never reused. Operators use
/// it to correlate results and to `kill` a running command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(Uuid);

impl CommandId {
    pub fn new() -> Self {
        CommandId(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for CommandId {
    type Err = ChatShellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(CommandId)
            .map_err(|_| ChatShellError::InvalidCommandId(s.to_string()))
    }
}

/// A single requested execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: CommandId,
    /// Raw command line, executed through the configured shell.
    pub text: String,
    /// Canonical address of the sender who issued it.
    pub requested_by: String,
}

impl Command {
    pub fn new(text: impl Into<String>, requested_by: impl Into<String>) -> Self {
        Self {
            id: CommandId::new(),
            text: text.into(),
            requested_by: requested_by.into(),
        }
    }
}

/// Which registry entries a `list` request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    Active,
    Completed,
}

impl FromStr for ListFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(ListFilter::Active),
            "completed" => Ok(ListFilter::Completed),
            other => Err(format!(
                "invalid list filter: {other} (expected \"active\" or \"completed\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_are_unique_and_round_trip_through_display() {
        let a = CommandId::new();
        let b = CommandId::new();
        assert_ne!(a, b);

        let parsed: CommandId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn command_id_rejects_non_uuid_text() {
        let err = "12345".parse::<CommandId>().unwrap_err();
        assert!(matches!(err, ChatShellError::InvalidCommandId(s) if s == "12345"));
    }

    #[test]
    fn list_filter_is_case_insensitive() {
        assert_eq!("ACTIVE".parse::<ListFilter>(), Ok(ListFilter::Active));
        assert_eq!(" Completed ".parse::<ListFilter>(), Ok(ListFilter::Completed));
        assert!("running".parse::<ListFilter>().is_err());
    }
}
