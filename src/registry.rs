// src/registry.rs

//! Concurrent registry of every command the engine has accepted.
//!
//! Records are inserted once, transition monotonically
//! `Pending -> Running -> Terminal`, and are never removed. Each record is
//! written only by the worker that owns its process; list handlers take
//! cloned snapshots and never hold the lock while rendering.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use crate::errors::{ChatShellError, Result};
use crate::types::{Command, CommandId, ListFilter};

/// Why a command reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The process exited on its own (any exit code).
    Exited,
    /// The configured timeout fired and the process group was terminated.
    TimedOut,
    /// An operator `kill` (or shutdown) terminated the process group.
    Killed,
    /// The process could never be started.
    SpawnFailed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationReason::Exited => "exited",
            TerminationReason::TimedOut => "timed out",
            TerminationReason::Killed => "killed",
            TerminationReason::SpawnFailed => "failed to start",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Running {
        pid: Option<u32>,
    },
    /// Exit code and reason are published together with the transition.
    Terminal {
        exit_code: Option<i32>,
        reason: TerminationReason,
    },
}

impl CommandState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandState::Terminal { .. })
    }
}

/// A command plus its process-level state.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub command: Command,
    pub state: CommandState,
    seq: u64,
}

impl ExecutionRecord {
    pub fn matches(&self, filter: ListFilter) -> bool {
        match filter {
            ListFilter::Active => !self.state.is_terminal(),
            ListFilter::Completed => self.state.is_terminal(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<CommandId, ExecutionRecord>,
    next_seq: u64,
}

/// Cheaply cloneable handle to the shared registry.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new command in the `Pending` state.
    ///
    /// Fails if the ID is already known; IDs are never reused.
    pub fn insert(&self, command: Command) -> Result<()> {
        let mut inner = self.write();
        if inner.records.contains_key(&command.id) {
            return Err(ChatShellError::InvalidCommandId(format!(
                "{} is already registered",
                command.id
            )));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        debug!(command_id = %command.id, "registered pending command");
        inner.records.insert(
            command.id,
            ExecutionRecord {
                command,
                state: CommandState::Pending,
                seq,
            },
        );
        Ok(())
    }

    /// `Pending -> Running`. Returns false if the record is missing or not
    /// pending.
    pub fn mark_running(&self, id: &CommandId, pid: Option<u32>) -> bool {
        let mut inner = self.write();
        match inner.records.get_mut(id) {
            Some(record) if record.state == CommandState::Pending => {
                record.state = CommandState::Running { pid };
                true
            }
            Some(record) => {
                warn!(command_id = %id, state = ?record.state, "refusing to mark non-pending command as running");
                false
            }
            None => false,
        }
    }

    /// Any non-terminal state -> `Terminal`. Returns false if the record is
    /// missing or already terminal; the first terminal write wins.
    pub fn mark_terminal(
        &self,
        id: &CommandId,
        exit_code: Option<i32>,
        reason: TerminationReason,
    ) -> bool {
        let mut inner = self.write();
        match inner.records.get_mut(id) {
            Some(record) if !record.state.is_terminal() => {
                record.state = CommandState::Terminal { exit_code, reason };
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &CommandId) -> Option<ExecutionRecord> {
        self.read().records.get(id).cloned()
    }

    pub fn state_of(&self, id: &CommandId) -> Option<CommandState> {
        self.read().records.get(id).map(|r| r.state)
    }

    /// Snapshot of all records matching `filter`, in submission order.
    pub fn snapshot(&self, filter: ListFilter) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> = self
            .read()
            .records
            .values()
            .filter(|r| r.matches(filter))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(text: &str) -> Command {
        Command::new(text, "ops@example.com")
    }

    #[test]
    fn transitions_are_monotonic() {
        let registry = CommandRegistry::new();
        let cmd = command("sleep 1");
        let id = cmd.id;
        registry.insert(cmd).unwrap();

        assert_eq!(registry.state_of(&id), Some(CommandState::Pending));
        assert!(registry.mark_running(&id, Some(42)));
        assert!(!registry.mark_running(&id, Some(43)));

        assert!(registry.mark_terminal(&id, Some(0), TerminationReason::Exited));
        assert!(!registry.mark_terminal(&id, None, TerminationReason::Killed));
        assert!(!registry.mark_running(&id, None));

        assert_eq!(
            registry.state_of(&id),
            Some(CommandState::Terminal {
                exit_code: Some(0),
                reason: TerminationReason::Exited
            })
        );
    }

    #[test]
    fn pending_commands_can_go_straight_to_terminal() {
        let registry = CommandRegistry::new();
        let cmd = command("true");
        let id = cmd.id;
        registry.insert(cmd).unwrap();

        assert!(registry.mark_terminal(&id, None, TerminationReason::Killed));
        assert!(!registry.mark_running(&id, None));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let registry = CommandRegistry::new();
        let cmd = command("true");
        registry.insert(cmd.clone()).unwrap();
        assert!(registry.insert(cmd).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_ids_are_not_transitioned() {
        let registry = CommandRegistry::new();
        let id = CommandId::new();
        assert!(!registry.mark_running(&id, None));
        assert!(!registry.mark_terminal(&id, Some(1), TerminationReason::Exited));
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn snapshots_split_active_and_completed_in_submission_order() {
        let registry = CommandRegistry::new();
        let ids: Vec<CommandId> = (0..5)
            .map(|i| {
                let cmd = command(&format!("echo {i}"));
                let id = cmd.id;
                registry.insert(cmd).unwrap();
                id
            })
            .collect();

        registry.mark_running(&ids[1], None);
        registry.mark_terminal(&ids[2], Some(3), TerminationReason::Exited);
        registry.mark_terminal(&ids[4], None, TerminationReason::TimedOut);

        let active: Vec<CommandId> = registry
            .snapshot(ListFilter::Active)
            .iter()
            .map(|r| r.command.id)
            .collect();
        let completed: Vec<CommandId> = registry
            .snapshot(ListFilter::Completed)
            .iter()
            .map(|r| r.command.id)
            .collect();

        assert_eq!(active, vec![ids[0], ids[1], ids[3]]);
        assert_eq!(completed, vec![ids[2], ids[4]]);
    }
}
