// src/engine/render.rs

//! Pure text rendering for everything the bot says in chat.
//!
//! No IO here; the engine and workers call these and enqueue the result.

use std::time::Duration;

use crate::exec::{RoutedStream, ScratchFile, StreamKind};
use crate::registry::{CommandState, ExecutionRecord, TerminationReason};
use crate::types::{Command, CommandId, ListFilter};

pub const NOT_FOUND: &str = "Command not found";

pub fn help(authorized: &str) -> String {
    format!(
        "Hi I am currently accepting commands from: **{authorized}**\n\n\
         **Supported commands**\n\
         * *cmd* : To issue a command type in 'cmd' followed by the command you would like to run. Usage: **cmd [system command]**\n\
         * *kill* : Kills a command using its ID. Usage: **kill [command ID]**\n\
         * *list active* : Lists all active commands. Usage: **list active**\n\
         * *list completed* : Lists all completed commands. Usage: **list completed**"
    )
}

pub fn received(command: &Command) -> String {
    format!("Received command (ID: {}): `{}`", command.id, command.text)
}

pub fn processing(command: &Command) -> String {
    format!("Processing command (ID: {}): `{}`", command.id, command.text)
}

pub fn kill_received(id: &CommandId) -> String {
    format!("Received kill for command ID: `{id}`")
}

pub fn invalid_kill(raw: &str) -> String {
    format!("Invalid process ID: `{raw}`")
}

pub fn kill_unknown(id: &CommandId) -> String {
    format!("Command ID {id} is not valid")
}

pub fn kill_already_finished(id: &CommandId) -> String {
    format!("Command (ID: {id}) has already completed; nothing to kill")
}

pub fn kill_already_requested(id: &CommandId) -> String {
    format!("A kill has already been requested for command (ID: {id})")
}

pub fn queue_closed(command: &Command) -> String {
    format!(
        "Command (ID: {}): `{}` was not accepted because the bot is shutting down",
        command.id, command.text
    )
}

pub fn response_audit(command: &Command) -> String {
    format!("Response sent for command (ID: {}): `{}`", command.id, command.text)
}

/// Everything known about a command once it is terminal.
#[derive(Debug)]
pub struct Outcome {
    pub reason: TerminationReason,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// Configured timeout, for the timeout notice.
    pub timeout: Option<Duration>,
    /// Raw start failure text, surfaced verbatim.
    pub spawn_error: Option<String>,
    pub stdout: RoutedStream,
    pub stderr: RoutedStream,
}

impl Outcome {
    pub fn spawn_failed(error: impl Into<String>) -> Self {
        Self {
            reason: TerminationReason::SpawnFailed,
            exit_code: None,
            signal: None,
            timeout: None,
            spawn_error: Some(error.into()),
            stdout: RoutedStream::Empty,
            stderr: RoutedStream::Empty,
        }
    }

    pub fn killed_before_start() -> Self {
        Self {
            reason: TerminationReason::Killed,
            exit_code: None,
            signal: None,
            timeout: None,
            spawn_error: None,
            stdout: RoutedStream::Empty,
            stderr: RoutedStream::Empty,
        }
    }
}

pub fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// Render the single terminal response for a command. Spilled streams are
/// moved out as attachments.
pub fn outcome(command: &Command, outcome: Outcome) -> (String, Vec<ScratchFile>) {
    let Outcome {
        reason,
        exit_code,
        signal,
        timeout,
        spawn_error,
        stdout,
        stderr,
    } = outcome;

    let head = format!("Command (ID: {}): `{}`", command.id, command.text);
    let mut text = match reason {
        TerminationReason::Exited => match (exit_code, signal) {
            (Some(0), _) => format!("{head} completed successfully"),
            (Some(code), _) => format!("{head} exited with status {code}"),
            (None, Some(sig)) => format!("{head} was terminated by signal {sig}"),
            (None, None) => format!("{head} exited with an unknown status"),
        },
        TerminationReason::TimedOut => match timeout {
            Some(t) => format!(
                "{head} was killed after exceeding timeout of {}",
                format_duration(t)
            ),
            None => format!("{head} was killed after exceeding its timeout"),
        },
        TerminationReason::Killed => {
            format!("{head} was killed after receiving a kill request")
        }
        TerminationReason::SpawnFailed => format!(
            "{head} failed to start: {}",
            spawn_error.as_deref().unwrap_or("unknown error")
        ),
    };

    let mut attachments = Vec::new();
    for (kind, stream) in [(StreamKind::Stdout, stdout), (StreamKind::Stderr, stderr)] {
        match stream {
            RoutedStream::Empty => {}
            RoutedStream::Inline(body) => {
                text.push_str(&format!("\n\n{kind}\n```\n{}\n```", body.trim_end_matches('\n')));
            }
            RoutedStream::Spilled { file, len } => {
                text.push_str(&format!(
                    "\n\n{kind} ({len} bytes) attached as `{}`",
                    file.file_name()
                ));
                attachments.push(file);
            }
            RoutedStream::Unsaved { len, error } => {
                text.push_str(&format!(
                    "\n\n{kind} ({len} bytes) could not be attached: {error}"
                ));
            }
        }
    }

    (text, attachments)
}

fn status_label(state: &CommandState) -> String {
    match state {
        CommandState::Terminal {
            exit_code: Some(code),
            reason,
        } => format!("{code} ({reason})"),
        CommandState::Terminal {
            exit_code: None,
            reason,
        } => format!("- ({reason})"),
        CommandState::Running { .. } => "running".to_string(),
        CommandState::Pending => "pending".to_string(),
    }
}

/// Render a `list active` / `list completed` reply.
pub fn listing(filter: ListFilter, records: &[ExecutionRecord]) -> String {
    if records.is_empty() {
        return match filter {
            ListFilter::Active => "No active commands found".to_string(),
            ListFilter::Completed => "No completed / killed commands found".to_string(),
        };
    }

    let lines: Vec<String> = records
        .iter()
        .map(|r| match filter {
            ListFilter::Active => format!(
                "{} ({}) [{}] > cmd[{}]",
                r.command.id,
                r.command.requested_by,
                status_label(&r.state),
                r.command.text
            ),
            ListFilter::Completed => format!(
                "{} ({}) Status: {} > cmd[{}]",
                r.command.id,
                r.command.requested_by,
                status_label(&r.state),
                r.command.text
            ),
        })
        .collect();

    let title = match filter {
        ListFilter::Active => "Active Commands:",
        ListFilter::Completed => "Completed Commands:",
    };
    format!("{title}\n```\n{}\n```", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CommandRegistry;

    fn cmd(text: &str) -> Command {
        Command::new(text, "ops@example.com")
    }

    fn exited(code: i32, stdout: RoutedStream) -> Outcome {
        Outcome {
            reason: TerminationReason::Exited,
            exit_code: Some(code),
            signal: None,
            timeout: None,
            spawn_error: None,
            stdout,
            stderr: RoutedStream::Empty,
        }
    }

    #[test]
    fn inline_stdout_is_a_fenced_block() {
        let c = cmd("echo hi");
        let (text, files) = outcome(&c, exited(0, RoutedStream::Inline("hi\n".to_string())));
        assert!(files.is_empty());
        assert!(text.contains("completed successfully"));
        assert!(text.contains("STDOUT\n```\nhi\n```"));
        assert!(!text.contains("STDERR"));
    }

    #[test]
    fn non_zero_exit_keeps_output() {
        let c = cmd("ls /nope");
        let mut o = exited(2, RoutedStream::Empty);
        o.stderr = RoutedStream::Inline("ls: cannot access '/nope'".to_string());
        let (text, _) = outcome(&c, o);
        assert!(text.contains("exited with status 2"));
        assert!(text.contains("STDERR\n```\nls: cannot access '/nope'\n```"));
    }

    #[test]
    fn timeout_notice_names_the_timeout() {
        let c = cmd("sleep 5");
        let o = Outcome {
            reason: TerminationReason::TimedOut,
            exit_code: None,
            signal: Some(15),
            timeout: Some(Duration::from_secs(1)),
            spawn_error: None,
            stdout: RoutedStream::Empty,
            stderr: RoutedStream::Empty,
        };
        let (text, _) = outcome(&c, o);
        assert!(text.ends_with("was killed after exceeding timeout of 1s"));
    }

    #[test]
    fn spawn_failure_is_verbatim() {
        let c = cmd("");
        let (text, _) = outcome(&c, Outcome::spawn_failed("empty command"));
        assert!(text.ends_with("failed to start: empty command"));
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn empty_listings_use_sentinels() {
        assert_eq!(listing(ListFilter::Active, &[]), "No active commands found");
        assert_eq!(
            listing(ListFilter::Completed, &[]),
            "No completed / killed commands found"
        );
    }

    #[test]
    fn completed_listing_shows_exit_codes() {
        let registry = CommandRegistry::new();
        let ok = cmd("true");
        let bad = cmd("false");
        let killed = cmd("sleep 100");
        for c in [&ok, &bad, &killed] {
            registry.insert(c.clone()).unwrap();
        }
        registry.mark_terminal(&ok.id, Some(0), TerminationReason::Exited);
        registry.mark_terminal(&bad.id, Some(1), TerminationReason::Exited);
        registry.mark_terminal(&killed.id, None, TerminationReason::Killed);

        let text = listing(ListFilter::Completed, &registry.snapshot(ListFilter::Completed));
        assert!(text.starts_with("Completed Commands:"));
        assert!(text.contains(&format!("{} (ops@example.com) Status: 0 (exited) > cmd[true]", ok.id)));
        assert!(text.contains(&format!("{} (ops@example.com) Status: 1 (exited) > cmd[false]", bad.id)));
        assert!(text.contains(&format!("{} (ops@example.com) Status: - (killed) > cmd[sleep 100]", killed.id)));
    }
}
