//! One spawned process in a pipeline chain.
//!
//! A `Stage` wraps the OS process behind opaque capabilities: a claimable
//! stdin slot, a `Tee` over its stdout, and a watch cell that settles once
//! with the terminal state. Spawn refusal is recorded in the cell rather
//! than raised; the stage exists either way, and completion reports what
//! happened.

use std::mem;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::process::{ChildStdin, Command};
use tokio::sync::watch;
use tracing::{debug, warn};

use plumb_template::ParsedCommand;

use crate::error::ChainError;
use crate::report::StageStatus;
use crate::tee::Tee;

/// The claimable stdin slot. Standard input is a single-reader stream:
/// after one claim (or an EOF close) a second upstream connection is
/// refused.
enum StdinSlot {
    Open(ChildStdin),
    /// The process never spawned; there is no input to connect.
    Missing,
    Taken,
}

pub(crate) struct Stage {
    command: ParsedCommand,
    stdin: Mutex<StdinSlot>,
    output: Tee,
    exit: watch::Receiver<Option<StageStatus>>,
}

impl Stage {
    /// Spawn the process and wrap it. Never fails: an OS spawn refusal is
    /// published as `StageStatus::SpawnFailed` through the exit cell, and
    /// downstream consumers of the stage's output observe immediate EOF.
    pub(crate) fn spawn(command: ParsedCommand) -> Arc<Self> {
        let (exit_tx, exit_rx) = watch::channel(None);

        let mut os_command = Command::new(&command.program);
        os_command
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let (stdin, stdout) = match os_command.spawn() {
            Ok(mut child) => {
                debug!(command = %command, "spawned pipeline stage");
                let stdin = child.stdin.take();
                let stdout = child.stdout.take();
                tokio::spawn(async move {
                    let status = match child.wait().await {
                        Ok(exit) => StageStatus::Exited(exit),
                        Err(e) => StageStatus::WaitFailed { message: e.to_string() },
                    };
                    exit_tx.send_replace(Some(status));
                });
                (stdin, stdout)
            }
            Err(e) => {
                warn!(command = %command, error = %e, "failed to spawn pipeline stage");
                exit_tx.send_replace(Some(StageStatus::SpawnFailed {
                    kind: e.kind(),
                    message: e.to_string(),
                }));
                (None, None)
            }
        };

        let output = Tee::new(stdout, command.program.clone());
        let stdin = match stdin {
            Some(stdin) => StdinSlot::Open(stdin),
            None => StdinSlot::Missing,
        };

        Arc::new(Self {
            command,
            stdin: Mutex::new(stdin),
            output,
            exit: exit_rx,
        })
    }

    pub(crate) fn command(&self) -> &ParsedCommand {
        &self.command
    }

    pub(crate) fn output(&self) -> &Tee {
        &self.output
    }

    /// Claim this process's stdin for an upstream connection. `Ok(None)`
    /// means the process never started, so the upstream's bytes have nowhere
    /// to go and are discarded by the caller.
    pub(crate) fn claim_stdin(&self) -> Result<Option<ChildStdin>, ChainError> {
        let mut slot = self.stdin.lock().unwrap_or_else(|e| e.into_inner());
        match mem::replace(&mut *slot, StdinSlot::Taken) {
            StdinSlot::Open(stdin) => Ok(Some(stdin)),
            StdinSlot::Missing => Ok(None),
            StdinSlot::Taken => Err(ChainError::InputAlreadyClaimed),
        }
    }

    /// Drop an unclaimed stdin so a head process that reads its input sees
    /// EOF instead of waiting forever.
    pub(crate) fn close_stdin_if_unclaimed(&self) {
        let mut slot = self.stdin.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*slot, StdinSlot::Open(_)) {
            *slot = StdinSlot::Taken;
        }
    }

    /// Wait for the terminal state. Any number of callers may wait; all
    /// observe the same settled status.
    pub(crate) async fn wait(&self) -> StageStatus {
        let mut exit = self.exit.clone();
        match exit.wait_for(|status| status.is_some()).await {
            Ok(status) => status.clone().unwrap_or_else(notifier_lost),
            Err(_) => notifier_lost(),
        }
    }

    pub(crate) fn warnings(&self) -> Vec<String> {
        self.output.warnings()
    }
}

/// Only reachable if the wait task panicked before settling.
fn notifier_lost() -> StageStatus {
    StageStatus::WaitFailed {
        message: "exit notifier dropped before settling".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn parsed(program: &str, args: &[&str]) -> ParsedCommand {
        ParsedCommand {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn clean_exit_is_reported() {
        let stage = Stage::spawn(parsed("true", &[]));
        stage.close_stdin_if_unclaimed();
        assert!(stage.wait().await.success());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let stage = Stage::spawn(parsed("sh", &["-c", "exit 7"]));
        stage.close_stdin_if_unclaimed();
        match stage.wait().await {
            StageStatus::Exited(status) => assert_eq!(status.code(), Some(7)),
            other => panic!("expected Exited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_refusal_settles_as_spawn_failed() {
        let stage = Stage::spawn(parsed("definitely_not_a_real_command_12345", &[]));
        match stage.wait().await {
            StageStatus::SpawnFailed { kind, .. } => assert_eq!(kind, io::ErrorKind::NotFound),
            other => panic!("expected SpawnFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stdin_can_be_claimed_once() {
        let stage = Stage::spawn(parsed("cat", &[]));
        let first = stage.claim_stdin();
        assert!(matches!(first, Ok(Some(_))));
        assert!(matches!(
            stage.claim_stdin(),
            Err(ChainError::InputAlreadyClaimed)
        ));
        // Dropping the claimed stdin lets cat exit.
        drop(first);
        assert!(stage.wait().await.success());
    }

    #[tokio::test]
    async fn failed_spawn_has_no_stdin() {
        let stage = Stage::spawn(parsed("definitely_not_a_real_command_12345", &[]));
        assert!(matches!(stage.claim_stdin(), Ok(None)));
        assert!(matches!(
            stage.claim_stdin(),
            Err(ChainError::InputAlreadyClaimed)
        ));
    }
}
