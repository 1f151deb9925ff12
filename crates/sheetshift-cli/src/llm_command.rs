//! LLM collaborator backed by an external command
//!
//! The request goes to the command's stdin as JSON; the first non-empty line of stdout is
//! the translated formula. Stdout is drained on its own thread while the command runs, so
//! output larger than the pipe buffer cannot stall it.

use crossbeam::channel::{self, RecvTimeoutError};
use sheetshift::{LlmCallError, LlmRequest, LlmResponse, LlmTranslator};
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CommandTranslator {
    command: String,
}

impl CommandTranslator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn shell(&self) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        }
    }
}

impl LlmTranslator for CommandTranslator {
    fn translate(&self, request: &LlmRequest, timeout: Duration) -> Result<LlmResponse, LlmCallError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| LlmCallError::Failed(format!("cannot encode request: {e}")))?;

        let mut child = self
            .shell()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| LlmCallError::Failed(format!("cannot run '{}': {e}", self.command)))?;

        let (output_tx, output_rx) = channel::bounded(1);
        if let Some(mut stdout) = child.stdout.take() {
            std::thread::Builder::new()
                .name("sheetshift-llm-stdout".into())
                .spawn(move || {
                    let mut output = String::new();
                    let _ = output_tx.send(stdout.read_to_string(&mut output).map(|_| output));
                })
                .map_err(|e| LlmCallError::Failed(format!("cannot read command output: {e}")))?;
        }

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|e| LlmCallError::Failed(format!("cannot write request: {e}")))?;
        }

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(LlmCallError::Timeout(timeout));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(LlmCallError::Failed(e.to_string())),
            }
        };
        if !status.success() {
            return Err(LlmCallError::Failed(format!(
                "'{}' exited with {status}",
                self.command
            )));
        }

        // A background process of the command may still hold stdout open
        let remaining = deadline.saturating_duration_since(Instant::now());
        let output = match output_rx.recv_timeout(remaining.max(POLL_INTERVAL)) {
            Ok(read) => read.map_err(|e| LlmCallError::InvalidResponse(e.to_string()))?,
            Err(RecvTimeoutError::Timeout) => return Err(LlmCallError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => String::new(),
        };
        let formula = output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| LlmCallError::InvalidResponse("command printed nothing".into()))?;
        tracing::debug!(command = %self.command, "LLM command answered");
        Ok(LlmResponse {
            target_formula_text: formula.to_string(),
        })
    }
}
