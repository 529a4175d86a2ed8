use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::NamedServer;

use super::command_path::resolve_command;
use super::{Transport, TransportWriter};

const CHANNEL_CAPACITY: usize = 256;

/// Transport that runs an MCP tool server as a child process and speaks
/// newline-delimited JSON over its stdin/stdout.
pub struct SubprocessTransport {
    server: NamedServer,
    child: Option<Child>,
    cancel: CancellationToken,
    ready: bool,
}

impl SubprocessTransport {
    pub fn new(server: NamedServer) -> Self {
        Self {
            server,
            child: None,
            cancel: CancellationToken::new(),
            ready: false,
        }
    }

    fn spawn_error(&self, reason: impl Into<String>) -> Error {
        Error::ServerSpawn {
            server: self.server.name.clone(),
            reason: reason.into(),
        }
    }

    /// Build the server command: resolved program, args, extra env and cwd.
    fn build_command(&self) -> Command {
        let config = &self.server.config;
        let cwd = config
            .cwd
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        let program = resolve_command(
            &config.command,
            config.env.get("PATH").map(String::as_str),
            &cwd,
        );

        let mut cmd = Command::new(program);
        cmd.args(&config.args);
        if let Some(ref dir) = config.cwd {
            cmd.current_dir(dir);
        }
        for (key, val) in &config.env {
            cmd.env(key, val);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        cmd
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn connect(&mut self) -> Result<(mpsc::Receiver<Result<Value>>, TransportWriter)> {
        if self.ready {
            return Err(self.spawn_error("already connected"));
        }

        let mut cmd = self.build_command();
        let mut child = cmd.spawn().map_err(|e| {
            self.spawn_error(format!("failed to run '{}': {e}", self.server.config.command))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.spawn_error("no stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.spawn_error("no stderr"))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.spawn_error("no stdin"))?;

        tracing::debug!(server = %self.server.name, pid = ?child.id(), "tool server started");
        self.child = Some(child);
        self.ready = true;

        // Incoming message channel (stdout -> reader).
        let (read_tx, read_rx) = mpsc::channel::<Result<Value>>(CHANNEL_CAPACITY);

        // Outgoing message channel (writer -> stdin).
        let (write_tx, mut write_rx) = mpsc::channel::<Value>(CHANNEL_CAPACITY);

        let cancel = self.cancel.clone();
        let server_name = self.server.name.clone();

        // Stdout reader task.
        let stdout_cancel = cancel.clone();
        let stdout_server = server_name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            loop {
                tokio::select! {
                    _ = stdout_cancel.cancelled() => break,
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                let line = line.trim();
                                if line.is_empty() {
                                    continue;
                                }
                                match serde_json::from_str::<Value>(line) {
                                    Ok(value) => {
                                        if read_tx.send(Ok(value)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(server = %stdout_server, line, "ignoring non-JSON output: {e}");
                                    }
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                let _ = read_tx.send(Err(Error::Io(e))).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        // Stdin writer task: one JSON document per line.
        let write_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = write_cancel.cancelled() => break,
                    msg = write_rx.recv() => {
                        let Some(value) = msg else { break };
                        let mut data = match serde_json::to_string(&value) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::error!("failed to serialize outgoing message: {e}");
                                continue;
                            }
                        };
                        data.push('\n');

                        if let Err(e) = stdin.write_all(data.as_bytes()).await {
                            tracing::error!("failed to write to server stdin: {e}");
                            break;
                        }
                        if let Err(e) = stdin.flush().await {
                            tracing::error!("failed to flush server stdin: {e}");
                            break;
                        }
                    }
                }
            }
        });

        // Stderr reader task.
        let stderr_cancel = cancel;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();

            loop {
                tokio::select! {
                    _ = stderr_cancel.cancelled() => break,
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                tracing::debug!(target: "mcp_server_stderr", server = %server_name, "{}", line);
                            }
                            Ok(None) | Err(_) => break,
                        }
                    }
                }
            }
        });

        Ok((read_rx, TransportWriter::new(write_tx)))
    }

    async fn close(&mut self) -> Result<()> {
        self.ready = false;
        self.cancel.cancel();

        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
            tracing::debug!(server = %self.server.name, "tool server stopped");
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
