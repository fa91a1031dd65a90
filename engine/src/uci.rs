//! One UCI engine child process: serialized stdin writes, a background
//! stdout reader, and a single-slot channel carrying the latest bestmove.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, watch, Mutex};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to spawn engine {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine stdio pipes unavailable")]
    Pipe,
    #[error("engine command failed: {0}")]
    Command(#[source] std::io::Error),
    #[error("waiting for engine exit failed: {0}")]
    Wait(#[source] std::io::Error),
}

/// Wrapper around a spawned UCI engine process.
///
/// While the process is alive exactly one reader task drains its stdout.
/// The reader parses `bestmove` lines into a one-slot channel; everything
/// else the engine prints is ignored.
pub struct UciEngine {
    id: Uuid,
    child: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    quit_tx: watch::Sender<bool>,
    best_move_rx: Mutex<mpsc::Receiver<String>>,
}

impl UciEngine {
    /// Spawns the engine binary, starts the stdout reader, and sends the
    /// `uci` handshake. Does not wait for `uciok`; engines that need more
    /// setup time simply answer the first `go` a little later.
    pub async fn spawn(path: &Path) -> Result<Self, EngineError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: path.to_path_buf(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(EngineError::Pipe)?;
        let stdout = child.stdout.take().ok_or(EngineError::Pipe)?;

        let id = Uuid::new_v4();
        let (best_move_tx, best_move_rx) = mpsc::channel(1);
        let (quit_tx, quit_rx) = watch::channel(false);

        tokio::spawn(read_loop(id, stdout, best_move_tx, quit_rx));

        let engine = Self {
            id,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            quit_tx,
            best_move_rx: Mutex::new(best_move_rx),
        };
        engine.send_command("uci").await?;

        tracing::debug!(engine_id = %id, path = %path.display(), "engine spawned");
        Ok(engine)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Writes one command line to the engine. The line terminator is
    /// appended here; writes are serialized by the stdin mutex.
    pub async fn send_command(&self, line: &str) -> Result<(), EngineError> {
        let mut stdin = self.stdin.lock().await;
        tracing::trace!(engine_id = %self.id, "UCI >> {line}");
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(EngineError::Command)?;
        stdin.write_all(b"\n").await.map_err(EngineError::Command)?;
        stdin.flush().await.map_err(EngineError::Command)?;
        Ok(())
    }

    /// Receives the next `bestmove`. Returns `None` when the engine has
    /// exited and the slot is drained.
    pub async fn best_move(&self) -> Option<String> {
        self.best_move_rx.lock().await.recv().await
    }

    /// Signals the reader to quit, asks the engine to exit, and waits for
    /// the process to finish. The engine is never restarted.
    pub async fn close(&self) -> Result<(), EngineError> {
        let _ = self.quit_tx.send(true);
        // Best effort: a wedged engine will still be reaped by wait below.
        let _ = self.send_command("quit").await;
        let mut child = self.child.lock().await;
        child.wait().await.map_err(EngineError::Wait)?;
        tracing::debug!(engine_id = %self.id, "engine closed");
        Ok(())
    }
}

async fn read_loop(
    id: Uuid,
    stdout: ChildStdout,
    best_move_tx: mpsc::Sender<String>,
    mut quit_rx: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = tokio::select! {
            _ = quit_rx.changed() => return,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                tracing::trace!(engine_id = %id, "UCI << {line}");
                if line.starts_with("bestmove") {
                    if let Some(best) = line.split_whitespace().nth(1) {
                        // Single slot: an unconsumed previous bestmove wins.
                        let _ = best_move_tx.try_send(best.to_string());
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(engine_id = %id, "engine closed stdout");
                return;
            }
            Err(e) => {
                tracing::warn!(engine_id = %id, error = %e, "engine stdout read failed");
                return;
            }
        }
    }
}
