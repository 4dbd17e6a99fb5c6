//! Operator console.
//!
//! # Responsibilities
//! - Deliver command lines to the engine
//! - Carry prompts and reports back to the operator
//!
//! # Design Decisions
//! - Stdin is read on a dedicated thread so a pending read never holds up
//!   runtime shutdown
//! - The engine only sees channels; tests drive it with `Operator::channel`

use std::io::{self, BufRead};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Engine side of the operator console.
#[derive(Debug)]
pub struct Operator {
    commands: mpsc::Receiver<String>,
    output: mpsc::UnboundedSender<String>,
}

impl Operator {
    /// Console bound to the process stdin and stdout.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn console() -> io::Result<Self> {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (output_tx, mut output_rx) = mpsc::unbounded_channel::<String>();

        std::thread::Builder::new()
            .name("operator-input".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if commands_tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Operator input failed");
                            break;
                        }
                    }
                }
                tracing::debug!("Operator input closed");
            })?;

        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(text) = output_rx.recv().await {
                if stdout.write_all(text.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            commands: commands_rx,
            output: output_tx,
        })
    }

    /// In-memory console. The handle plays the operator.
    pub fn channel(capacity: usize) -> (Self, OperatorHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(capacity);
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        (
            Self {
                commands: commands_rx,
                output: output_tx,
            },
            OperatorHandle {
                commands: commands_tx,
                output: output_rx,
                seen: String::new(),
            },
        )
    }

    /// Next command line, or `None` once input is closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.commands.recv().await
    }

    /// Print one line.
    pub fn say(&self, message: impl std::fmt::Display) {
        let _ = self.output.send(format!("{message}\n"));
    }

    pub fn prompt(&self) {
        let _ = self.output.send("> ".to_string());
    }
}

/// Operator side of an in-memory console.
#[derive(Debug)]
pub struct OperatorHandle {
    commands: mpsc::Sender<String>,
    output: mpsc::UnboundedReceiver<String>,
    seen: String,
}

impl OperatorHandle {
    /// Type a command line.
    pub async fn send(&self, line: &str) {
        let _ = self.commands.send(line.to_string()).await;
    }

    /// Collect console output until `needle` appears. Returns everything
    /// up to and including it, or `None` if the console closed first.
    ///
    /// Output after the match is kept for the next call.
    pub async fn read_until(&mut self, needle: &str) -> Option<String> {
        loop {
            if let Some(at) = self.seen.find(needle) {
                let rest = self.seen.split_off(at + needle.len());
                return Some(std::mem::replace(&mut self.seen, rest));
            }
            let chunk = self.output.recv().await?;
            self.seen.push_str(&chunk);
        }
    }

    /// Stop typing; the engine sees end of input.
    pub fn close_input(self) -> mpsc::UnboundedReceiver<String> {
        self.output
    }
}
