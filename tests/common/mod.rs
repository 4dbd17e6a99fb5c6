//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use record_interceptor::config::{ProxyConfig, RouteConfig};
use record_interceptor::intercept::{EngineExit, Operator, OperatorHandle};
use record_interceptor::lifecycle::{self, Shutdown};

pub const WAIT: Duration = Duration::from_secs(5);

/// Start a mock backend that reports every byte it receives.
#[allow(dead_code)]
pub async fn start_capture_backend() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Start a mock backend that writes back whatever it reads.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Collect exactly `len` captured bytes.
#[allow(dead_code)]
pub async fn captured(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < len {
        let chunk = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for backend bytes")
            .expect("backend closed");
        out.extend_from_slice(&chunk);
    }
    out
}

/// A running interceptor driven through an in-memory operator console.
pub struct Interceptor {
    pub addr: SocketAddr,
    pub operator: OperatorHandle,
    pub interrupts: mpsc::Sender<()>,
    pub shutdown: Shutdown,
    pub engine: JoinHandle<EngineExit>,
}

impl Interceptor {
    /// Wait for console output containing `needle`.
    #[allow(dead_code)]
    pub async fn expect(&mut self, needle: &str) -> String {
        tokio::time::timeout(WAIT, self.operator.read_until(needle))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {needle:?}"))
            .expect("console closed")
    }

    /// Type a command and wait for the next prompt. Returns the output.
    #[allow(dead_code)]
    pub async fn command(&mut self, line: &str) -> String {
        self.operator.send(line).await;
        self.expect("> ").await
    }

    /// Pause the engine as Ctrl-C would, and wait for the prompt.
    #[allow(dead_code)]
    pub async fn interrupt(&mut self) {
        self.interrupts.send(()).await.unwrap();
        self.expect("Receive SIGINT.").await;
        self.expect("> ").await;
    }
}

/// Start an interceptor on an ephemeral port with `routes` configured.
pub async fn start_interceptor(routes: &[SocketAddr]) -> Interceptor {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.routes.initial = routes
        .iter()
        .map(|addr| RouteConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
        })
        .collect();

    let shutdown = Shutdown::new();
    let (operator, handle) = Operator::channel(8);
    let startup = lifecycle::start(&config, operator, &shutdown).await.unwrap();
    let addr = startup.local_addr();

    let (interrupts_tx, interrupts_rx) = mpsc::channel(1);
    let engine = tokio::spawn(startup.run(interrupts_rx));

    Interceptor {
        addr,
        operator: handle,
        interrupts: interrupts_tx,
        shutdown,
        engine,
    }
}
