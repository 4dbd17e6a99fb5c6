//! Interception engine.
//!
//! # Responsibilities
//! - Consume decoded client records in order
//! - Auto-forward records that do not hit a breakpoint
//! - Pause on breakpoints and interrupts and run operator commands
//! - Publish the default route to the backend relay
//!
//! # Design Decisions
//! - Sole owner of the route table and breakpoint set; nothing is shared
//! - Command errors are reported and never leave the pause
//! - Routes are closed when the engine exits

use tokio::sync::{mpsc, watch};

use crate::codec::Record;
use crate::config::RouteConfig;
use crate::intercept::breakpoints::BreakpointSet;
use crate::intercept::command::{Command, CommandError, RouteTarget};
use crate::intercept::operator::Operator;
use crate::observability::metrics;
use crate::routing::{EndPoint, RouteHandle, RouteTable};

/// Why the engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    /// Operator typed `q`.
    Quit,
    /// Operator input reached end of stream.
    InputClosed,
    /// Both the record queue and the interrupt queue closed.
    SourcesClosed,
}

/// What a command does to the pause.
enum Step {
    Stay,
    Resume,
    Quit,
}

/// How a pause ended.
enum PauseEnd {
    Resume,
    Exit(EngineExit),
}

/// Event loop over client records and interrupts.
pub struct InterceptionEngine {
    table: RouteTable,
    breakpoints: BreakpointSet,
    operator: Operator,
    default_route: watch::Sender<Option<RouteHandle>>,
}

impl InterceptionEngine {
    pub fn new(table: RouteTable, breakpoints: BreakpointSet, operator: Operator) -> Self {
        let (default_route, _) = watch::channel(None);
        Self {
            table,
            breakpoints,
            operator,
            default_route,
        }
    }

    /// Follow the default route as it changes.
    pub fn default_route_watch(&self) -> watch::Receiver<Option<RouteHandle>> {
        self.default_route.subscribe()
    }

    /// Add configured routes in order. Failures are logged and skipped.
    pub async fn add_initial_routes(&mut self, routes: &[RouteConfig]) {
        for route in routes {
            let target = RouteTarget {
                host: route.host.clone(),
                port: route.port,
            };
            match self.add_route(&target).await {
                Ok(endpoint) => {
                    tracing::info!(route = %target, endpoint = %endpoint, "Configured route added");
                }
                Err(e) => {
                    tracing::warn!(route = %target, error = %e, "Configured route skipped");
                }
            }
        }
    }

    pub fn breakpoints(&self) -> &BreakpointSet {
        &self.breakpoints
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    /// Run until the operator quits or every input source closes.
    pub async fn run(
        mut self,
        mut records: mpsc::Receiver<Record>,
        mut interrupts: mpsc::Receiver<()>,
    ) -> EngineExit {
        let mut records_open = true;
        let mut interrupts_open = true;

        let exit = loop {
            if !records_open && !interrupts_open {
                break EngineExit::SourcesClosed;
            }

            let pause = tokio::select! {
                record = records.recv(), if records_open => match record {
                    Some(record) => match self.on_record(record).await {
                        Some(record) => Some(record),
                        None => continue,
                    },
                    None => {
                        tracing::debug!("Record queue closed");
                        records_open = false;
                        continue;
                    }
                },
                interrupt = interrupts.recv(), if interrupts_open => match interrupt {
                    Some(()) => {
                        tracing::info!("Interrupt received, pausing");
                        self.operator.say("Receive SIGINT.");
                        None
                    }
                    None => {
                        interrupts_open = false;
                        continue;
                    }
                },
            };

            if let PauseEnd::Exit(exit) = self.pause(pause).await {
                break exit;
            }
        };

        tracing::info!(reason = ?exit, "Interception engine stopping");
        self.table.close_all();
        self.publish_default();
        exit
    }

    /// Auto-forward `record`, or hand it back if it hits a breakpoint.
    async fn on_record(&mut self, record: Record) -> Option<Record> {
        if self.breakpoints.contains(record.record_type) {
            let remote = record
                .remote
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "unknown".into());
            self.operator.say(format_args!(
                "Receive a new block from {}, Type: {}, Length: {}",
                remote, record.record_type, record.length
            ));
            return Some(record);
        }

        match self.table.default_route() {
            Some(route) => match route.write_all(&record.encode()).await {
                Ok(()) => metrics::record_forwarded("auto"),
                Err(e) => {
                    tracing::warn!(
                        endpoint = %route.endpoint(),
                        record_type = %record.record_type,
                        error = %e,
                        "Auto-forward failed, record dropped"
                    );
                    metrics::record_dropped("route_unavailable");
                }
            },
            None => {
                tracing::debug!(record_type = %record.record_type, "No default route, record dropped");
                metrics::record_dropped("no_default_route");
            }
        }
        None
    }

    /// Prompt for commands until one resumes or ends the engine.
    async fn pause(&mut self, mut current: Option<Record>) -> PauseEnd {
        loop {
            self.operator.prompt();
            let Some(line) = self.operator.next_line().await else {
                tracing::info!("Operator input closed");
                return PauseEnd::Exit(EngineExit::InputClosed);
            };

            let step = match line.parse::<Command>() {
                Ok(command) => self.execute(command, &mut current).await,
                Err(e) => Err(e),
            };

            match step {
                Ok(Step::Stay) => {}
                Ok(Step::Resume) => return PauseEnd::Resume,
                Ok(Step::Quit) => return PauseEnd::Exit(EngineExit::Quit),
                Err(e) => {
                    tracing::debug!(command = %line.trim(), error = %e, "Command failed");
                    self.operator.say(e);
                }
            }
        }
    }

    async fn execute(&mut self, command: Command, current: &mut Option<Record>) -> Result<Step, CommandError> {
        match command {
            Command::Break(record_type) => {
                let set = self.breakpoints.toggle(record_type);
                let verb = if set { "set" } else { "removed" };
                self.operator.say(format_args!("Breakpoint on {record_type} {verb}"));
                Ok(Step::Stay)
            }
            Command::AddRoute(target) => {
                self.add_route(&target).await?;
                self.operator.say("Route added");
                Ok(Step::Stay)
            }
            Command::RemoveRoute(target) => {
                let endpoint = target.resolve().await?;
                self.table.remove(&endpoint)?;
                self.publish_default();
                self.operator.say("Route removed");
                Ok(Step::Stay)
            }
            Command::ListRoutes => {
                let mut routes = self.table.list();
                if routes.is_empty() {
                    self.operator.say("No routes");
                }
                routes.sort();
                for (endpoint, is_default) in routes {
                    let marker = if is_default { " <== default" } else { "" };
                    self.operator
                        .say(format_args!("{} {}{}", endpoint.ip(), endpoint.port(), marker));
                }
                Ok(Step::Stay)
            }
            Command::SetDefault(target) => {
                let endpoint = target.resolve().await?;
                self.table.set_default(&endpoint)?;
                self.publish_default();
                self.operator.say("Default route set");
                Ok(Step::Stay)
            }
            Command::Forward => {
                let record = current.as_ref().ok_or(CommandError::NoRecord)?;
                let route = self.table.default_route().ok_or(CommandError::NoDefaultRoute)?;
                route.write_all(&record.encode()).await?;
                metrics::record_forwarded("operator");
                *current = None;
                Ok(Step::Resume)
            }
            Command::Drop => {
                if current.take().is_some() {
                    metrics::record_dropped("operator");
                }
                Ok(Step::Resume)
            }
            Command::Continue => {
                if current.take().is_some() {
                    metrics::record_dropped("continued");
                }
                Ok(Step::Resume)
            }
            Command::Quit => Ok(Step::Quit),
        }
    }

    async fn add_route(&mut self, target: &RouteTarget) -> Result<EndPoint, CommandError> {
        let endpoint = target.resolve().await?;
        self.table.add(endpoint).await?;
        self.publish_default();
        Ok(endpoint)
    }

    /// Tell the relay about the current default, if it changed.
    fn publish_default(&self) {
        let route = self.table.default_route().cloned();
        self.default_route.send_if_modified(|published| {
            let changed = match (published.as_ref(), route.as_ref()) {
                (Some(old), Some(new)) => !old.same_route(new),
                (None, None) => false,
                _ => true,
            };
            if changed {
                *published = route;
            }
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordType;
    use crate::intercept::operator::OperatorHandle;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        operator: OperatorHandle,
        records: mpsc::Sender<Record>,
        interrupts: mpsc::Sender<()>,
        default_route: watch::Receiver<Option<RouteHandle>>,
        engine: tokio::task::JoinHandle<EngineExit>,
    }

    fn start(table: RouteTable) -> Harness {
        let (operator, handle) = Operator::channel(8);
        let engine = InterceptionEngine::new(table, BreakpointSet::default(), operator);
        let default_route = engine.default_route_watch();
        let (records_tx, records_rx) = mpsc::channel(8);
        let (interrupts_tx, interrupts_rx) = mpsc::channel(1);
        Harness {
            operator: handle,
            records: records_tx,
            interrupts: interrupts_tx,
            default_route,
            engine: tokio::spawn(engine.run(records_rx, interrupts_rx)),
        }
    }

    async fn expect(handle: &mut OperatorHandle, needle: &str) -> String {
        tokio::time::timeout(WAIT, handle.read_until(needle))
            .await
            .expect("timed out waiting for output")
            .expect("console closed")
    }

    #[tokio::test]
    async fn quit_ends_the_engine() {
        let mut h = start(RouteTable::new(1));
        h.interrupts.send(()).await.unwrap();
        expect(&mut h.operator, "Receive SIGINT.").await;
        expect(&mut h.operator, "> ").await;
        h.operator.send("q").await;
        assert_eq!(h.engine.await.unwrap(), EngineExit::Quit);
    }

    #[tokio::test]
    async fn forward_without_record_stays_paused() {
        let mut h = start(RouteTable::new(1));
        h.interrupts.send(()).await.unwrap();
        expect(&mut h.operator, "> ").await;

        h.operator.send("f").await;
        expect(&mut h.operator, "No record").await;
        expect(&mut h.operator, "> ").await;

        h.operator.send("nonsense").await;
        expect(&mut h.operator, "Wrong syntax").await;
        expect(&mut h.operator, "> ").await;

        h.operator.send("c").await;
        drop(h.records);
        drop(h.interrupts);
        assert_eq!(h.engine.await.unwrap(), EngineExit::SourcesClosed);
    }

    #[tokio::test]
    async fn end_of_input_ends_the_engine() {
        let h = start(RouteTable::new(1));
        h.interrupts.send(()).await.unwrap();
        let _output = h.operator.close_input();
        assert_eq!(h.engine.await.unwrap(), EngineExit::InputClosed);
    }

    #[tokio::test]
    async fn breakpoint_pause_forwards_on_request() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = backend.local_addr().unwrap().port();
        let mut table = RouteTable::new(1);
        table.add(EndPoint::new([127, 0, 0, 1].into(), port)).await.unwrap();
        let (mut upstream, _) = backend.accept().await.unwrap();

        let mut h = start(table);
        let remote = "127.0.0.1:40000".parse().unwrap();
        let record = Record::new(RecordType::ApplicationData, [3, 3], &b"secret"[..]).with_remote(remote);
        h.records.send(record.clone()).await.unwrap();

        let report = expect(&mut h.operator, "Length: 6").await;
        assert!(report.contains("Receive a new block from 127.0.0.1:40000"));
        expect(&mut h.operator, "> ").await;

        h.operator.send("f").await;
        let mut buf = vec![0u8; record.encoded_len()];
        tokio::time::timeout(WAIT, upstream.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf, record.encode());
        drop(h.records);
        drop(h.interrupts);
        assert_eq!(h.engine.await.unwrap(), EngineExit::SourcesClosed);
    }

    #[tokio::test]
    async fn default_route_is_published() {
        let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = backend.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = backend.accept().await {
                held.push(stream);
            }
        });

        let mut h = start(RouteTable::new(1));
        h.interrupts.send(()).await.unwrap();
        expect(&mut h.operator, "> ").await;

        h.operator.send(&format!("a 127.0.0.1 {port}")).await;
        expect(&mut h.operator, "Route added").await;
        let published = h.default_route.borrow_and_update().clone().unwrap();
        assert_eq!(published.endpoint().port(), port);

        h.operator.send(&format!("r 127.0.0.1 {port}")).await;
        expect(&mut h.operator, "Route removed").await;
        assert!(h.default_route.borrow().is_none());

        h.operator.send("q").await;
        assert_eq!(h.engine.await.unwrap(), EngineExit::Quit);
    }
}
