use std::io;
use std::mem;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use console_runtime::{panic_message, Interpreter};
use thiserror::Error;
use tracing::{debug, info};

use crate::command::CommandData;
use crate::config::ProxyConfig;
use crate::network::{self, ReceiverThread};
use crate::queue::{ProxyStats, QueueHandle, SharedQueue};
use crate::sink::{CommandReport, CommandSink, TracingSink};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("command proxy is already listening on {0}")]
    AlreadyRunning(SocketAddr),
    #[error("failed to bind command socket at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to configure command socket: {0}")]
    Socket(#[source] io::Error),
    #[error("failed to spawn command receiver thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Stopped,
    Running,
}

/// Feeds commands from the network (or a [`QueueHandle`]) into an
/// [`Interpreter`] at the logic frame they name.
///
/// The proxy lives on the simulation thread; only the inbound queue is
/// shared with the receiver thread. Call
/// [`CommandProxy::process_pending_commands`] once per logic frame with a
/// non-decreasing frame number.
pub struct CommandProxy {
    config: ProxyConfig,
    interpreter: Interpreter,
    shared: Arc<SharedQueue>,
    pending: Vec<CommandData>,
    receiver: Option<ReceiverThread>,
    sink: Box<dyn CommandSink>,
}

impl CommandProxy {
    pub fn new(config: ProxyConfig, interpreter: Interpreter) -> Self {
        Self {
            config,
            interpreter,
            shared: Arc::new(SharedQueue::default()),
            pending: Vec::new(),
            receiver: None,
            sink: Box::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: impl CommandSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn state(&self) -> ProxyState {
        if self.receiver.is_some() {
            ProxyState::Running
        } else {
            ProxyState::Stopped
        }
    }

    /// Binds the command socket and spawns the receiver thread. Returns the
    /// bound address, which differs from the configured one for port 0.
    pub fn start(&mut self) -> Result<SocketAddr, ProxyError> {
        if let Some(receiver) = &self.receiver {
            return Err(ProxyError::AlreadyRunning(receiver.local_addr()));
        }
        let receiver = network::spawn_receiver(&self.config, Arc::clone(&self.shared))?;
        let addr = receiver.local_addr();
        self.receiver = Some(receiver);
        info!(target: "console::proxy", %addr, "proxy.state=running");
        Ok(addr)
    }

    /// Stops the receiver thread. Queued and parked commands are kept and
    /// still run on later drains.
    pub fn stop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            let addr = receiver.local_addr();
            receiver.stop(self.config.join_timeout());
            info!(target: "console::proxy", %addr, "proxy.state=stopped");
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().map(ReceiverThread::local_addr)
    }

    pub fn queue_handle(&self) -> QueueHandle {
        QueueHandle::new(Arc::clone(&self.shared))
    }

    pub fn enqueue(&self, target_frame: i32, command: impl Into<String>) -> bool {
        self.queue_handle().enqueue(target_frame, command)
    }

    /// Commands parked for a future frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> ProxyStats {
        self.shared.stats()
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn interpreter_mut(&mut self) -> &mut Interpreter {
        &mut self.interpreter
    }

    /// Drains the inbound queue, runs every command due at `current_frame`
    /// and parks the rest. Returns how many commands ran.
    pub fn process_pending_commands(&mut self, current_frame: i32) -> usize {
        let mut ran = 0;
        for command in self.shared.drain() {
            if command.is_due(current_frame) {
                self.run(command, current_frame);
                ran += 1;
            } else {
                debug!(
                    target: "console::proxy",
                    frame = current_frame,
                    target_frame = command.target_frame,
                    command = %command.command,
                    "command.parked"
                );
                self.pending.push(command);
            }
        }
        if self.pending.iter().any(|command| command.is_due(current_frame)) {
            let (due, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.pending)
                .into_iter()
                .partition(|command| command.is_due(current_frame));
            self.pending = waiting;
            for command in due {
                self.run(command, current_frame);
                ran += 1;
            }
        }
        ran
    }

    fn run(&mut self, command: CommandData, current_frame: i32) {
        let interpreter = &mut self.interpreter;
        let text = command.command.as_str();
        let (output, failed) =
            match panic::catch_unwind(AssertUnwindSafe(|| interpreter.execute_detailed(text))) {
                Ok(outcome) => (outcome.output, outcome.failed),
                Err(payload) => (
                    format!("command panicked: {}", panic_message(payload.as_ref())),
                    true,
                ),
            };
        self.shared.record_outcome(failed);
        let report = CommandReport {
            target_frame: command.target_frame,
            executed_frame: current_frame,
            command: command.command,
            output,
        };
        if failed {
            self.sink.on_error(&report);
        } else {
            self.sink.on_result(&report);
        }
    }
}

impl Drop for CommandProxy {
    fn drop(&mut self) {
        self.stop();
        if !self.pending.is_empty() {
            debug!(
                target: "console::proxy",
                discarded = self.pending.len(),
                "pending commands dropped with proxy"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SinkEntry};

    fn proxy() -> (CommandProxy, MemorySink) {
        let sink = MemorySink::new();
        let proxy =
            CommandProxy::new(ProxyConfig::default(), Interpreter::new()).with_sink(sink.clone());
        (proxy, sink)
    }

    #[test]
    fn immediate_commands_run_on_the_next_drain() {
        let (mut proxy, sink) = proxy();
        proxy.enqueue(0, "x = 2");
        proxy.enqueue(-5, "x * 10");
        assert_eq!(proxy.process_pending_commands(1), 2);
        assert_eq!(sink.outputs(), vec!["x = 2".to_string(), "20".to_string()]);
        assert_eq!(proxy.process_pending_commands(2), 0);
    }

    #[test]
    fn future_commands_wait_for_their_frame() {
        let (mut proxy, sink) = proxy();
        proxy.enqueue(10, "late = 1");
        proxy.enqueue(12, "later = 2");
        assert_eq!(proxy.process_pending_commands(9), 0);
        assert_eq!(proxy.pending_len(), 2);
        assert!(proxy.interpreter().variable("late").is_none());

        assert_eq!(proxy.process_pending_commands(11), 1);
        assert!(proxy.interpreter().variable("late").is_some());
        assert_eq!(proxy.pending_len(), 1);

        assert_eq!(proxy.process_pending_commands(20), 1);
        assert_eq!(proxy.process_pending_commands(21), 0);
        let reports: Vec<_> = sink.entries().iter().map(|e| e.report().clone()).collect();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].executed_frame, 11);
        assert_eq!(reports[1].target_frame, 12);
        assert_eq!(reports[1].executed_frame, 20);
    }

    #[test]
    fn failures_reach_the_error_sink_and_the_tick_continues() {
        let (mut proxy, sink) = proxy();
        proxy
            .interpreter_mut()
            .register_preset_func("explode", vec![], |_call| panic!("kaboom"));
        proxy.enqueue(0, "1 / 0");
        proxy.enqueue(0, "explode()");
        proxy.enqueue(0, "y = 4");
        assert_eq!(proxy.process_pending_commands(1), 3);

        let entries = sink.entries();
        assert!(matches!(&entries[0], SinkEntry::Error(r) if r.output == "error[DivideByZero]: division by zero"));
        assert!(entries[1].is_error());
        assert!(entries[1].report().output.contains("kaboom"));
        assert_eq!(entries[2], SinkEntry::Result(CommandReport {
            target_frame: 0,
            executed_frame: 1,
            command: "y = 4".to_string(),
            output: "y = 4".to_string(),
        }));
        let stats = proxy.stats();
        assert_eq!((stats.received, stats.executed, stats.failed), (3, 1, 2));
    }

    #[test]
    fn start_twice_is_rejected() {
        let config = ProxyConfig::default().with_bind("127.0.0.1:0".parse().unwrap());
        let mut proxy = CommandProxy::new(config, Interpreter::new());
        assert_eq!(proxy.state(), ProxyState::Stopped);
        let addr = proxy.start().unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(proxy.local_addr(), Some(addr));
        assert!(matches!(proxy.start(), Err(ProxyError::AlreadyRunning(a)) if a == addr));
        proxy.stop();
        assert_eq!(proxy.state(), ProxyState::Stopped);
        assert_eq!(proxy.local_addr(), None);
        proxy.start().unwrap();
        assert_eq!(proxy.state(), ProxyState::Running);
    }
}
