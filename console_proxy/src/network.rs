use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use crate::command::{CommandData, DecodeError};
use crate::config::ProxyConfig;
use crate::proxy::ProxyError;
use crate::queue::SharedQueue;

/// The background thread reading command datagrams into the shared queue.
pub(crate) struct ReceiverThread {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

pub(crate) fn spawn_receiver(
    config: &ProxyConfig,
    queue: Arc<SharedQueue>,
) -> Result<ReceiverThread, ProxyError> {
    let addr = config.bind();
    let socket = UdpSocket::bind(addr).map_err(|source| ProxyError::Bind { addr, source })?;
    socket
        .set_read_timeout(Some(config.read_timeout()))
        .map_err(ProxyError::Socket)?;
    let local_addr = socket.local_addr().map_err(ProxyError::Socket)?;

    let running = Arc::new(AtomicBool::new(true));
    let (done_tx, done_rx) = bounded::<()>(1);
    let thread_running = Arc::clone(&running);
    let max_datagram = config.max_datagram_bytes();
    let backoff = config.read_timeout();
    let thread = thread::Builder::new()
        .name("console-proxy-rx".to_string())
        .spawn(move || {
            receive_loop(&socket, &thread_running, &queue, max_datagram, backoff);
            let _ = done_tx.send(());
        })
        .map_err(ProxyError::Spawn)?;

    info!(target: "console::proxy", %local_addr, "proxy.receiver=started");
    Ok(ReceiverThread {
        local_addr,
        running,
        done: done_rx,
        thread: Some(thread),
    })
}

fn receive_loop(
    socket: &UdpSocket,
    running: &AtomicBool,
    queue: &SharedQueue,
    max_datagram: usize,
    backoff: Duration,
) {
    let mut buffer = vec![0u8; max_datagram + 1];
    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buffer) {
            Ok((len, peer)) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                accept_datagram(&buffer[..len], max_datagram, peer, queue);
            }
            Err(ref err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) => {}
            Err(err) => {
                if !running.load(Ordering::Acquire) {
                    debug!(target: "console::proxy", %err, "receive interrupted by shutdown");
                    break;
                }
                error!(target: "console::proxy", %err, "proxy.receiver=recv_failed");
                thread::sleep(backoff);
            }
        }
    }
    debug!(target: "console::proxy", "proxy.receiver=exited");
}

fn accept_datagram(bytes: &[u8], max_datagram: usize, peer: SocketAddr, queue: &SharedQueue) {
    match CommandData::decode_bounded(bytes, max_datagram) {
        Ok(command) => {
            debug!(
                target: "console::proxy",
                %peer,
                frame = command.target_frame,
                command = %command.command,
                "command.received"
            );
            queue.push(command);
        }
        Err(DecodeError::Empty) => queue.record_rejected(),
        Err(err) => {
            queue.record_rejected();
            warn!(target: "console::proxy", %peer, %err, "command.rejected");
        }
    }
}

impl ReceiverThread {
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Clears the running flag, wakes the blocked receive and waits up to
    /// `join_timeout` for the thread. A thread that does not finish in time
    /// is left detached.
    pub(crate) fn stop(mut self, join_timeout: Duration) {
        self.running.store(false, Ordering::Release);
        wake(self.local_addr);
        match self.done.recv_timeout(join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        warn!(target: "console::proxy", "proxy.receiver=panicked");
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    target: "console::proxy",
                    timeout_ms = join_timeout.as_millis() as u64,
                    "proxy.receiver=join_timeout"
                );
            }
        }
    }
}

/// Sends an empty datagram to the receiver so it returns from `recv_from`
/// without waiting out its read timeout.
fn wake(addr: SocketAddr) {
    let target = if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port())),
            SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::LOCALHOST, addr.port())),
        }
    } else {
        addr
    };
    let local = match target {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    match UdpSocket::bind(local).and_then(|socket| socket.send_to(&[], target)) {
        Ok(_) => {}
        Err(err) => debug!(target: "console::proxy", %err, "wake datagram not sent"),
    }
}
