//! Remote command proxy for the console interpreter.
//!
//! A receiver thread reads `[i32 LE frame][UTF-8 command]` datagrams into a
//! shared queue; the simulation thread drains it once per logic frame with
//! [`CommandProxy::process_pending_commands`], running each command no
//! earlier than the frame it names.

mod command;
mod config;
mod network;
mod proxy;
mod queue;
mod sink;

pub use command::{CommandData, DecodeError, DEFAULT_COMMAND_PORT, FRAME_HEADER_LEN};
pub use config::{ProxyConfig, ProxyConfigError, BUILTIN_PROXY_CONFIG, PROXY_CONFIG_ENV};
pub use proxy::{CommandProxy, ProxyError, ProxyState};
pub use queue::{ProxyStats, QueueHandle};
pub use sink::{CommandReport, CommandSink, MemorySink, SinkEntry, TracingSink};
