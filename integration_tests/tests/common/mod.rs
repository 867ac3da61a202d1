#![allow(dead_code)]

use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use console_proxy::{CommandData, CommandProxy, MemorySink, ProxyConfig, PROXY_CONFIG_ENV};
use console_runtime::Interpreter;

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_proxy_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test proxy config at {}",
            config_path.display()
        );

        std::env::set_var(PROXY_CONFIG_ENV, &config_path);
    });
}

pub fn test_proxy(console: Interpreter) -> (CommandProxy, MemorySink) {
    ensure_test_config();
    let config = ProxyConfig::from_env().expect("test proxy config should load");
    let sink = MemorySink::new();
    (CommandProxy::new(config, console).with_sink(sink.clone()), sink)
}

pub fn send(to: SocketAddr, frame: i32, command: &str) {
    send_raw(to, &CommandData::new(frame, command).encode());
}

pub fn send_raw(to: SocketAddr, bytes: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind sender socket");
    socket.send_to(bytes, to).expect("send datagram");
}

/// Polls `ready` until it holds or two seconds pass.
pub fn wait_until(mut ready: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if ready() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    ready()
}
