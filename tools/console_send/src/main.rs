use std::{
    io::{self, BufRead},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use console_proxy::{CommandData, DEFAULT_COMMAND_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Send console commands to a running command proxy", long_about = None)]
struct Args {
    /// Proxy address
    #[arg(long, default_value_t = SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_COMMAND_PORT)))]
    addr: SocketAddr,

    /// Logic frame to run the command on (0 or less runs on the next frame)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    frame: i32,

    /// Read one command per line from stdin instead of the positional command
    #[arg(long)]
    stdin: bool,

    /// Command text; words are joined with spaces
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let commands = if args.stdin {
        io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<Vec<_>>>()
            .context("Failed to read commands from stdin")?
    } else {
        vec![args.command.join(" ")]
    };
    let commands: Vec<&str> = commands
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();
    if commands.is_empty() {
        bail!("No command given");
    }

    let local = match args.addr {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    let socket = UdpSocket::bind(local).context("Failed to bind sender socket")?;

    for command in commands {
        let datagram = CommandData::new(args.frame, command).encode();
        socket
            .send_to(&datagram, args.addr)
            .with_context(|| format!("Failed to send command to {}", args.addr))?;
        println!("frame {} -> {}: {}", args.frame, args.addr, command);
    }
    Ok(())
}
