use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    codec::DEFAULT_MAX_FRAME_LEN,
    config::{DEFAULT_OUTBOUND_CAPACITY, RelayConfig},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay, accepting TCP connections.
    Relay(RelayArgs),
    /// Register with a relay and send raw protocol lines from stdin.
    Client(ClientArgs),
    /// Start a relay plus simulated users that greet random peers.
    Demo(DemoArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RelayArgs {
    /// Socket address the relay should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// Longest accepted frame in bytes, excluding the newline.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame_len: usize,

    /// Frames queued per connection before relayed chats are dropped.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,

    /// Close connections that send nothing for this many seconds.
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,
}

impl RelayArgs {
    pub fn config(&self) -> RelayConfig {
        RelayConfig {
            max_frame_len: self.max_frame_len,
            outbound_capacity: self.outbound_capacity,
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Name to register with the relay.
    #[arg(long)]
    pub name: String,

    /// Address of the relay to connect to.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct DemoArgs {
    /// Comma-separated names of the simulated users.
    #[arg(long, value_delimiter = ',', default_value = "A,B,C")]
    pub users: Vec<String>,

    /// How long to run before exiting.
    #[arg(long, default_value_t = 30)]
    pub duration_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_args_build_config() {
        let cli = Cli::parse_from([
            "simple_chat_relay",
            "relay",
            "--listen",
            "127.0.0.1:0",
            "--idle-timeout-secs",
            "30",
        ]);
        let Command::Relay(args) = cli.command else {
            panic!("expected relay subcommand");
        };
        let config = args.config();
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
        assert_eq!(config.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn demo_users_are_comma_separated() {
        let cli = Cli::parse_from(["simple_chat_relay", "demo", "--users", "x,y"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo subcommand");
        };
        assert_eq!(args.users, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(args.duration_secs, 30);
    }
}
