use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_PORT: u16 = 9669;

const PORT_ENV: &str = "PORT";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the key-value server, accepting TCP connections.
    Server(ServerArgs),
    /// Connect to a server and issue commands interactively.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// TCP port to listen on. Falls back to the PORT environment variable,
    /// then 9669. Use 0 for an ephemeral port.
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServerArgs {
    /// The flag wins over the PORT environment variable, which wins over the
    /// default.
    pub fn resolve_port(&self) -> u16 {
        self.port
            .or_else(|| std::env::var(PORT_ENV).ok().and_then(|raw| raw.parse().ok()))
            .unwrap_or(DEFAULT_PORT)
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the server to connect to.
    #[arg(long, default_value = "127.0.0.1:9669")]
    pub server: SocketAddr,
}
