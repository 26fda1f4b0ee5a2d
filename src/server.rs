use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    command::{self, Parsed},
    store::StoreHandle,
};

pub struct Server {
    listener: TcpListener,
    store: StoreHandle,
}

impl Server {
    /// Wraps a bound listener and spawns the store task the connection
    /// handlers will share.
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            store: StoreHandle::spawn(),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the shutdown future resolves, spawning one
    /// handler task per connection. Individual connections never block the
    /// accept loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, store } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &store);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, store: &StoreHandle) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, store),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, store: &StoreHandle) {
    let store = store.clone();
    tokio::spawn(async move {
        debug!(peer = %peer, "connection opened");
        match handle_connection(stream, store).await {
            Ok(Disconnect::Stopped) => info!(peer = %peer, "connection closed by STOP"),
            Ok(Disconnect::EndOfStream) => info!(peer = %peer, "connection closed, no further input"),
            Err(err) => warn!(peer = %peer, error = ?err, "connection closed with error"),
        }
    });
}

/// How a connection handler ended without a fault.
enum Disconnect {
    /// The client sent STOP; the connection closes with no reply.
    Stopped,
    /// The peer closed its write side or sent no further input.
    EndOfStream,
}

/// Runs the request/response loop for one connection.
///
/// One line in, one line out, strictly one request in flight. Validation
/// failures are answered locally without contacting the store. The stream is
/// dropped on every exit path, which closes the connection.
async fn handle_connection(stream: TcpStream, store: StoreHandle) -> Result<Disconnect> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(Disconnect::EndOfStream);
        }

        let reply = match command::parse(&line) {
            Ok(Parsed::Stop) => return Ok(Disconnect::Stopped),
            Ok(Parsed::Op(op)) => store.apply(op).await?,
            Err(err) => err.to_string(),
        };
        write_line(&mut writer, &reply).await?;
    }
}

async fn write_line<W>(writer: &mut W, reply: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(reply.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
