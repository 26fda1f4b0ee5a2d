use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use linekv::server::Server;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

async fn start_server() -> Result<(SocketAddr, oneshot::Sender<()>, JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = Server::new(listener);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = server.run_until(shutdown).await;
    });

    Ok((addr, shutdown_tx, handle))
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Session {
    async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads one reply line, `None` when the server closed the connection.
    async fn read_reply(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let bytes = timeout(READ_TIMEOUT, self.reader.read_line(&mut line)).await??;
        if bytes == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    async fn request(&mut self, line: &str) -> Result<String> {
        self.send(line).await?;
        self.read_reply()
            .await?
            .context("connection closed before reply")
    }
}

#[tokio::test]
async fn absent_keys_read_empty_and_delete_zero() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let mut session = Session::connect(addr).await?;

    assert_eq!(session.request("GET never-set").await?, "");
    assert_eq!(session.request("DEL never-set").await?, "0");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn set_get_del_roundtrip() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let mut session = Session::connect(addr).await?;

    assert_eq!(session.request("SET greeting hello world").await?, "OK");
    assert_eq!(session.request("GET greeting").await?, "hello world");
    assert_eq!(session.request("DEL greeting").await?, "1");
    assert_eq!(session.request("GET greeting").await?, "");
    assert_eq!(session.request("DEL greeting").await?, "0");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn counters_and_their_error_lines() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let mut session = Session::connect(addr).await?;

    assert_eq!(session.request("INCR ups").await?, "1");
    assert_eq!(session.request("DECR downs").await?, "-1");

    assert_eq!(session.request("SET counter 5").await?, "OK");
    assert_eq!(session.request("INCR counter 3").await?, "8");
    assert_eq!(session.request("DECR counter 10").await?, "-2");

    assert_eq!(session.request("SET greeting abc").await?, "OK");
    assert_eq!(
        session.request("INCR greeting").await?,
        "Error: key 'greeting' value is not an integer or out of range"
    );
    assert_eq!(session.request("GET greeting").await?, "abc");

    assert_eq!(
        session.request("INCR counter five").await?,
        "Error: provided value 'five' is not an integer or out of range"
    );
    assert_eq!(session.request("GET counter").await?, "-2");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn validation_failures_keep_the_connection_open() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let mut session = Session::connect(addr).await?;

    assert_eq!(
        session.request("FOO bar").await?,
        "Error: Invalid command: FOO bar"
    );
    assert_eq!(session.request("GET").await?, "Missing key param");
    assert_eq!(session.request("SET greeting").await?, "Missing value param");
    assert_eq!(session.request("SET").await?, "Missing key and value param");

    // The same connection still serves valid requests, and the rejected
    // lines never altered any key.
    assert_eq!(session.request("GET bar").await?, "");
    assert_eq!(session.request("GET greeting").await?, "");
    assert_eq!(session.request("SET greeting hi").await?, "OK");
    assert_eq!(session.request("GET greeting").await?, "hi");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn stop_closes_the_connection_without_a_reply() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let mut session = Session::connect(addr).await?;

    assert_eq!(session.request("SET greeting hi").await?, "OK");
    session.send("STOP").await?;
    assert_eq!(session.read_reply().await?, None);

    // Other connections are unaffected and see the same store.
    let mut other = Session::connect(addr).await?;
    assert_eq!(other.request("GET greeting").await?, "hi");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn connections_on_disjoint_keys_do_not_interfere() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;
    let mut alice = Session::connect(addr).await?;
    let mut bob = Session::connect(addr).await?;

    assert_eq!(alice.request("SET alpha one").await?, "OK");
    assert_eq!(bob.request("SET beta two").await?, "OK");
    assert_eq!(alice.request("SET alpha three").await?, "OK");
    assert_eq!(bob.request("SET beta four").await?, "OK");

    assert_eq!(alice.request("GET alpha").await?, "three");
    assert_eq!(alice.request("GET beta").await?, "four");
    assert_eq!(bob.request("GET alpha").await?, "three");
    assert_eq!(bob.request("GET beta").await?, "four");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn concurrent_increments_are_fully_serialized() -> Result<()> {
    const WORKERS: usize = 4;
    const INCREMENTS: usize = 25;

    let (addr, shutdown_tx, server) = start_server().await?;

    let mut workers = Vec::new();
    for _ in 0..WORKERS {
        workers.push(tokio::spawn(async move {
            let mut session = Session::connect(addr).await?;
            for _ in 0..INCREMENTS {
                let reply = session.request("INCR shared").await?;
                // Every reply is some intermediate count, never an error.
                reply.parse::<i64>()?;
            }
            anyhow::Ok(())
        }));
    }
    for worker in workers {
        worker.await??;
    }

    let mut session = Session::connect(addr).await?;
    let expected = (WORKERS * INCREMENTS).to_string();
    assert_eq!(session.request("GET shared").await?, expected);

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}

#[tokio::test]
async fn dropping_a_connection_leaves_the_store_serving_others() -> Result<()> {
    let (addr, shutdown_tx, server) = start_server().await?;

    {
        let mut doomed = Session::connect(addr).await?;
        assert_eq!(doomed.request("SET survivor yes").await?, "OK");
        // Dropped without STOP; the handler observes end-of-stream.
    }

    let mut session = Session::connect(addr).await?;
    assert_eq!(session.request("GET survivor").await?, "yes");

    let _ = shutdown_tx.send(());
    let _ = server.await;
    Ok(())
}
