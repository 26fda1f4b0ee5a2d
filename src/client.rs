use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    select,
};
use tracing::{info, warn};

use crate::cli::ClientArgs;

/// Interactive console client: forwards stdin lines to the server and prints
/// each reply line to stdout.
pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!("connected to {}", args.server);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    let mut reply = String::new();

    run_client_loop(&mut reader, &mut writer, &mut stdin, &mut input, &mut reply).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn run_client_loop(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut BufReader<io::Stdin>,
    input: &mut String,
    reply: &mut String,
) -> Result<()> {
    loop {
        input.clear();
        reply.clear();
        select! {
            bytes_read = reader.read_line(reply) => {
                if !handle_server_reply(bytes_read?, reply).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(input) => {
                if !handle_stdin_input(bytes_read?, input, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_reply(bytes_read: usize, reply: &str) -> Result<bool> {
    if bytes_read == 0 {
        write_stdout("*** server closed the connection").await?;
        return Ok(false);
    }
    write_stdout(reply.trim_end_matches(['\r', '\n'])).await?;
    Ok(true)
}

async fn handle_stdin_input(
    bytes_read: usize,
    input: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    if bytes_read == 0 {
        return Ok(false);
    }

    let line = input.trim_end();
    if line.is_empty() {
        return Ok(true);
    }

    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
