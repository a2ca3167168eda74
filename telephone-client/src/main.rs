//! Telephone Client
//!
//! Connects to a telephone server and drives it from the terminal.

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use telephone::network::protocol::{FrameBuffer, Response, MAX_FRAME_LEN};
use telephone_client::{parse, render, ClientState, Command, CommandError, HELP};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host
    #[arg(default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(default_value = "8080")]
    port: u16,

    /// Exclusive limit on one contribution, in bytes
    #[arg(long, default_value = "30")]
    max_phrase_len: usize,
}

/// Forward decoded responses until the server hangs up.
async fn read_responses(mut reader: OwnedReadHalf, tx: mpsc::Sender<Response>) {
    let mut buffer = FrameBuffer::new();
    let mut chunk = vec![0u8; MAX_FRAME_LEN];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend(&chunk[..n]);
                while let Some(frame) = buffer.next_frame() {
                    match Response::decode(&frame) {
                        Ok(response) => {
                            if tx.send(response).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!("Dropping malformed frame: {}", e),
                    }
                }
            }
            Err(e) => {
                debug!("Read error: {}", e);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("could not connect to {addr}"))?;
    info!("Connected to {}", addr);
    println!("Connected to {addr}. Type help for commands.");

    let (reader, mut writer) = stream.into_split();
    let (tx, mut responses) = mpsc::channel(64);
    tokio::spawn(read_responses(reader, tx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = ClientState::new();

    loop {
        tokio::select! {
            response = responses.recv() => {
                let Some(response) = response else {
                    println!("Server closed the connection.");
                    break;
                };
                state.apply(&response);
                println!("{}", render(&response));
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse(&line, &state, args.max_phrase_len) {
                    Ok(Command::Help) => println!("{HELP}"),
                    Ok(Command::Status) => println!("{}", state.describe()),
                    Ok(Command::Quit) => break,
                    Ok(Command::Send(request)) => {
                        writer
                            .write_all(request.encode().as_bytes())
                            .await
                            .context("failed to send request")?;
                        state.on_sent(&request);
                    }
                    Err(CommandError::Empty) => {}
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}
