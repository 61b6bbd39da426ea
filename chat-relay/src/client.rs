use std::net::SocketAddr;

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    codec::{ACK, Command, DEFAULT_MAX_FRAME_LEN, decode_roster, read_frame, write_frame},
};

/// A protocol client for the relay.
///
/// Replies and relayed chats share one stream, so callers that expect a
/// reply should not have other traffic in flight.
pub struct RelayClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RelayClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Registers `name` and waits for the acknowledgement.
    pub async fn register(&mut self, name: &str) -> Result<()> {
        self.send(&Command::Register {
            name: name.to_string(),
        })
        .await?;
        match self.next_frame().await? {
            Some(frame) if frame == ACK => Ok(()),
            Some(frame) => Err(anyhow!("unexpected reply to register: {frame:?}")),
            None => Err(anyhow!("relay closed the connection during register")),
        }
    }

    /// Requests the names currently online.
    pub async fn list(&mut self) -> Result<Vec<String>> {
        self.send(&Command::List).await?;
        let frame = self
            .next_frame()
            .await?
            .context("relay closed the connection during list")?;
        Ok(decode_roster(&frame))
    }

    /// Sends a greeting to `target`. The relay does not reply.
    pub async fn chat(&mut self, target: &str) -> Result<()> {
        self.send(&Command::Chat {
            target: target.to_string(),
        })
        .await
    }

    pub async fn send(&mut self, command: &Command) -> Result<()> {
        self.send_raw(&command.encode()).await
    }

    /// Writes one frame verbatim, for frames the typed API cannot express.
    pub async fn send_raw(&mut self, frame: &str) -> Result<()> {
        write_frame(&mut self.writer, frame)
            .await
            .context("failed to send frame")
    }

    /// The next frame from the relay, or `None` once it closes the stream.
    pub async fn next_frame(&mut self) -> Result<Option<String>> {
        Ok(read_frame(&mut self.reader, DEFAULT_MAX_FRAME_LEN).await?)
    }

    /// Splits the client so frames can be read in a separate task.
    pub fn into_split(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .context("failed to shut down client writer")
    }
}

/// Interactive client: stdin lines are sent as raw frames and every frame
/// from the relay is printed.
pub async fn run(args: ClientArgs) -> Result<()> {
    let mut client = RelayClient::connect(args.server).await?;
    info!("connected to {}", args.server);
    client.register(&args.name).await?;
    write_stdout(&format!("*** registered as {}", args.name)).await?;

    let (reader, mut writer) = client.into_split();
    let mut printer = tokio::spawn(print_frames(reader, "<<< ".to_string()));

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            printed = &mut printer => {
                printed.context("frame printer task failed")??;
                write_stdout("*** relay closed the connection").await?;
                return Ok(());
            }
            bytes_read = stdin.read_line(&mut input) => {
                if !handle_stdin_input(bytes_read, &input, &mut writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
    printer.abort();
    Ok(())
}

/// Prints every frame read from the relay until it closes the stream.
pub(crate) async fn print_frames(
    mut reader: BufReader<OwnedReadHalf>,
    prefix: String,
) -> Result<()> {
    while let Some(frame) = read_frame(&mut reader, DEFAULT_MAX_FRAME_LEN).await? {
        write_stdout(&format!("{prefix}{frame}")).await?;
    }
    Ok(())
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    if bytes_read? == 0 {
        return Ok(false);
    }

    let line = input.trim_end();
    if line.is_empty() {
        return Ok(true);
    }

    if line.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving relay").await?;
        return Ok(false);
    }

    write_frame(writer, line).await?;
    Ok(true)
}

pub(crate) async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
