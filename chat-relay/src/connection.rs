use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    select,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    codec::{ACK, Command, encode_greeting, encode_roster, read_frame, write_frame},
    error::{ReadError, SendError, SessionError},
    handle::{ConnectionHandle, ConnectionId, Outbox},
    relay::RelayState,
};

/// How long a closing connection may spend flushing queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Unregistered,
    Registered(String),
}

impl Session {
    pub fn name(&self) -> Option<&str> {
        match self {
            Session::Unregistered => None,
            Session::Registered(name) => Some(name),
        }
    }
}

/// Serves one accepted TCP connection until it closes.
pub async fn handle_connection(stream: TcpStream, state: Arc<RelayState>) -> Result<(), ReadError> {
    let peer = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();
    serve_connection(BufReader::new(reader), writer, peer, state).await
}

/// Runs the command loop over any split transport.
///
/// Writes go through a dedicated writer task fed by the connection's
/// outbound queue. The registry entry is released on every exit path.
pub async fn serve_connection<R, W>(
    mut reader: R,
    writer: W,
    peer: Option<SocketAddr>,
    state: Arc<RelayState>,
) -> Result<(), ReadError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let id = ConnectionId::next();
    let (handle, outbox) = ConnectionHandle::new(id, state.config().outbound_capacity);
    let mut writer_task = tokio::spawn(run_writer(writer, outbox, id));
    debug!(connection = %id, ?peer, "connection opened");

    let mut connection = Connection {
        id,
        peer,
        handle,
        session: Session::Unregistered,
        state,
    };
    let result = connection.run(&mut reader).await;
    drop(connection);

    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer_task).await.is_err() {
        debug!(connection = %id, "writer did not drain in time");
        writer_task.abort();
    }
    debug!(connection = %id, ?peer, "connection closed");
    result
}

struct Connection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    handle: ConnectionHandle,
    session: Session,
    state: Arc<RelayState>,
}

impl Connection {
    async fn run<R>(&mut self, reader: &mut R) -> Result<(), ReadError>
    where
        R: AsyncBufRead + Unpin,
    {
        while let Some(frame) = self.next_frame(reader).await? {
            if frame.is_empty() {
                continue;
            }
            if let Err(error) = self.dispatch(&frame).await {
                debug!(connection = %self.id, %error, "reply could not be queued");
                break;
            }
        }
        Ok(())
    }

    /// Waits for the next frame, or `None` on EOF, idle timeout, or shutdown.
    async fn next_frame<R>(&self, reader: &mut R) -> Result<Option<String>, ReadError>
    where
        R: AsyncBufRead + Unpin,
    {
        let config = self.state.config();
        let read = async {
            let Some(limit) = config.idle_timeout else {
                return read_frame(reader, config.max_frame_len).await;
            };
            match timeout(limit, read_frame(reader, config.max_frame_len)).await {
                Ok(frame) => frame,
                Err(_) => {
                    info!(connection = %self.id, peer = ?self.peer, "closing idle connection");
                    Ok(None)
                }
            }
        };

        select! {
            frame = read => frame,
            _ = self.state.stopped() => Ok(None),
        }
    }

    async fn dispatch(&mut self, frame: &str) -> Result<(), SendError> {
        let command = match Command::parse(frame) {
            Ok(command) => command,
            Err(error) => {
                warn!(connection = %self.id, %error, frame, "dropping frame");
                return Ok(());
            }
        };

        match command {
            Command::Register { name } => self.register(&name).await,
            Command::List => {
                let roster = encode_roster(&self.state.registry().snapshot());
                self.handle.reply(roster).await
            }
            Command::Chat { target } => {
                self.chat(&target);
                Ok(())
            }
            Command::Unknown { command } => {
                debug!(connection = %self.id, command = %command, "ignoring unknown command");
                Ok(())
            }
        }
    }

    async fn register(&mut self, name: &str) -> Result<(), SendError> {
        let name = name.trim();
        if name.is_empty() {
            warn!(connection = %self.id, error = %SessionError::InvalidName, "ignoring register");
            return Ok(());
        }

        let registry = self.state.registry();
        if let Some(previous) = self.session.name() {
            if previous != name {
                registry.unregister(previous, &self.handle);
            }
        }
        if let Some(displaced) = registry.register(name, self.handle.clone()) {
            info!(
                name,
                connection = %self.id,
                displaced = %displaced.id(),
                "name taken over by a newer connection"
            );
        }

        info!(connection = %self.id, peer = ?self.peer, name, "user registered");
        self.session = Session::Registered(name.to_string());
        self.handle.reply(ACK.to_string()).await
    }

    fn chat(&self, target: &str) {
        match &self.session {
            Session::Unregistered => {
                warn!(
                    connection = %self.id,
                    target,
                    error = %SessionError::NotRegistered,
                    "ignoring chat"
                );
            }
            Session::Registered(name) => {
                self.state
                    .router()
                    .route(name, target, encode_greeting(name));
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(name) = self.session.name() {
            if self.state.registry().unregister(name, &self.handle) {
                info!(connection = %self.id, peer = ?self.peer, name, "user disconnected");
            }
        }
        self.handle.close();
    }
}

async fn run_writer<W>(mut writer: W, mut outbox: Outbox, id: ConnectionId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbox.next().await {
        if let Err(error) = write_frame(&mut writer, &frame).await {
            debug!(connection = %id, ?error, "failed to deliver frame");
            return;
        }
    }
    if let Err(error) = writer.shutdown().await {
        debug!(connection = %id, ?error, "failed to shut down writer");
    }
}
