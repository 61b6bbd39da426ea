use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::watch,
};
use tracing::{info, warn};

use crate::{
    config::RelayConfig, connection::handle_connection, error::RelayError, registry::Registry,
    router::Router,
};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts TCP connections and runs one handler task per connection.
pub struct Relay {
    listener: TcpListener,
    state: Arc<RelayState>,
}

impl Relay {
    pub async fn bind(addr: SocketAddr, config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        Ok(Self::new(listener, config))
    }

    pub fn new(listener: TcpListener, config: RelayConfig) -> Self {
        Self {
            listener,
            state: Arc::new(RelayState::new(config)),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        self.listener.local_addr().map_err(RelayError::LocalAddr)
    }

    /// Shared directory of the relay, for inspection.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.state.registry)
    }

    /// Accepts connections until `shutdown` resolves, then asks every open
    /// connection to close.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send,
    {
        let Relay { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    handle_shutdown(&state);
                    break;
                }
                accept_result = listener.accept() => {
                    if !handle_accept_result(accept_result, &state) {
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<(), RelayError> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(addr: SocketAddr, config: RelayConfig) -> Result<(), RelayError> {
    let relay = Relay::bind(addr, config).await?;
    info!("relay listening on {}", relay.local_addr()?);
    relay.run_until_ctrl_c().await
}

fn handle_shutdown(state: &RelayState) {
    info!(online = state.registry.len(), "relay shutting down");
    state.shutdown.send_replace(true);
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    state: &Arc<RelayState>,
) -> bool {
    match result {
        Ok((stream, peer)) => {
            spawn_connection_handler(stream, peer, state);
            true
        }
        Err(err) => {
            warn!(error = ?err, "failed to accept connection");
            false
        }
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, state: &Arc<RelayState>) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, state).await {
            warn!(peer = %peer, error = %err, "connection closed with error");
        }
    });
}

/// State shared by the listener and every connection handler.
pub struct RelayState {
    registry: Arc<Registry>,
    router: Router,
    config: RelayConfig,
    shutdown: watch::Sender<bool>,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let (shutdown, _) = watch::channel(false);
        Self {
            router: Router::new(Arc::clone(&registry)),
            registry,
            config,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Resolves once the listener has begun shutting down.
    pub async fn stopped(&self) {
        let mut stopping = self.shutdown.subscribe();
        if *stopping.borrow_and_update() {
            return;
        }
        while stopping.changed().await.is_ok() {
            if *stopping.borrow_and_update() {
                return;
            }
        }
        // The sender lives as long as `self`, so this is not reached.
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stopped_resolves_after_shutdown() {
        let state = Arc::new(RelayState::new(RelayConfig::default()));
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.stopped().await })
        };

        handle_shutdown(&state);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("stopped resolves")
            .expect("waiter task");

        // Late subscribers see the flag immediately.
        tokio::time::timeout(Duration::from_secs(1), state.stopped())
            .await
            .expect("already stopped");
    }

    #[tokio::test]
    async fn bind_reports_address_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = taken.local_addr().expect("addr");

        let result = Relay::bind(addr, RelayConfig::default()).await;
        assert!(matches!(result, Err(RelayError::Bind { addr: failed, .. }) if failed == addr));
    }
}
