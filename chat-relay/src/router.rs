use std::sync::Arc;

use tracing::{debug, warn};

use crate::{error::SendError, registry::Registry};

/// Result of routing one chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    RecipientNotFound,
    /// The recipient was registered but its connection refused the frame.
    Failed(SendError),
}

/// Delivers chat frames to registered users.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Looks up `to` and queues `body` on its connection.
    ///
    /// The registry lock covers the lookup only; the frame is handed to the
    /// recipient after it is released. Failures are logged here and never
    /// reported back to the sender.
    pub fn route(&self, from: &str, to: &str, body: String) -> DeliveryOutcome {
        let Some(recipient) = self.registry.lookup(to) else {
            warn!(from, to, "no user registered under recipient name");
            return DeliveryOutcome::RecipientNotFound;
        };

        match recipient.send(body) {
            Ok(()) => {
                debug!(from, to, connection = %recipient.id(), "chat relayed");
                DeliveryOutcome::Delivered
            }
            Err(error) => {
                warn!(from, to, %error, "failed to relay chat");
                DeliveryOutcome::Failed(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::encode_greeting,
        handle::{ConnectionHandle, ConnectionId},
    };

    #[tokio::test]
    async fn delivers_to_the_named_recipient_only() {
        let registry = Arc::new(Registry::new());
        let (alice, mut alice_outbox) = ConnectionHandle::new(ConnectionId::next(), 4);
        let (bob, mut bob_outbox) = ConnectionHandle::new(ConnectionId::next(), 4);
        registry.register("alice", alice.clone());
        registry.register("bob", bob.clone());

        let router = Router::new(Arc::clone(&registry));
        let outcome = router.route("alice", "bob", encode_greeting("alice"));
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        bob.close();
        alice.close();
        assert_eq!(bob_outbox.next().await.as_deref(), Some("alice says hi"));
        assert_eq!(bob_outbox.next().await, None);
        assert_eq!(alice_outbox.next().await, None);
    }

    #[test]
    fn unknown_recipient_is_reported() {
        let router = Router::new(Arc::new(Registry::new()));
        let outcome = router.route("alice", "zed", encode_greeting("alice"));
        assert_eq!(outcome, DeliveryOutcome::RecipientNotFound);
    }

    #[test]
    fn closed_recipient_is_a_failed_delivery() {
        let registry = Arc::new(Registry::new());
        let (bob, outbox) = ConnectionHandle::new(ConnectionId::next(), 4);
        registry.register("bob", bob);
        drop(outbox);

        let router = Router::new(registry);
        let outcome = router.route("alice", "bob", encode_greeting("alice"));
        assert_eq!(outcome, DeliveryOutcome::Failed(SendError::Closed));
    }
}
