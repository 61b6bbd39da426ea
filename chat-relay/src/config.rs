use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_LEN;

/// Frames a connection may have queued before relayed chats are dropped.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Per-connection tuning shared by every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub max_frame_len: usize,
    pub outbound_capacity: usize,
    /// Close connections that stay silent this long. `None` never times out.
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            idle_timeout: None,
        }
    }
}
