/// Transport-level failures. Cloneable so they can travel on the event bus.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,

    #[error("connection to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("all candidate endpoints failed")]
    EndpointsExhausted,

    #[error("gave up reconnecting after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed device payload: {0}")]
    Protocol(String),

    #[error("http request failed: {0}")]
    Http(String),
}

impl ChannelError {
    /// Terminal errors end the current connection cycle; the monitor reacts
    /// by switching transports rather than retrying in place.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelError::EndpointsExhausted | ChannelError::RetriesExhausted { .. }
        )
    }
}
