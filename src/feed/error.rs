use std::error::Error;
use std::fmt;

/// Error reported by a change feed.
#[derive(Debug)]
pub enum TransportError {
    /// Opening the channel failed (backend unreachable, handshake refused).
    ConnectionFailed(String),
    /// An open channel lost its connection.
    Disconnected(String),
    /// The backend closed the channel and will not accept it again.
    Closed,
    /// The backend rejected the channel outright (bad filter, no access).
    Rejected(String),
    /// Other error
    Other(Box<dyn Error + Send + Sync>),
}

impl TransportError {
    /// Whether reconnecting may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed(_)
                | TransportError::Disconnected(_)
                | TransportError::Other(_)
        )
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            TransportError::Disconnected(msg) => write!(f, "disconnected: {}", msg),
            TransportError::Closed => write!(f, "channel closed by backend"),
            TransportError::Rejected(msg) => write!(f, "channel rejected: {}", msg),
            TransportError::Other(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
