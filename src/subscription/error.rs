use std::error::Error;
use std::fmt;

use crate::feed::TransportError;

/// Error type for subscription operations.
#[derive(Debug)]
pub enum SubscriptionError {
    /// The descriptor cannot be subscribed (e.g. empty table name).
    InvalidDescriptor(String),
    /// Reconnection failed past the retry ceiling; the channel is closed.
    ReconnectExhausted {
        channel: String,
        attempts: u32,
        last_error: String,
    },
    /// The backend refused the channel or ended it.
    Transport(TransportError),
    /// The dispatcher thread could not be started.
    Spawn(String),
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionError::InvalidDescriptor(msg) => {
                write!(f, "invalid subscription descriptor: {}", msg)
            }
            SubscriptionError::ReconnectExhausted {
                channel,
                attempts,
                last_error,
            } => write!(
                f,
                "gave up reconnecting {} after {} attempts: {}",
                channel, attempts, last_error
            ),
            SubscriptionError::Transport(e) => write!(f, "transport error: {}", e),
            SubscriptionError::Spawn(msg) => write!(f, "failed to start dispatcher: {}", msg),
        }
    }
}

impl Error for SubscriptionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SubscriptionError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for SubscriptionError {
    fn from(err: TransportError) -> Self {
        SubscriptionError::Transport(err)
    }
}
