use crate::connection::ConnId;

/// Failure of a single peer connection.
///
/// These never escape the hub: a receive failure ends the peer's reader, a
/// send failure drops the peer from the membership set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Peer closed the connection or it was closed locally
    #[error("connection closed")]
    Closed,

    /// Transport or protocol level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Inbound frame the transport refused to turn into a payload
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Send did not complete within the hub's send timeout
    #[error("send timed out")]
    TimedOut,
}

/// Errors returned by [`HubHandle`](crate::HubHandle) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The hub worker has shut down (or panicked) and accepts no more requests
    #[error("hub is closed")]
    Closed,

    /// A member with this id is already registered; the duplicate was closed
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnId),
}

impl HubError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::Closed => "hub_closed",
            Self::AlreadyRegistered(_) => "already_registered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(HubError::Closed.error_code(), "hub_closed");
        assert_eq!(
            HubError::AlreadyRegistered(ConnId::new()).error_code(),
            "already_registered"
        );
    }

    #[test]
    fn display_messages() {
        assert_eq!(ConnectionError::Closed.to_string(), "connection closed");
        assert_eq!(
            ConnectionError::Malformed("expected value".into()).to_string(),
            "malformed frame: expected value"
        );
        let id = ConnId::new();
        assert_eq!(
            HubError::AlreadyRegistered(id).to_string(),
            format!("connection {id} is already registered")
        );
    }
}
