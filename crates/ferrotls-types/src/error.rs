use std::fmt;

/// Which direction of the transport a suspended operation is waiting on.
///
/// A connection that reports `OnRead` or `OnWrite` is in a consistent
/// state; the caller polls the transport for readiness and re-invokes the
/// operation that returned [`TlsError::WouldBlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blocked {
    /// No operation is pending.
    #[default]
    NotBlocked,
    /// Waiting for the transport to become readable.
    OnRead,
    /// Waiting for the transport to become writable.
    OnWrite,
}

impl fmt::Display for Blocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocked::NotBlocked => write!(f, "not blocked"),
            Blocked::OnRead => write!(f, "on read"),
            Blocked::OnWrite => write!(f, "on write"),
        }
    }
}

/// TLS protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Transient suspension: the transport cannot make progress right now.
    /// All connection state is preserved; retry after transport readiness.
    #[error("i/o would block ({0})")]
    WouldBlock(Blocked),
    /// The peer violated the protocol. Fatal to the connection.
    #[error("bad message: {0}")]
    BadMessage(&'static str),
    /// A fatal alert was received from the peer. Carries the alert
    /// description code from RFC 5246 §7.2.
    #[error("fatal alert received: code {0}")]
    AlertReceived(u8),
    /// The peer sent close_notify.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// A message handler reported a failure.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    /// Record framing or buffering failure.
    #[error("record layer error: {0}")]
    RecordError(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TlsError {
    /// Whether the error is a transient suspension the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TlsError::WouldBlock(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_display() {
        assert_eq!(Blocked::NotBlocked.to_string(), "not blocked");
        assert_eq!(Blocked::OnRead.to_string(), "on read");
        assert_eq!(Blocked::OnWrite.to_string(), "on write");
    }

    #[test]
    fn test_blocked_default() {
        assert_eq!(Blocked::default(), Blocked::NotBlocked);
    }

    #[test]
    fn test_tls_error_display() {
        assert_eq!(
            TlsError::WouldBlock(Blocked::OnRead).to_string(),
            "i/o would block (on read)"
        );
        assert_eq!(
            TlsError::BadMessage("unexpected handshake message type").to_string(),
            "bad message: unexpected handshake message type"
        );
        assert_eq!(
            TlsError::AlertReceived(40).to_string(),
            "fatal alert received: code 40"
        );
        assert_eq!(
            TlsError::ConnectionClosed.to_string(),
            "connection closed by peer"
        );
        assert_eq!(
            TlsError::HandshakeFailed("bad finished".into()).to_string(),
            "handshake failed: bad finished"
        );
        assert_eq!(
            TlsError::RecordError("record too large".into()).to_string(),
            "record layer error: record too large"
        );
    }

    #[test]
    fn test_tls_error_retryable() {
        assert!(TlsError::WouldBlock(Blocked::OnRead).is_retryable());
        assert!(TlsError::WouldBlock(Blocked::OnWrite).is_retryable());
        assert!(!TlsError::BadMessage("x").is_retryable());
        assert!(!TlsError::AlertReceived(40).is_retryable());
        assert!(!TlsError::ConnectionClosed.is_retryable());
    }

    #[test]
    fn test_tls_error_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let tls: TlsError = io.into();
        let display = tls.to_string();
        assert!(display.contains("reset"), "got: {display}");
        assert!(!tls.is_retryable());
    }

    #[test]
    fn test_tls_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TlsError>();
        assert_send_sync::<Blocked>();
    }
}
