//! TLS session management and resumption.

use zeroize::Zeroize;

use crate::CipherSuite;

/// A TLS session that can be used for resumption.
#[derive(Debug, Clone)]
pub struct TlsSession {
    /// Session identifier.
    pub id: Vec<u8>,
    /// The negotiated cipher suite.
    pub cipher_suite: CipherSuite,
    /// Master secret from the original handshake.
    pub master_secret: Vec<u8>,
    /// Session ticket, if one was issued.
    pub ticket: Option<Vec<u8>>,
    /// Ticket lifetime hint in seconds.
    pub lifetime: u32,
}

impl Drop for TlsSession {
    fn drop(&mut self) {
        self.master_secret.zeroize();
    }
}

/// Session cache for storing and retrieving sessions by session ID.
///
/// Shared across connections; implementations are responsible for their
/// own interior synchronization (the engine wraps the cache in a mutex).
pub trait SessionCache: Send + Sync {
    /// Store a session.
    fn put(&mut self, key: &[u8], session: TlsSession);
    /// Retrieve a session.
    fn get(&self, key: &[u8]) -> Option<TlsSession>;
    /// Remove a session.
    fn remove(&mut self, key: &[u8]);
}

/// Session-ticket key store.
///
/// The engine treats ticket contents as opaque: it only needs to know
/// whether a presented ticket decrypts to a session and whether a key is
/// available to issue new tickets.
pub trait TicketKeys: Send + Sync {
    /// Whether an encrypt/decrypt key is available to issue new tickets.
    fn can_issue(&self) -> bool;
    /// Decrypt a ticket presented by the client. `None` means the ticket
    /// is unusable (unknown key, expired, tampered).
    fn decrypt(&self, ticket: &[u8]) -> Option<TlsSession>;
    /// Encrypt a session into a new ticket.
    fn encrypt(&self, session: &TlsSession) -> Option<Vec<u8>>;
}

/// Where this connection stands in the session-ticket exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TicketStatus {
    /// No ticket involved.
    #[default]
    None,
    /// The client presented a ticket that has not been decrypted yet.
    DecryptTicket,
    /// A new ticket will be issued during this handshake.
    NewTicket,
}
