//! Per-connection handshake state and the handshake-type resolver.

use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;

use ferrotls_types::{Blocked, TlsError};

use crate::config::{CertAuthPolicy, TlsConfig};
use crate::crypt::transcript::{self, HandshakeHashes};
use crate::crypt::{CipherSuiteParams, HashAlg, HashAlgSet};
use crate::handshake::table::{self, HandshakeAction};
use crate::handshake::{HandshakeHandlers, HandshakeKind, HandshakeMessage, IoBuffer, Writer};
use crate::record::RecordLayer;
use crate::session::{TicketStatus, TlsSession};
use crate::{TlsRole, TlsVersion, Transport};

/// Length of a freshly generated session ID.
pub const SESSION_ID_LENGTH: usize = 32;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Handshaking,
    Connected,
    Closed,
    Error,
}

/// Everything the handshake engine tracks for one connection, minus the
/// transport and the message handlers.
///
/// Message handlers receive `&mut HandshakeContext` and use it to read
/// the current message body, append outbound bodies, consult the
/// pre-update transcript, and feed negotiation results back to the
/// engine.
pub struct HandshakeContext {
    pub(crate) config: TlsConfig,
    pub(crate) kind: HandshakeKind,
    pub(crate) message_number: usize,
    pub(crate) io: IoBuffer,
    pub(crate) hashes: HandshakeHashes,
    pub(crate) pending_sig_hashes: HashAlgSet,
    pub(crate) record: RecordLayer,
    pub(crate) state: ConnectionState,
    pub(crate) blocked: Blocked,
    pub(crate) version: TlsVersion,
    pub(crate) params: Option<CipherSuiteParams>,
    pub(crate) session_id: Vec<u8>,
    pub(crate) client_session_resumed: bool,
    pub(crate) ticket_status: TicketStatus,
    pub(crate) presented_ticket: Option<Vec<u8>>,
    pub(crate) resumed_session: Option<TlsSession>,
    pub(crate) ocsp_negotiated: bool,
    pub(crate) corked_io: bool,
    kind_name: Option<(HandshakeKind, String)>,
}

impl HandshakeContext {
    pub(crate) fn new(config: TlsConfig) -> Self {
        let record = RecordLayer::with_max_fragment(config.max_fragment_size);
        let corked_io = config.managed_corking;
        Self {
            config,
            kind: HandshakeKind::INITIAL,
            message_number: 0,
            io: IoBuffer::new(),
            hashes: HandshakeHashes::new(),
            pending_sig_hashes: HashAlgSet::default(),
            record,
            state: ConnectionState::Handshaking,
            blocked: Blocked::NotBlocked,
            version: TlsVersion::Tls12,
            params: None,
            session_id: Vec::new(),
            client_session_resumed: false,
            ticket_status: TicketStatus::None,
            presented_ticket: None,
            resumed_session: None,
            ocsp_negotiated: false,
            corked_io,
            kind_name: None,
        }
    }

    pub fn config(&self) -> &TlsConfig {
        &self.config
    }

    pub fn role(&self) -> TlsRole {
        self.config.role
    }

    /// The body of the message currently being processed (inbound).
    pub fn body(&self) -> &[u8] {
        self.io.remaining()
    }

    /// Append bytes to the outbound message body.
    pub fn write_body(&mut self, bytes: &[u8]) {
        self.io.write(bytes);
    }

    /// Snapshot a transcript digest. During inbound dispatch this is the
    /// transcript through but not including the message being processed.
    pub fn transcript_digest(&self, alg: HashAlg) -> Vec<u8> {
        self.hashes.digest(alg)
    }

    /// Register a hash a signature computation will still need; keeps the
    /// hash advancing under TLS 1.2 even when it is not the PRF hash.
    pub fn require_signature_hash(&mut self, alg: HashAlg) {
        self.pending_sig_hashes.insert(alg);
    }

    /// The signature needing `alg` has been computed.
    pub fn signature_hash_computed(&mut self, alg: HashAlg) {
        self.pending_sig_hashes.remove(alg);
    }

    pub fn set_version(&mut self, version: TlsVersion) {
        self.version = version;
    }

    pub fn version(&self) -> TlsVersion {
        self.version
    }

    pub fn set_cipher_params(&mut self, params: CipherSuiteParams) {
        self.params = Some(params);
    }

    pub fn cipher_params(&self) -> Option<&CipherSuiteParams> {
        self.params.as_ref()
    }

    pub fn set_session_id(&mut self, id: &[u8]) {
        self.session_id = id.to_vec();
    }

    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Client side: the server echoed our session ID; this session is
    /// resumed.
    pub fn mark_client_session_resumed(&mut self) {
        self.client_session_resumed = true;
    }

    /// Record that OCSP stapling was negotiated (server will send, or has
    /// sent, a stapled response).
    pub fn set_ocsp_negotiated(&mut self, negotiated: bool) {
        self.ocsp_negotiated = negotiated;
    }

    /// Server side: the client presented a session ticket.
    pub fn present_ticket(&mut self, ticket: Vec<u8>) {
        self.presented_ticket = Some(ticket);
        self.ticket_status = TicketStatus::DecryptTicket;
    }

    /// The server decided, outside the ticket-decrypt path, to issue a
    /// new ticket.
    pub fn request_new_ticket(&mut self) {
        self.ticket_status = TicketStatus::NewTicket;
    }

    pub fn ticket_status(&self) -> TicketStatus {
        self.ticket_status
    }

    /// The session restored by ticket decrypt or cache lookup, if any.
    pub fn resumed_session(&self) -> Option<&TlsSession> {
        self.resumed_session.as_ref()
    }

    pub fn handshake_kind(&self) -> HandshakeKind {
        self.kind
    }

    /// The logical message at the current sequence position.
    pub fn current_message(&self) -> Option<HandshakeMessage> {
        self.active_message().ok()
    }

    /// Name of the message at the current sequence position.
    pub fn last_message_name(&self) -> &'static str {
        match self.active_message() {
            Ok(message) => message.name(),
            Err(_) => "UNKNOWN",
        }
    }

    /// Human-readable handshake-type name, memoized per bitmask.
    pub fn handshake_type_name(&mut self) -> &str {
        let stale = !matches!(&self.kind_name, Some((k, _)) if *k == self.kind);
        if stale {
            self.kind_name = Some((self.kind, self.kind.name()));
        }
        match &self.kind_name {
            Some((_, name)) => name,
            None => "INITIAL",
        }
    }

    /// Whether the state machine has reached the application-data stage.
    pub fn is_handshake_complete(&self) -> bool {
        matches!(
            self.active_action(),
            Ok(HandshakeAction {
                writer: Writer::Both,
                ..
            })
        )
    }

    pub(crate) fn active_sequence(&self) -> Result<&'static [HandshakeMessage], TlsError> {
        table::sequence(self.kind).ok_or(TlsError::BadMessage(
            "no handshake sequence for negotiated parameters",
        ))
    }

    pub(crate) fn active_message(&self) -> Result<HandshakeMessage, TlsError> {
        self.active_sequence()?
            .get(self.message_number)
            .copied()
            .ok_or(TlsError::BadMessage(
                "handshake continued past end of message sequence",
            ))
    }

    pub(crate) fn active_action(&self) -> Result<HandshakeAction, TlsError> {
        Ok(table::action(self.active_message()?))
    }

    pub(crate) fn expected_message_type(&self) -> Result<u8, TlsError> {
        Ok(self.active_action()?.message_type)
    }

    /// Feed the complete message in `io` (header plus body).
    pub(crate) fn update_hashes_current_message(&mut self) {
        transcript::update_handshake_hashes(
            &mut self.hashes,
            self.params.as_ref(),
            self.version,
            self.pending_sig_hashes,
            self.io.data(),
        );
    }

    /// Feed the canonicalized SSLv2 ClientHello: the three header bytes
    /// carrying the message type and version, then the record body.
    pub(crate) fn update_hashes_sslv2(&mut self) {
        transcript::update_handshake_hashes(
            &mut self.hashes,
            self.params.as_ref(),
            self.version,
            self.pending_sig_hashes,
            &self.record.header_in()[2..5],
        );
        transcript::update_handshake_hashes(
            &mut self.hashes,
            self.params.as_ref(),
            self.version,
            self.pending_sig_hashes,
            self.record.in_remaining(),
        );
    }

    /// Commit to a message sequence once the hello exchange has settled
    /// the negotiated parameters.
    ///
    /// Invoked by the server after processing ClientHello and by the
    /// client after processing ServerHello. A presented session ticket
    /// settles resumption entirely: on successful decrypt the connection
    /// is resumed as-is, and on failure the session-ID cache is never
    /// consulted.
    pub fn set_handshake_type(&mut self) -> Result<(), TlsError> {
        self.kind = HandshakeKind::NEGOTIATED;
        let mut skip_cache_lookup = false;

        if self.config.use_tickets() {
            match self.ticket_status {
                TicketStatus::DecryptTicket => {
                    if self.decrypt_session_ticket() {
                        debug!("session resumed from ticket");
                        return Ok(());
                    }
                    let can_issue = self
                        .config
                        .ticket_keys
                        .as_ref()
                        .is_some_and(|keys| keys.can_issue());
                    if can_issue {
                        self.ticket_status = TicketStatus::NewTicket;
                        self.kind |= HandshakeKind::WITH_SESSION_TICKET;
                    }
                    skip_cache_lookup = true;
                }
                TicketStatus::NewTicket => {
                    self.kind |= HandshakeKind::WITH_SESSION_TICKET;
                }
                TicketStatus::None => {}
            }
        }

        if !skip_cache_lookup && self.config.allowed_to_cache() && self.resume_from_cache() {
            debug!("session resumed from cache");
            return Ok(());
        }

        if self.config.role == TlsRole::Client && self.client_session_resumed {
            return Ok(());
        }

        // Full handshake from here on.
        self.generate_session_id();
        self.kind |= HandshakeKind::FULL_HANDSHAKE;

        match (self.config.role, self.config.cert_auth) {
            (TlsRole::Client, CertAuthPolicy::Required) => {
                self.kind |= HandshakeKind::CLIENT_AUTH;
            }
            (TlsRole::Server, CertAuthPolicy::Optional | CertAuthPolicy::Required) => {
                self.kind |= HandshakeKind::CLIENT_AUTH;
            }
            _ => {}
        }

        if self
            .params
            .as_ref()
            .is_some_and(|p| p.kx_alg.is_ephemeral())
        {
            self.kind |= HandshakeKind::PERFECT_FORWARD_SECRECY;
        }

        if self.ocsp_negotiated {
            self.kind |= HandshakeKind::OCSP_STATUS;
        }

        debug!("handshake type resolved: {}", self.kind.name());
        Ok(())
    }

    /// The client sent an empty certificate list under optional client
    /// auth.
    pub fn set_no_client_cert(&mut self) -> Result<(), TlsError> {
        if self.config.cert_auth != CertAuthPolicy::Optional {
            return Err(TlsError::BadMessage(
                "empty client certificate list requires optional client auth",
            ));
        }
        self.kind |= HandshakeKind::NO_CLIENT_CERT;
        Ok(())
    }

    fn decrypt_session_ticket(&mut self) -> bool {
        let keys = match self.config.ticket_keys.clone() {
            Some(keys) => keys,
            None => return false,
        };
        let ticket = match self.presented_ticket.as_deref() {
            Some(ticket) => ticket,
            None => return false,
        };
        match keys.decrypt(ticket) {
            Some(session) => {
                self.resumed_session = Some(session);
                true
            }
            None => false,
        }
    }

    fn resume_from_cache(&mut self) -> bool {
        if self.session_id.is_empty() {
            return false;
        }
        let cache = match self.config.session_cache.clone() {
            Some(cache) => cache,
            None => return false,
        };
        let entry = cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&self.session_id));
        match entry {
            Some(session) => {
                self.resumed_session = Some(session);
                true
            }
            None => false,
        }
    }

    fn generate_session_id(&mut self) {
        if self.config.role == TlsRole::Server {
            let mut id = vec![0u8; SESSION_ID_LENGTH];
            OsRng.fill_bytes(&mut id);
            self.session_id = id;
        }
    }

    /// Drop the session-cache entry for this connection, if any. Called
    /// when a non-transient failure would otherwise leave a poisoned
    /// entry behind.
    pub(crate) fn delete_cache_entry(&mut self) {
        if !self.config.allowed_to_cache() || self.session_id.is_empty() {
            return;
        }
        if let Some(cache) = self.config.session_cache.clone() {
            if let Ok(mut cache) = cache.lock() {
                cache.remove(&self.session_id);
            }
        }
    }
}

/// A TLS connection driving the handshake state machine over a byte
/// transport.
///
/// Generic over the transport and over the [`HandshakeHandlers`]
/// implementation that encodes and decodes individual messages.
pub struct Connection<S: Transport, H: HandshakeHandlers> {
    pub(crate) transport: S,
    pub(crate) handlers: H,
    pub(crate) ctx: HandshakeContext,
}

impl<S: Transport, H: HandshakeHandlers> Connection<S, H> {
    /// Create a new connection wrapping the given transport.
    pub fn new(transport: S, config: TlsConfig, handlers: H) -> Self {
        Self {
            transport,
            handlers,
            ctx: HandshakeContext::new(config),
        }
    }

    /// The handshake engine state, for handler wiring and introspection.
    pub fn context(&self) -> &HandshakeContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut HandshakeContext {
        &mut self.ctx
    }

    pub fn transport(&self) -> &S {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut S {
        &mut self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.ctx.state
    }

    /// Direction the engine last reported itself blocked on.
    pub fn blocked(&self) -> Blocked {
        self.ctx.blocked
    }

    pub fn handshake_kind(&self) -> HandshakeKind {
        self.ctx.kind
    }

    pub fn current_message(&self) -> Option<HandshakeMessage> {
        self.ctx.current_message()
    }

    pub fn last_message_name(&self) -> &'static str {
        self.ctx.last_message_name()
    }

    pub fn handshake_type_name(&mut self) -> &str {
        self.ctx.handshake_type_name()
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.ctx.is_handshake_complete()
    }

    /// See [`HandshakeContext::set_handshake_type`].
    pub fn set_handshake_type(&mut self) -> Result<(), TlsError> {
        self.ctx.set_handshake_type()
    }

    /// See [`HandshakeContext::set_no_client_cert`].
    pub fn set_no_client_cert(&mut self) -> Result<(), TlsError> {
        self.ctx.set_no_client_cert()
    }

    pub(crate) fn kill(&mut self) {
        self.ctx.state = ConnectionState::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SharedSessionCache, SharedTicketKeys};
    use crate::session::{SessionCache, TicketKeys};
    use crate::CipherSuite;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct MapCache {
        entries: HashMap<Vec<u8>, TlsSession>,
    }

    impl MapCache {
        fn new() -> Self {
            Self {
                entries: HashMap::new(),
            }
        }
    }

    impl SessionCache for MapCache {
        fn put(&mut self, key: &[u8], session: TlsSession) {
            self.entries.insert(key.to_vec(), session);
        }
        fn get(&self, key: &[u8]) -> Option<TlsSession> {
            self.entries.get(key).cloned()
        }
        fn remove(&mut self, key: &[u8]) {
            self.entries.remove(key);
        }
    }

    struct FixedTicketKeys {
        accept: Option<TlsSession>,
        can_issue: bool,
    }

    impl TicketKeys for FixedTicketKeys {
        fn can_issue(&self) -> bool {
            self.can_issue
        }
        fn decrypt(&self, _ticket: &[u8]) -> Option<TlsSession> {
            self.accept.clone()
        }
        fn encrypt(&self, _session: &TlsSession) -> Option<Vec<u8>> {
            Some(vec![0xEE; 16])
        }
    }

    fn session(id: &[u8]) -> TlsSession {
        TlsSession {
            id: id.to_vec(),
            cipher_suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            master_secret: vec![7; 48],
            ticket: None,
            lifetime: 300,
        }
    }

    fn ctx_with(config: TlsConfig) -> HandshakeContext {
        HandshakeContext::new(config)
    }

    #[test]
    fn test_resolver_ticket_resumption() {
        let keys: SharedTicketKeys = Arc::new(FixedTicketKeys {
            accept: Some(session(b"t")),
            can_issue: true,
        });
        let config = TlsConfig::builder()
            .role(TlsRole::Server)
            .ticket_keys(keys)
            .build();
        let mut ctx = ctx_with(config);
        ctx.present_ticket(vec![1, 2, 3]);
        ctx.set_handshake_type().unwrap();
        // Successful ticket decrypt: resumed, nothing else decided.
        assert_eq!(ctx.handshake_kind(), HandshakeKind::NEGOTIATED);
        assert!(ctx.resumed_session().is_some());
    }

    #[test]
    fn test_resolver_ticket_decrypt_failure_skips_cache() {
        // The cache holds a matching entry, but a presented ticket that
        // fails to decrypt must not fall back to it.
        let cache: SharedSessionCache = Arc::new(Mutex::new(MapCache::new()));
        cache.lock().unwrap().put(b"sid", session(b"sid"));
        let keys: SharedTicketKeys = Arc::new(FixedTicketKeys {
            accept: None,
            can_issue: true,
        });
        let config = TlsConfig::builder()
            .role(TlsRole::Server)
            .session_cache(cache)
            .ticket_keys(keys)
            .build();
        let mut ctx = ctx_with(config);
        ctx.set_session_id(b"sid");
        ctx.present_ticket(vec![9]);
        ctx.set_handshake_type().unwrap();
        assert!(ctx.handshake_kind().contains(HandshakeKind::FULL_HANDSHAKE));
        assert!(ctx
            .handshake_kind()
            .contains(HandshakeKind::WITH_SESSION_TICKET));
        assert_eq!(ctx.ticket_status(), TicketStatus::NewTicket);
        assert!(ctx.resumed_session().is_none());
    }

    #[test]
    fn test_resolver_cache_resumption_with_new_ticket() {
        let cache: SharedSessionCache = Arc::new(Mutex::new(MapCache::new()));
        cache.lock().unwrap().put(b"sid", session(b"sid"));
        let keys: SharedTicketKeys = Arc::new(FixedTicketKeys {
            accept: None,
            can_issue: true,
        });
        let config = TlsConfig::builder()
            .role(TlsRole::Server)
            .session_cache(cache)
            .ticket_keys(keys)
            .build();
        let mut ctx = ctx_with(config);
        ctx.set_session_id(b"sid");
        ctx.request_new_ticket();
        ctx.set_handshake_type().unwrap();
        assert_eq!(
            ctx.handshake_kind(),
            HandshakeKind::NEGOTIATED | HandshakeKind::WITH_SESSION_TICKET
        );
    }

    #[test]
    fn test_resolver_full_handshake_flags() {
        let config = TlsConfig::builder()
            .role(TlsRole::Server)
            .cert_auth(CertAuthPolicy::Optional)
            .build();
        let mut ctx = ctx_with(config);
        ctx.set_cipher_params(
            CipherSuiteParams::from_suite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256)
                .unwrap(),
        );
        ctx.set_ocsp_negotiated(true);
        ctx.set_handshake_type().unwrap();
        let kind = ctx.handshake_kind();
        assert!(kind.contains(HandshakeKind::FULL_HANDSHAKE));
        assert!(kind.contains(HandshakeKind::PERFECT_FORWARD_SECRECY));
        assert!(kind.contains(HandshakeKind::OCSP_STATUS));
        assert!(kind.contains(HandshakeKind::CLIENT_AUTH));
        // A fresh server-side session ID was generated for the full
        // handshake.
        assert_eq!(ctx.session_id().len(), SESSION_ID_LENGTH);
    }

    #[test]
    fn test_resolver_client_auth_only_when_required_on_client() {
        let config = TlsConfig::builder()
            .role(TlsRole::Client)
            .cert_auth(CertAuthPolicy::Optional)
            .build();
        let mut ctx = ctx_with(config);
        ctx.set_handshake_type().unwrap();
        assert!(!ctx.handshake_kind().contains(HandshakeKind::CLIENT_AUTH));

        let config = TlsConfig::builder()
            .role(TlsRole::Client)
            .cert_auth(CertAuthPolicy::Required)
            .build();
        let mut ctx = ctx_with(config);
        ctx.set_handshake_type().unwrap();
        assert!(ctx.handshake_kind().contains(HandshakeKind::CLIENT_AUTH));
    }

    #[test]
    fn test_resolver_client_resumed_session() {
        let config = TlsConfig::builder().role(TlsRole::Client).build();
        let mut ctx = ctx_with(config);
        ctx.mark_client_session_resumed();
        ctx.set_handshake_type().unwrap();
        assert_eq!(ctx.handshake_kind(), HandshakeKind::NEGOTIATED);
        assert!(ctx.session_id().is_empty());
    }

    #[test]
    fn test_set_no_client_cert_policy() {
        let config = TlsConfig::builder()
            .cert_auth(CertAuthPolicy::Optional)
            .build();
        let mut ctx = ctx_with(config);
        ctx.set_no_client_cert().unwrap();
        assert!(ctx.handshake_kind().contains(HandshakeKind::NO_CLIENT_CERT));

        for policy in [CertAuthPolicy::None, CertAuthPolicy::Required] {
            let config = TlsConfig::builder().cert_auth(policy).build();
            let mut ctx = ctx_with(config);
            match ctx.set_no_client_cert() {
                Err(TlsError::BadMessage(_)) => {}
                other => panic!("expected bad message, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_handshake_type_name_memoized() {
        let mut ctx = ctx_with(TlsConfig::builder().build());
        assert_eq!(ctx.handshake_type_name(), "INITIAL");
        ctx.kind = HandshakeKind::NEGOTIATED | HandshakeKind::FULL_HANDSHAKE;
        assert_eq!(ctx.handshake_type_name(), "NEGOTIATED|FULL_HANDSHAKE");
        // Same kind again hits the memo.
        assert_eq!(ctx.handshake_type_name(), "NEGOTIATED|FULL_HANDSHAKE");
    }

    #[test]
    fn test_message_position_helpers() {
        let mut ctx = ctx_with(TlsConfig::builder().build());
        assert_eq!(ctx.current_message(), Some(HandshakeMessage::ClientHello));
        assert_eq!(ctx.last_message_name(), "CLIENT_HELLO");
        assert!(!ctx.is_handshake_complete());
        ctx.kind = HandshakeKind::NEGOTIATED;
        ctx.message_number = 6;
        assert_eq!(ctx.current_message(), Some(HandshakeMessage::ApplicationData));
        assert!(ctx.is_handshake_complete());
    }

    #[test]
    fn test_delete_cache_entry() {
        let cache: SharedSessionCache = Arc::new(Mutex::new(MapCache::new()));
        cache.lock().unwrap().put(b"sid", session(b"sid"));
        let config = TlsConfig::builder()
            .role(TlsRole::Server)
            .session_cache(cache.clone())
            .build();
        let mut ctx = ctx_with(config);
        ctx.set_session_id(b"sid");
        ctx.delete_cache_entry();
        assert!(cache.lock().unwrap().get(b"sid").is_none());
    }
}
