//! TLS configuration with builder pattern.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::record::MAX_FRAGMENT_LENGTH;
use crate::session::{SessionCache, TicketKeys};
use crate::TlsRole;

/// Client-certificate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertAuthPolicy {
    /// No client certificate is requested.
    #[default]
    None,
    /// A certificate is requested; an empty certificate list is accepted.
    Optional,
    /// A certificate is requested and required.
    Required,
}

/// Shared session cache handle.
pub type SharedSessionCache = Arc<Mutex<dyn SessionCache>>;

/// Shared ticket key store handle.
pub type SharedTicketKeys = Arc<dyn TicketKeys>;

/// TLS configuration.
#[derive(Clone)]
pub struct TlsConfig {
    /// The role (client or server).
    pub role: TlsRole,
    /// Client-certificate policy. On the server this decides whether a
    /// CertificateRequest is sent; on the client whether one is expected.
    pub cert_auth: CertAuthPolicy,
    /// Permit session-ID resumption through the session cache.
    pub session_resumption: bool,
    /// Session cache, shared across connections.
    pub session_cache: Option<SharedSessionCache>,
    /// Ticket keys. Presence enables the session-ticket path.
    pub ticket_keys: Option<SharedTicketKeys>,
    /// Let the engine cork and uncork the transport around flights.
    pub managed_corking: bool,
    /// Maximum record payload size.
    pub max_fragment_size: usize,
    /// Offer/accept OCSP stapling. Message handlers consult this when
    /// negotiating the status_request extension.
    pub enable_ocsp_stapling: bool,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("role", &self.role)
            .field("cert_auth", &self.cert_auth)
            .field("session_resumption", &self.session_resumption)
            .field(
                "session_cache",
                &self.session_cache.as_ref().map(|_| "<cache>"),
            )
            .field("ticket_keys", &self.ticket_keys.as_ref().map(|_| "<keys>"))
            .field("managed_corking", &self.managed_corking)
            .field("max_fragment_size", &self.max_fragment_size)
            .field("enable_ocsp_stapling", &self.enable_ocsp_stapling)
            .finish()
    }
}

impl TlsConfig {
    /// Create a builder for TLS configuration.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Whether session-ID caching may be used on this connection.
    pub fn allowed_to_cache(&self) -> bool {
        self.session_resumption && self.session_cache.is_some()
    }

    /// Whether session tickets are enabled.
    pub fn use_tickets(&self) -> bool {
        self.ticket_keys.is_some()
    }
}

/// Builder for `TlsConfig`.
#[derive(Clone)]
pub struct TlsConfigBuilder {
    role: TlsRole,
    cert_auth: CertAuthPolicy,
    session_resumption: bool,
    session_cache: Option<SharedSessionCache>,
    ticket_keys: Option<SharedTicketKeys>,
    managed_corking: bool,
    max_fragment_size: usize,
    enable_ocsp_stapling: bool,
}

impl Default for TlsConfigBuilder {
    fn default() -> Self {
        Self {
            role: TlsRole::Client,
            cert_auth: CertAuthPolicy::None,
            session_resumption: true,
            session_cache: None,
            ticket_keys: None,
            managed_corking: false,
            max_fragment_size: MAX_FRAGMENT_LENGTH,
            enable_ocsp_stapling: false,
        }
    }
}

impl fmt::Debug for TlsConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfigBuilder")
            .field("role", &self.role)
            .field("cert_auth", &self.cert_auth)
            .finish_non_exhaustive()
    }
}

impl TlsConfigBuilder {
    pub fn role(mut self, role: TlsRole) -> Self {
        self.role = role;
        self
    }

    pub fn cert_auth(mut self, policy: CertAuthPolicy) -> Self {
        self.cert_auth = policy;
        self
    }

    pub fn session_resumption(mut self, enabled: bool) -> Self {
        self.session_resumption = enabled;
        self
    }

    pub fn session_cache(mut self, cache: SharedSessionCache) -> Self {
        self.session_cache = Some(cache);
        self
    }

    pub fn ticket_keys(mut self, keys: SharedTicketKeys) -> Self {
        self.ticket_keys = Some(keys);
        self
    }

    pub fn managed_corking(mut self, enabled: bool) -> Self {
        self.managed_corking = enabled;
        self
    }

    pub fn max_fragment_size(mut self, size: usize) -> Self {
        self.max_fragment_size = size;
        self
    }

    pub fn enable_ocsp_stapling(mut self, enabled: bool) -> Self {
        self.enable_ocsp_stapling = enabled;
        self
    }

    pub fn build(self) -> TlsConfig {
        TlsConfig {
            role: self.role,
            cert_auth: self.cert_auth,
            session_resumption: self.session_resumption,
            session_cache: self.session_cache,
            ticket_keys: self.ticket_keys,
            managed_corking: self.managed_corking,
            max_fragment_size: self.max_fragment_size,
            enable_ocsp_stapling: self.enable_ocsp_stapling,
        }
    }
}
