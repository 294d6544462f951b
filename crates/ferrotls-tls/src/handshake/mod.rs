//! TLS handshake protocol state machine.
//!
//! The handshake is table-driven: [`table`] maps each logical message to
//! its wire framing and writer, and maps every negotiated handshake kind
//! to the ordered message sequence expected on the wire. The drivers in
//! [`io`] walk that sequence, dispatching per-message work to a
//! [`HandshakeHandlers`] implementation.

pub mod io;
pub mod table;

use std::ops::{BitOr, BitOrAssign};

use zeroize::Zeroize;

use ferrotls_types::TlsError;

use crate::connection::HandshakeContext;
use crate::TlsRole;

/// Handshake messages may not exceed this many body bytes.
pub const MAX_HANDSHAKE_MESSAGE_LENGTH: usize = 65536;

/// Length of the handshake message header: type (1) plus length (3).
pub const HANDSHAKE_HEADER_LENGTH: usize = 4;

/// The logical handshake messages, one per slot in a message sequence.
///
/// Distinct from the wire message type: `ClientFinished` and
/// `ServerFinished` share wire type 20, and the two ChangeCipherSpec
/// entries have no wire handshake type at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello,
    ServerHello,
    ServerNewSessionTicket,
    ServerCert,
    ServerCertStatus,
    ServerKey,
    ServerCertReq,
    ServerHelloDone,
    ClientCert,
    ClientKey,
    ClientCertVerify,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    ApplicationData,
}

impl HandshakeMessage {
    /// Stable name for diagnostics and logging.
    pub fn name(self) -> &'static str {
        match self {
            HandshakeMessage::ClientHello => "CLIENT_HELLO",
            HandshakeMessage::ServerHello => "SERVER_HELLO",
            HandshakeMessage::ServerNewSessionTicket => "SERVER_NEW_SESSION_TICKET",
            HandshakeMessage::ServerCert => "SERVER_CERT",
            HandshakeMessage::ServerCertStatus => "SERVER_CERT_STATUS",
            HandshakeMessage::ServerKey => "SERVER_KEY",
            HandshakeMessage::ServerCertReq => "SERVER_CERT_REQ",
            HandshakeMessage::ServerHelloDone => "SERVER_HELLO_DONE",
            HandshakeMessage::ClientCert => "CLIENT_CERT",
            HandshakeMessage::ClientKey => "CLIENT_KEY",
            HandshakeMessage::ClientCertVerify => "CLIENT_CERT_VERIFY",
            HandshakeMessage::ClientChangeCipherSpec => "CLIENT_CHANGE_CIPHER_SPEC",
            HandshakeMessage::ClientFinished => "CLIENT_FINISHED",
            HandshakeMessage::ServerChangeCipherSpec => "SERVER_CHANGE_CIPHER_SPEC",
            HandshakeMessage::ServerFinished => "SERVER_FINISHED",
            HandshakeMessage::ApplicationData => "APPLICATION_DATA",
        }
    }
}

/// Wire handshake message types (RFC 5246 §7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
    CertificateStatus = 22,
}

/// Which peer writes a given message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    Client,
    Server,
    /// Sentinel for the application-data stage: both peers may write.
    Both,
}

impl Writer {
    pub fn for_role(role: TlsRole) -> Self {
        match role {
            TlsRole::Client => Writer::Client,
            TlsRole::Server => Writer::Server,
        }
    }
}

/// Bitmask describing the shape of the in-progress handshake.
///
/// Composed by the resolver after the hello exchange; `INITIAL` (no
/// flags) covers the stretch before enough is known to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandshakeKind(pub(crate) u8);

impl HandshakeKind {
    pub const INITIAL: Self = Self(0);
    pub const NEGOTIATED: Self = Self(1);
    pub const FULL_HANDSHAKE: Self = Self(2);
    pub const PERFECT_FORWARD_SECRECY: Self = Self(4);
    pub const OCSP_STATUS: Self = Self(8);
    pub const CLIENT_AUTH: Self = Self(16);
    pub const WITH_SESSION_TICKET: Self = Self(32);
    pub const NO_CLIENT_CERT: Self = Self(64);

    /// Flag names indexed by bit position.
    const FLAG_NAMES: [&'static str; 7] = [
        "NEGOTIATED",
        "FULL_HANDSHAKE",
        "PERFECT_FORWARD_SECRECY",
        "OCSP_STATUS",
        "CLIENT_AUTH",
        "WITH_SESSION_TICKET",
        "NO_CLIENT_CERT",
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Reconstruct a kind from raw bits. The bitmask domain is bounded at
    /// 128 combinations.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits < 128 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: Self) {
        self.0 &= !flag.0;
    }

    /// Human-readable rendering: set flag names joined by `|`, or
    /// `INITIAL` when no flag is set. A pure function of the bits; the
    /// connection memoizes the result per kind.
    pub fn name(self) -> String {
        if self == Self::INITIAL {
            return "INITIAL".to_string();
        }
        let mut out = String::new();
        for (i, flag_name) in Self::FLAG_NAMES.iter().enumerate() {
            if self.0 & (1 << i) != 0 {
                if !out.is_empty() {
                    out.push('|');
                }
                out.push_str(flag_name);
            }
        }
        out
    }
}

impl BitOr for HandshakeKind {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for HandshakeKind {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Reassembly and staging buffer for the current handshake message.
///
/// Holds an inbound message (header plus body) while fragments arrive, or
/// an outbound message while fragments drain. `wiped` distinguishes a
/// fresh buffer that still needs encoding from one suspended mid-flush,
/// so handlers run at most once per message.
pub struct IoBuffer {
    data: Vec<u8>,
    cursor: usize,
    wiped: bool,
}

impl IoBuffer {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            cursor: 0,
            wiped: true,
        }
    }

    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Total buffered bytes, consumed or not.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Buffered bytes not yet consumed by the read cursor.
    pub fn available(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The unconsumed tail: for handlers, exactly the message body.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.wiped = false;
        self.data.extend_from_slice(bytes);
    }

    /// Consume `n` bytes (capped at what is available).
    pub fn read(&mut self, n: usize) -> &[u8] {
        let n = n.min(self.available());
        let start = self.cursor;
        self.cursor += n;
        &self.data[start..self.cursor]
    }

    pub fn set_cursor(&mut self, cursor: usize) {
        debug_assert!(cursor <= self.data.len());
        self.cursor = cursor;
    }

    /// Rewind the read cursor to the start.
    pub fn reread(&mut self) {
        self.cursor = 0;
    }

    /// Zeroize and reset for the next message.
    pub fn wipe(&mut self) {
        self.data.zeroize();
        self.data.clear();
        self.cursor = 0;
        self.wiped = true;
    }

    /// Wipe and release the backing allocation (handshake over).
    pub fn release(&mut self) {
        self.wipe();
        self.data = Vec::new();
    }

    /// Begin an outbound handshake message: write the message type and a
    /// length placeholder, patched by [`IoBuffer::finish_handshake_header`]
    /// once the handler has appended the body.
    pub fn start_handshake_header(&mut self, message_type: u8) {
        self.write(&[message_type, 0, 0, 0]);
    }

    /// Back-patch the length field with the final body size.
    pub fn finish_handshake_header(&mut self) -> Result<(), TlsError> {
        let body_len = self
            .data
            .len()
            .checked_sub(HANDSHAKE_HEADER_LENGTH)
            .ok_or(TlsError::BadMessage("handshake header missing"))?;
        if body_len > MAX_HANDSHAKE_MESSAGE_LENGTH {
            return Err(TlsError::BadMessage(
                "handshake message length exceeds maximum",
            ));
        }
        self.data[1] = (body_len >> 16) as u8;
        self.data[2] = (body_len >> 8) as u8;
        self.data[3] = body_len as u8;
        Ok(())
    }
}

impl Default for IoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a handshake message header: wire type and declared body length.
pub fn parse_handshake_header(header: &[u8]) -> Result<(u8, usize), TlsError> {
    if header.len() < HANDSHAKE_HEADER_LENGTH {
        return Err(TlsError::BadMessage("truncated handshake header"));
    }
    let length =
        (usize::from(header[1]) << 16) | (usize::from(header[2]) << 8) | usize::from(header[3]);
    Ok((header[0], length))
}

/// Per-message handshake logic, supplied by the surrounding connection
/// object.
///
/// The engine decides *which* message is due and frames it; the handlers
/// decide what the bytes mean. For each logical message, whichever side
/// is the writer encodes and the other decodes; a connection has one
/// fixed role, so it carries one side of each pair.
pub trait HandshakeHandlers {
    /// Process an inbound message. The context's message buffer holds
    /// exactly the body; the transcript is readable in its pre-update
    /// state.
    fn recv(
        &mut self,
        ctx: &mut HandshakeContext,
        message: HandshakeMessage,
    ) -> Result<(), TlsError>;

    /// Produce an outbound message by appending its body to the context's
    /// message buffer.
    fn send(
        &mut self,
        ctx: &mut HandshakeContext,
        message: HandshakeMessage,
    ) -> Result<(), TlsError>;

    /// Convert a legacy SSLv2-framed ClientHello. The record body is in
    /// the context's message buffer.
    fn recv_sslv2_client_hello(&mut self, _ctx: &mut HandshakeContext) -> Result<(), TlsError> {
        Err(TlsError::BadMessage("sslv2 client hello not supported"))
    }
}
