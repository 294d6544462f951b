//! TLS alert protocol.

use log::debug;

use ferrotls_types::TlsError;

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

impl AlertLevel {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            1 => Ok(AlertLevel::Warning),
            2 => Ok(AlertLevel::Fatal),
            _ => Err(v),
        }
    }
}

/// Alert description codes (RFC 5246 §7.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    DecryptionFailed = 21,
    RecordOverflow = 22,
    DecompressionFailure = 30,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    UserCanceled = 90,
    NoRenegotiation = 100,
    UnsupportedExtension = 110,
}

impl AlertDescription {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(AlertDescription::CloseNotify),
            10 => Ok(AlertDescription::UnexpectedMessage),
            20 => Ok(AlertDescription::BadRecordMac),
            21 => Ok(AlertDescription::DecryptionFailed),
            22 => Ok(AlertDescription::RecordOverflow),
            30 => Ok(AlertDescription::DecompressionFailure),
            40 => Ok(AlertDescription::HandshakeFailure),
            42 => Ok(AlertDescription::BadCertificate),
            43 => Ok(AlertDescription::UnsupportedCertificate),
            44 => Ok(AlertDescription::CertificateRevoked),
            45 => Ok(AlertDescription::CertificateExpired),
            46 => Ok(AlertDescription::CertificateUnknown),
            47 => Ok(AlertDescription::IllegalParameter),
            48 => Ok(AlertDescription::UnknownCa),
            49 => Ok(AlertDescription::AccessDenied),
            50 => Ok(AlertDescription::DecodeError),
            51 => Ok(AlertDescription::DecryptError),
            70 => Ok(AlertDescription::ProtocolVersion),
            71 => Ok(AlertDescription::InsufficientSecurity),
            80 => Ok(AlertDescription::InternalError),
            90 => Ok(AlertDescription::UserCanceled),
            100 => Ok(AlertDescription::NoRenegotiation),
            110 => Ok(AlertDescription::UnsupportedExtension),
            _ => Err(v),
        }
    }
}

/// A TLS alert.
#[derive(Debug, Clone, Copy)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

/// Process the payload of an alert record received during the handshake.
///
/// A record may carry several two-byte alerts. close_notify ends the
/// connection; any fatal alert surfaces as [`TlsError::AlertReceived`]
/// with the peer's description code; warnings are logged and ignored.
pub fn process_alert_fragment(body: &[u8]) -> Result<(), TlsError> {
    if body.is_empty() || body.len() % 2 != 0 {
        return Err(TlsError::BadMessage("malformed alert record"));
    }
    for pair in body.chunks_exact(2) {
        let (level, description) = (pair[0], pair[1]);
        if description == AlertDescription::CloseNotify as u8 {
            return Err(TlsError::ConnectionClosed);
        }
        if level == AlertLevel::Fatal as u8 {
            return Err(TlsError::AlertReceived(description));
        }
        debug!("ignoring warning alert, code {description}");
    }
    Ok(())
}
