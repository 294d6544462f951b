//! Static handshake catalog.
//!
//! Two tables drive the state machine. The action table maps each logical
//! message to its record type, wire message type, and writer. The
//! sequence table maps each handshake kind to the ordered messages
//! expected on the wire, declared over the full 128-entry bitmask space
//! with only the valid combinations populated.
//!
//! The sequence catalog is written out literally and cross-checked, on
//! first use, against a generator that derives every sequence from the
//! ordering rules. A divergence between the two is a programmer error and
//! panics.

use std::sync::LazyLock;

use super::{HandshakeKind, HandshakeMessage, HandshakeType, Writer};
use crate::record::ContentType;

/// Wire framing and writer for one logical message.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeAction {
    pub record_type: ContentType,
    /// Wire handshake message type; 0 for messages that are not
    /// handshake-framed (ChangeCipherSpec, application data).
    pub message_type: u8,
    pub writer: Writer,
}

/// Look up the action for a logical message.
pub const fn action(message: HandshakeMessage) -> HandshakeAction {
    use HandshakeMessage::*;
    match message {
        ClientHello => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::ClientHello as u8,
            writer: Writer::Client,
        },
        ServerHello => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::ServerHello as u8,
            writer: Writer::Server,
        },
        ServerNewSessionTicket => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::NewSessionTicket as u8,
            writer: Writer::Server,
        },
        ServerCert => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::Certificate as u8,
            writer: Writer::Server,
        },
        ServerCertStatus => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::CertificateStatus as u8,
            writer: Writer::Server,
        },
        ServerKey => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::ServerKeyExchange as u8,
            writer: Writer::Server,
        },
        ServerCertReq => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::CertificateRequest as u8,
            writer: Writer::Server,
        },
        ServerHelloDone => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::ServerHelloDone as u8,
            writer: Writer::Server,
        },
        ClientCert => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::Certificate as u8,
            writer: Writer::Client,
        },
        ClientKey => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::ClientKeyExchange as u8,
            writer: Writer::Client,
        },
        ClientCertVerify => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::CertificateVerify as u8,
            writer: Writer::Client,
        },
        ClientChangeCipherSpec => HandshakeAction {
            record_type: ContentType::ChangeCipherSpec,
            message_type: 0,
            writer: Writer::Client,
        },
        ClientFinished => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::Finished as u8,
            writer: Writer::Client,
        },
        ServerChangeCipherSpec => HandshakeAction {
            record_type: ContentType::ChangeCipherSpec,
            message_type: 0,
            writer: Writer::Server,
        },
        ServerFinished => HandshakeAction {
            record_type: ContentType::Handshake,
            message_type: HandshakeType::Finished as u8,
            writer: Writer::Server,
        },
        ApplicationData => HandshakeAction {
            record_type: ContentType::ApplicationData,
            message_type: 0,
            writer: Writer::Both,
        },
    }
}

const NEGOTIATED: u8 = HandshakeKind::NEGOTIATED.0;
const FULL_HANDSHAKE: u8 = HandshakeKind::FULL_HANDSHAKE.0;
const PERFECT_FORWARD_SECRECY: u8 = HandshakeKind::PERFECT_FORWARD_SECRECY.0;
const OCSP_STATUS: u8 = HandshakeKind::OCSP_STATUS.0;
const CLIENT_AUTH: u8 = HandshakeKind::CLIENT_AUTH.0;
const WITH_SESSION_TICKET: u8 = HandshakeKind::WITH_SESSION_TICKET.0;
const NO_CLIENT_CERT: u8 = HandshakeKind::NO_CLIENT_CERT.0;

/// The literal sequence catalog, indexed by handshake-kind bits.
const fn build_catalog() -> [Option<&'static [HandshakeMessage]>; 128] {
    use HandshakeMessage::*;
    let mut t: [Option<&'static [HandshakeMessage]>; 128] = [None; 128];

    t[0] = Some(&[ClientHello, ServerHello]);

    t[NEGOTIATED as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerChangeCipherSpec,
        ServerFinished,
        ClientChangeCipherSpec,
        ClientFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ClientChangeCipherSpec,
        ClientFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerHelloDone,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerHelloDone,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | PERFECT_FORWARD_SECRECY) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerKey,
        ServerHelloDone,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | PERFECT_FORWARD_SECRECY | WITH_SESSION_TICKET) as usize] =
        Some(&[
            ClientHello,
            ServerHello,
            ServerCert,
            ServerKey,
            ServerHelloDone,
            ClientKey,
            ClientChangeCipherSpec,
            ClientFinished,
            ServerNewSessionTicket,
            ServerChangeCipherSpec,
            ServerFinished,
            ApplicationData,
        ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | OCSP_STATUS) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertStatus,
        ServerHelloDone,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | OCSP_STATUS | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertStatus,
        ServerHelloDone,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | PERFECT_FORWARD_SECRECY | OCSP_STATUS) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertStatus,
        ServerKey,
        ServerHelloDone,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED
        | FULL_HANDSHAKE
        | PERFECT_FORWARD_SECRECY
        | OCSP_STATUS
        | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertStatus,
        ServerKey,
        ServerHelloDone,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | CLIENT_AUTH) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
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
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | CLIENT_AUTH | NO_CLIENT_CERT) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | CLIENT_AUTH | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientCertVerify,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | CLIENT_AUTH | NO_CLIENT_CERT | WITH_SESSION_TICKET)
        as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | PERFECT_FORWARD_SECRECY | CLIENT_AUTH) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
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
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | PERFECT_FORWARD_SECRECY | CLIENT_AUTH | NO_CLIENT_CERT)
        as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerKey,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED
        | FULL_HANDSHAKE
        | PERFECT_FORWARD_SECRECY
        | CLIENT_AUTH
        | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerKey,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientCertVerify,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED
        | FULL_HANDSHAKE
        | PERFECT_FORWARD_SECRECY
        | CLIENT_AUTH
        | NO_CLIENT_CERT
        | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerKey,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | OCSP_STATUS | CLIENT_AUTH) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertStatus,
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
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | OCSP_STATUS | CLIENT_AUTH | NO_CLIENT_CERT) as usize] =
        Some(&[
            ClientHello,
            ServerHello,
            ServerCert,
            ServerCertStatus,
            ServerCertReq,
            ServerHelloDone,
            ClientCert,
            ClientKey,
            ClientChangeCipherSpec,
            ClientFinished,
            ServerChangeCipherSpec,
            ServerFinished,
            ApplicationData,
        ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | OCSP_STATUS | CLIENT_AUTH | WITH_SESSION_TICKET) as usize] =
        Some(&[
            ClientHello,
            ServerHello,
            ServerCert,
            ServerCertStatus,
            ServerCertReq,
            ServerHelloDone,
            ClientCert,
            ClientKey,
            ClientCertVerify,
            ClientChangeCipherSpec,
            ClientFinished,
            ServerNewSessionTicket,
            ServerChangeCipherSpec,
            ServerFinished,
            ApplicationData,
        ]);

    t[(NEGOTIATED
        | FULL_HANDSHAKE
        | OCSP_STATUS
        | CLIENT_AUTH
        | NO_CLIENT_CERT
        | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertStatus,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED | FULL_HANDSHAKE | PERFECT_FORWARD_SECRECY | OCSP_STATUS | CLIENT_AUTH)
        as usize] = Some(&[
        ClientHello,
        ServerHello,
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
    ]);

    t[(NEGOTIATED
        | FULL_HANDSHAKE
        | PERFECT_FORWARD_SECRECY
        | OCSP_STATUS
        | CLIENT_AUTH
        | NO_CLIENT_CERT) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertStatus,
        ServerKey,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED
        | FULL_HANDSHAKE
        | PERFECT_FORWARD_SECRECY
        | OCSP_STATUS
        | CLIENT_AUTH
        | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
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
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t[(NEGOTIATED
        | FULL_HANDSHAKE
        | PERFECT_FORWARD_SECRECY
        | OCSP_STATUS
        | CLIENT_AUTH
        | NO_CLIENT_CERT
        | WITH_SESSION_TICKET) as usize] = Some(&[
        ClientHello,
        ServerHello,
        ServerCert,
        ServerCertStatus,
        ServerKey,
        ServerCertReq,
        ServerHelloDone,
        ClientCert,
        ClientKey,
        ClientChangeCipherSpec,
        ClientFinished,
        ServerNewSessionTicket,
        ServerChangeCipherSpec,
        ServerFinished,
        ApplicationData,
    ]);

    t
}

static CATALOG: [Option<&'static [HandshakeMessage]>; 128] = build_catalog();

/// Derive the sequence for `bits` from the ordering rules, or `None` for
/// an invalid flag combination. Used only to validate the catalog.
fn generated_sequence(bits: u8) -> Option<Vec<HandshakeMessage>> {
    use HandshakeMessage::*;
    let kind = HandshakeKind(bits);
    if kind == HandshakeKind::INITIAL {
        return Some(vec![ClientHello, ServerHello]);
    }
    if !kind.contains(HandshakeKind::NEGOTIATED) {
        return None;
    }
    let full = kind.contains(HandshakeKind::FULL_HANDSHAKE);
    let pfs = kind.contains(HandshakeKind::PERFECT_FORWARD_SECRECY);
    let ocsp = kind.contains(HandshakeKind::OCSP_STATUS);
    let client_auth = kind.contains(HandshakeKind::CLIENT_AUTH);
    let no_client_cert = kind.contains(HandshakeKind::NO_CLIENT_CERT);
    let ticket = kind.contains(HandshakeKind::WITH_SESSION_TICKET);

    if no_client_cert && !client_auth {
        return None;
    }
    if !full && (pfs || ocsp || client_auth || no_client_cert) {
        return None;
    }

    let mut seq = vec![ClientHello, ServerHello];
    if full {
        seq.push(ServerCert);
        if ocsp {
            seq.push(ServerCertStatus);
        }
        if pfs {
            seq.push(ServerKey);
        }
        if client_auth {
            seq.push(ServerCertReq);
        }
        seq.push(ServerHelloDone);
        if client_auth {
            seq.push(ClientCert);
        }
        seq.push(ClientKey);
        if client_auth && !no_client_cert {
            seq.push(ClientCertVerify);
        }
        seq.push(ClientChangeCipherSpec);
        seq.push(ClientFinished);
    }
    if ticket {
        seq.push(ServerNewSessionTicket);
    }
    seq.push(ServerChangeCipherSpec);
    seq.push(ServerFinished);
    if !full {
        seq.push(ClientChangeCipherSpec);
        seq.push(ClientFinished);
    }
    seq.push(ApplicationData);
    Some(seq)
}

static SEQUENCES: LazyLock<&'static [Option<&'static [HandshakeMessage]>; 128]> =
    LazyLock::new(|| {
        for bits in 0..128u8 {
            let generated = generated_sequence(bits);
            let catalog = CATALOG[bits as usize];
            match (generated, catalog) {
                (None, None) => {}
                (Some(g), Some(c)) if g.as_slice() == c => {}
                _ => panic!("handshake sequence catalog mismatch at kind {bits:#04x}"),
            }
        }
        &CATALOG
    });

/// The message sequence for a handshake kind, or `None` if the kind is
/// not a valid flag combination.
pub fn sequence(kind: HandshakeKind) -> Option<&'static [HandshakeMessage]> {
    SEQUENCES[kind.bits() as usize]
}
