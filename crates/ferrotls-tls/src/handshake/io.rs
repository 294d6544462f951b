//! Handshake I/O drivers and the negotiate loop.
//!
//! Writing is the simple direction: each message is encoded once, framed,
//! and written out as one or more records; a message may fragment across
//! records but messages never share one. Reading must cope with the
//! record layer interleaving content types: alerts and unknown record
//! types can arrive mid-handshake, a record may carry several handshake
//! messages, and one message may span several records.

use log::{debug, trace};

use ferrotls_types::{Blocked, TlsError};

use super::table;
use super::{
    parse_handshake_header, HandshakeHandlers, HandshakeKind, HandshakeMessage, HandshakeType,
    Writer, HANDSHAKE_HEADER_LENGTH, MAX_HANDSHAKE_MESSAGE_LENGTH,
};
use crate::alert;
use crate::config::CertAuthPolicy;
use crate::connection::{Connection, ConnectionState};
use crate::crypt::transcript;
use crate::record::ContentType;
use crate::{TlsRole, Transport};

impl<S: Transport, H: HandshakeHandlers> Connection<S, H> {
    /// Run the handshake until completion, suspension, or error.
    ///
    /// Returns `Ok(())` once the state machine reaches the
    /// application-data stage. A [`TlsError::WouldBlock`] return is a
    /// resumable suspension: the connection state is consistent and the
    /// caller re-invokes after transport readiness, with
    /// [`Connection::blocked`] reporting which direction is stalled.
    pub fn negotiate(&mut self) -> Result<(), TlsError> {
        let me = Writer::for_role(self.ctx.config.role);

        while self.ctx.active_action()?.writer != Writer::Both {
            // Flush outbound bytes left over from a previous suspension.
            self.ctx.blocked = Blocked::OnWrite;
            self.flush_out()?;

            if self.ctx.active_action()?.writer == me {
                self.ctx.blocked = Blocked::OnWrite;
                if let Err(write_err) = self.write_io() {
                    if write_err.is_retryable() {
                        return Err(write_err);
                    }
                    // Non-retryable write error. The peer might have sent
                    // an alert explaining what went wrong; that
                    // explanation beats our local write error.
                    return match self.read_io() {
                        Err(alert_err @ TlsError::AlertReceived(_)) => Err(alert_err),
                        _ => Err(write_err),
                    };
                }
            } else {
                self.ctx.blocked = Blocked::OnRead;
                if let Err(read_err) = self.read_io() {
                    if !read_err.is_retryable() {
                        self.ctx.delete_cache_entry();
                    }
                    return Err(read_err);
                }
            }

            // If the handshake just ended, free the message buffer.
            if self.ctx.active_action()?.writer == Writer::Both {
                self.ctx.io.release();
            }
        }

        self.ctx.blocked = Blocked::NotBlocked;
        self.ctx.state = ConnectionState::Connected;
        Ok(())
    }

    fn flush_out(&mut self) -> Result<(), TlsError> {
        self.ctx.record.flush(&mut self.transport)
    }

    /// Write exactly one handshake message, fragmenting into records.
    ///
    /// The handler encodes at most once per message: a wiped buffer means
    /// a fresh message needing encoding, a non-wiped one means we were
    /// suspended mid-flush and only the remaining fragments are written.
    fn write_io(&mut self) -> Result<(), TlsError> {
        let message = self.ctx.active_message()?;
        let action = table::action(message);

        if self.ctx.io.is_wiped() {
            trace!("writing {}", message.name());
            if action.record_type == ContentType::Handshake {
                self.ctx.io.start_handshake_header(action.message_type);
            }
            self.handlers.send(&mut self.ctx, message)?;
            if action.record_type == ContentType::Handshake {
                self.ctx.io.finish_handshake_header()?;
            }
        }

        while self.ctx.io.available() > 0 {
            let take = self
                .ctx
                .io
                .available()
                .min(self.ctx.record.max_write_payload_size());
            let start = self.ctx.io.cursor();
            self.ctx.io.set_cursor(start + take);
            {
                let fragment = &self.ctx.io.data()[start..start + take];
                self.ctx
                    .record
                    .write_record(action.record_type, self.ctx.version, fragment)?;
                // The transcript follows what the wire carries: update per
                // fragment, after record submission, before the flush.
                if action.record_type == ContentType::Handshake {
                    transcript::update_handshake_hashes(
                        &mut self.ctx.hashes,
                        self.ctx.params.as_ref(),
                        self.ctx.version,
                        self.ctx.pending_sig_hashes,
                        fragment,
                    );
                }
            }
            self.flush_out()?;
        }

        self.ctx.io.wipe();
        self.advance_message()
    }

    /// Read one record and process as much handshake progress as it
    /// allows.
    fn read_io(&mut self) -> Result<(), TlsError> {
        let (record_type, is_sslv2) = self.ctx.record.read_full_record(&mut self.transport)?;

        if is_sslv2 {
            return self.handle_sslv2();
        }

        match ContentType::from_u8(record_type) {
            Some(ContentType::ApplicationData) => {
                // Renegotiation is unsupported.
                Err(TlsError::BadMessage(
                    "application data received during handshake",
                ))
            }
            Some(ContentType::ChangeCipherSpec) => self.read_change_cipher_spec(),
            Some(ContentType::Alert) => {
                alert::process_alert_fragment(self.ctx.record.in_remaining())?;
                self.ctx.record.wipe_in();
                Ok(())
            }
            Some(ContentType::Handshake) => self.read_handshake_records(),
            _ => {
                // Record types we don't support (e.g. heartbeat) are
                // silently ignored.
                trace!("ignoring record of unknown type {record_type}");
                self.ctx.record.wipe_in();
                Ok(())
            }
        }
    }

    fn read_change_cipher_spec(&mut self) -> Result<(), TlsError> {
        if self.ctx.record.in_available() != 1 {
            return Err(TlsError::BadMessage(
                "change cipher spec record must be exactly one byte",
            ));
        }
        let message = self.ctx.active_message()?;
        if table::action(message).record_type != ContentType::ChangeCipherSpec {
            return Err(TlsError::BadMessage(
                "change cipher spec received out of order",
            ));
        }
        {
            let body = self.ctx.record.take_in(1);
            self.ctx.io.write(body);
        }
        trace!("processing {}", message.name());
        self.handlers.recv(&mut self.ctx, message)?;
        self.ctx.io.wipe();
        self.ctx.record.wipe_in();
        self.advance_message()
    }

    fn read_handshake_records(&mut self) -> Result<(), TlsError> {
        while self.ctx.record.in_available() > 0 {
            let wire_type = match self.reassemble_message()? {
                None => {
                    // Partial message: drop the drained record and let
                    // the caller read another; the io buffer carries the
                    // reassembly cursor.
                    self.ctx.record.wipe_in();
                    return Ok(());
                }
                Some(wire_type) => wire_type,
            };

            // A client under optional auth may discover mid-flight that
            // the server wants a certificate after all: upgrade the
            // active sequence in place.
            if self.ctx.config.role == TlsRole::Client
                && self.ctx.config.cert_auth == CertAuthPolicy::Optional
                && wire_type == HandshakeType::CertificateRequest as u8
                && self.ctx.expected_message_type()? == HandshakeType::ServerHelloDone as u8
            {
                debug!("server requested a client certificate; switching to client-auth sequence");
                self.ctx.kind |= HandshakeKind::CLIENT_AUTH;
            }

            // The server may skip CertificateStatus even after
            // advertising status_request (RFC 6066 §8).
            if self.ctx.config.role == TlsRole::Client
                && self.ctx.expected_message_type()? == HandshakeType::CertificateStatus as u8
                && wire_type != HandshakeType::CertificateStatus as u8
            {
                debug!("server skipped the certificate status message");
                self.ctx.kind.remove(HandshakeKind::OCSP_STATUS);
            }

            if wire_type != self.ctx.expected_message_type()? {
                return Err(TlsError::BadMessage("unexpected handshake message type"));
            }

            let message = self.ctx.active_message()?;
            trace!("processing {}", message.name());
            let handler_result = self.handlers.recv(&mut self.ctx, message);

            // The transcript update follows handler execution: handlers
            // like CertificateVerify read the hashes through but not
            // including their own message.
            self.ctx.update_hashes_current_message();
            self.ctx.io.wipe();

            if let Err(e) = handler_result {
                self.kill();
                return Err(e);
            }
            self.advance_message()?;
        }

        self.ctx.record.wipe_in();
        Ok(())
    }

    /// Pull handshake-message bytes from the current record into the io
    /// buffer. Returns the wire message type once the message is whole,
    /// or `None` when more record data is needed.
    fn reassemble_message(&mut self) -> Result<Option<u8>, TlsError> {
        if self.ctx.io.len() < HANDSHAKE_HEADER_LENGTH {
            let missing = HANDSHAKE_HEADER_LENGTH - self.ctx.io.len();
            if self.ctx.record.in_available() < missing {
                let available = self.ctx.record.in_available();
                let chunk = self.ctx.record.take_in(available);
                self.ctx.io.write(chunk);
                return Ok(None);
            }
            let chunk = self.ctx.record.take_in(missing);
            self.ctx.io.write(chunk);
        }

        let (wire_type, length) = parse_handshake_header(self.ctx.io.data())?;
        if length > MAX_HANDSHAKE_MESSAGE_LENGTH {
            return Err(TlsError::BadMessage(
                "handshake message length exceeds maximum",
            ));
        }

        let body_buffered = self.ctx.io.len() - HANDSHAKE_HEADER_LENGTH;
        let want = (length - body_buffered).min(self.ctx.record.in_available());
        if want > 0 {
            let chunk = self.ctx.record.take_in(want);
            self.ctx.io.write(chunk);
        }

        if self.ctx.io.len() == HANDSHAKE_HEADER_LENGTH + length {
            // Leave the cursor at the body for the handler.
            self.ctx.io.set_cursor(HANDSHAKE_HEADER_LENGTH);
            return Ok(Some(wire_type));
        }
        Ok(None)
    }

    /// Convert a legacy SSLv2-framed initial ClientHello.
    ///
    /// Only legal as the very first message. The transcript input is
    /// canonicalized: the three header bytes carrying the message type
    /// and version, then the record body, not the raw SSLv2 framing. Here
    /// the transcript is fed before the conversion handler runs, since
    /// the synthesized input comes from the record buffers the handler
    /// consumes.
    fn handle_sslv2(&mut self) -> Result<(), TlsError> {
        if self.ctx.active_message()? != HandshakeMessage::ClientHello {
            return Err(TlsError::BadMessage(
                "sslv2 record outside initial client hello",
            ));
        }
        debug!("processing sslv2-framed client hello");
        self.ctx.update_hashes_sslv2();
        {
            let available = self.ctx.record.in_available();
            let body = self.ctx.record.take_in(available);
            self.ctx.io.write(body);
        }
        self.handlers.recv_sslv2_client_hello(&mut self.ctx)?;
        self.ctx.io.wipe();
        self.ctx.record.wipe_in();
        self.advance_message()
    }

    /// Advance the sequence cursor and apply the corking policy.
    fn advance_message(&mut self) -> Result<(), TlsError> {
        let me = Writer::for_role(self.ctx.config.role);
        let previous = table::action(self.ctx.active_message()?).writer;
        self.ctx.message_number += 1;
        let active = table::action(self.ctx.active_message()?).writer;

        // Suppress delayed ACKs that would add artificial RTT to the
        // handshake.
        self.transport.quick_ack();

        // Leave the socket alone unless corking is under our management
        // and the caller didn't cork it first.
        if !self.ctx.corked_io || self.transport.was_corked() {
            return Ok(());
        }
        if active == previous {
            return Ok(());
        }
        if active == me {
            // We're the new writer: hold small segments back while we
            // produce our flight.
            self.transport.cork();
        } else {
            // We're the new reader, or we've reached application data.
            self.transport.uncork();
        }
        Ok(())
    }
}
