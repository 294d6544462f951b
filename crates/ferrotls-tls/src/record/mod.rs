//! Plaintext TLS record layer: framing, buffering, and resumable I/O.
//!
//! Frames outgoing payloads into records, reads and reassembles incoming
//! records from a possibly non-blocking transport, and recognizes
//! SSLv2-framed initial ClientHello records. Encryption is out of scope:
//! the drivers above treat record payloads as plaintext.

use std::io::{ErrorKind, Read, Write};

use zeroize::Zeroize;

use ferrotls_types::{Blocked, TlsError};

use crate::TlsVersion;

/// Maximum record payload we will emit or accept (RFC 5246 §6.2.1).
pub const MAX_FRAGMENT_LENGTH: usize = 16384;

/// Record header length for TLS and for the SSLv2 compatibility parse.
pub const RECORD_HEADER_LENGTH: usize = 5;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    /// Convert from the wire byte. Unknown content types return `None`;
    /// the handshake driver ignores such records rather than failing.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// State of the inbound record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InStatus {
    /// The previous record has been consumed; the next read starts with a
    /// fresh record header.
    Encrypted,
    /// `in_buf` holds the payload of a fully-read record.
    Plaintext,
}

/// Record layer state for one connection.
///
/// All reads and writes are resumable: a transport `WouldBlock` surfaces
/// as [`TlsError::WouldBlock`] with the partial header, payload, or
/// outbound bytes preserved for the next call.
pub struct RecordLayer {
    max_fragment: usize,
    /// Header bytes of the record currently being read (up to 5).
    header_in: Vec<u8>,
    /// Payload of the record currently being read.
    in_buf: Vec<u8>,
    in_cursor: usize,
    in_status: InStatus,
    /// Payload length declared by the completed header, while the payload
    /// is still being filled.
    in_expected_len: Option<usize>,
    in_type: u8,
    in_sslv2: bool,
    /// No record header has been parsed yet on this connection. SSLv2
    /// framing is only recognized on the very first record.
    initial: bool,
    /// Serialized records awaiting transmission.
    out: Vec<u8>,
    out_cursor: usize,
}

impl RecordLayer {
    pub fn new() -> Self {
        Self::with_max_fragment(MAX_FRAGMENT_LENGTH)
    }

    pub fn with_max_fragment(max_fragment: usize) -> Self {
        Self {
            max_fragment,
            header_in: Vec::with_capacity(RECORD_HEADER_LENGTH),
            in_buf: Vec::new(),
            in_cursor: 0,
            in_status: InStatus::Encrypted,
            in_expected_len: None,
            in_type: 0,
            in_sslv2: false,
            initial: true,
            out: Vec::new(),
            out_cursor: 0,
        }
    }

    /// Read exactly one record from the transport.
    ///
    /// Returns the raw content-type byte and whether the record was
    /// SSLv2-framed. On `WouldBlock` the partially-read header or payload
    /// is kept and the next call resumes where this one stopped.
    pub fn read_full_record<T: Read>(&mut self, transport: &mut T) -> Result<(u8, bool), TlsError> {
        if self.in_expected_len.is_none() {
            while self.header_in.len() < RECORD_HEADER_LENGTH {
                let need = RECORD_HEADER_LENGTH - self.header_in.len();
                self.fill_from(transport, need, Buffer::Header)?;
            }
            self.parse_record_header()?;
        }
        let expected = self.in_expected_len.unwrap_or(0);
        while self.in_buf.len() < expected {
            let need = expected - self.in_buf.len();
            self.fill_from(transport, need, Buffer::Payload)?;
        }
        self.in_status = InStatus::Plaintext;
        Ok((self.in_type, self.in_sslv2))
    }

    fn parse_record_header(&mut self) -> Result<(), TlsError> {
        let h = &self.header_in;
        if self.initial && h[0] & 0x80 != 0 {
            // SSLv2 framing: two length bytes, then message type and
            // version, which we count as header. Only the remainder is
            // payload.
            let total = ((usize::from(h[0]) & 0x7f) << 8) | usize::from(h[1]);
            if total < 3 {
                return Err(TlsError::BadMessage("sslv2 record too short"));
            }
            let payload_len = total - 3;
            if payload_len > self.max_fragment + 256 {
                return Err(TlsError::RecordError("record too large".into()));
            }
            self.in_type = ContentType::Handshake as u8;
            self.in_sslv2 = true;
            self.in_expected_len = Some(payload_len);
        } else {
            let payload_len = (usize::from(h[3]) << 8) | usize::from(h[4]);
            if payload_len > self.max_fragment + 256 {
                return Err(TlsError::RecordError("record too large".into()));
            }
            self.in_type = h[0];
            self.in_sslv2 = false;
            self.in_expected_len = Some(payload_len);
        }
        self.initial = false;
        Ok(())
    }

    fn fill_from<T: Read>(
        &mut self,
        transport: &mut T,
        need: usize,
        target: Buffer,
    ) -> Result<(), TlsError> {
        let mut tmp = [0u8; MAX_FRAGMENT_LENGTH];
        let want = need.min(tmp.len());
        loop {
            match transport.read(&mut tmp[..want]) {
                Ok(0) => {
                    return Err(TlsError::RecordError("unexpected eof".into()));
                }
                Ok(n) => {
                    let buf = match target {
                        Buffer::Header => &mut self.header_in,
                        Buffer::Payload => &mut self.in_buf,
                    };
                    buf.extend_from_slice(&tmp[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Err(TlsError::WouldBlock(Blocked::OnRead));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Payload bytes of the current record not yet consumed.
    pub fn in_available(&self) -> usize {
        self.in_buf.len() - self.in_cursor
    }

    /// Consume up to `n` payload bytes of the current record.
    pub fn take_in(&mut self, n: usize) -> &[u8] {
        let n = n.min(self.in_available());
        let start = self.in_cursor;
        self.in_cursor += n;
        &self.in_buf[start..self.in_cursor]
    }

    /// Unconsumed payload bytes of the current record, without consuming
    /// them.
    pub fn in_remaining(&self) -> &[u8] {
        &self.in_buf[self.in_cursor..]
    }

    /// Header bytes of the current record.
    pub fn header_in(&self) -> &[u8] {
        &self.header_in
    }

    pub fn in_status(&self) -> InStatus {
        self.in_status
    }

    /// Wipe the inbound record buffers; the next read expects a fresh
    /// record header.
    pub fn wipe_in(&mut self) {
        self.header_in.zeroize();
        self.header_in.clear();
        self.in_buf.zeroize();
        self.in_buf.clear();
        self.in_cursor = 0;
        self.in_expected_len = None;
        self.in_status = InStatus::Encrypted;
    }

    /// Largest payload a single outgoing record may carry.
    pub fn max_write_payload_size(&self) -> usize {
        self.max_fragment
    }

    /// Frame `payload` as a record and queue it for transmission.
    pub fn write_record(
        &mut self,
        content_type: ContentType,
        version: TlsVersion,
        payload: &[u8],
    ) -> Result<(), TlsError> {
        if payload.len() > self.max_fragment {
            return Err(TlsError::RecordError(
                "payload exceeds max fragment size".into(),
            ));
        }
        self.out.reserve(RECORD_HEADER_LENGTH + payload.len());
        self.out.push(content_type as u8);
        self.out.extend_from_slice(&version.wire().to_be_bytes());
        self.out
            .extend_from_slice(&(payload.len() as u16).to_be_bytes());
        self.out.extend_from_slice(payload);
        Ok(())
    }

    /// Drain queued records to the transport.
    ///
    /// On `WouldBlock` the undrained bytes stay queued; the next call
    /// resumes from the partial-write cursor.
    pub fn flush<T: Write>(&mut self, transport: &mut T) -> Result<(), TlsError> {
        while self.out_cursor < self.out.len() {
            match transport.write(&self.out[self.out_cursor..]) {
                Ok(0) => {
                    return Err(TlsError::RecordError("transport closed".into()));
                }
                Ok(n) => self.out_cursor += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Err(TlsError::WouldBlock(Blocked::OnWrite));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match transport.flush() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return Err(TlsError::WouldBlock(Blocked::OnWrite));
            }
            Err(e) => return Err(e.into()),
        }
        self.out.zeroize();
        self.out.clear();
        self.out_cursor = 0;
        Ok(())
    }

    /// Whether queued outbound bytes remain undrained.
    pub fn out_pending(&self) -> bool {
        self.out_cursor < self.out.len()
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
enum Buffer {
    Header,
    Payload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Reader that yields at most `chunk` bytes per call and returns
    /// `WouldBlock` between chunks when `blocking` is set.
    struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
        interleave_block: bool,
        block_next: bool,
    }

    impl ChunkedReader {
        fn new(data: Vec<u8>, chunk: usize, interleave_block: bool) -> Self {
            Self {
                data,
                pos: 0,
                chunk,
                interleave_block,
                block_next: false,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interleave_block && self.block_next {
                self.block_next = false;
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "blocked"));
            }
            self.block_next = true;
            let n = buf
                .len()
                .min(self.chunk)
                .min(self.data.len() - self.pos);
            if n == 0 {
                return Ok(0);
            }
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn tls_record(content_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut rec = vec![content_type, 0x03, 0x03];
        rec.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        rec.extend_from_slice(payload);
        rec
    }

    #[test]
    fn test_read_full_record() {
        let mut rl = RecordLayer::new();
        let rec = tls_record(22, &[1, 2, 3, 4]);
        let mut cursor = Cursor::new(rec);
        let (rt, sslv2) = rl.read_full_record(&mut cursor).unwrap();
        assert_eq!(rt, 22);
        assert!(!sslv2);
        assert_eq!(rl.in_available(), 4);
        assert_eq!(rl.take_in(4), &[1, 2, 3, 4]);
        assert_eq!(rl.in_available(), 0);
        assert_eq!(rl.in_status(), InStatus::Plaintext);
        rl.wipe_in();
        assert_eq!(rl.in_status(), InStatus::Encrypted);
    }

    #[test]
    fn test_read_resumes_after_would_block() {
        let mut rl = RecordLayer::new();
        let rec = tls_record(22, b"hello handshake");
        let mut reader = ChunkedReader::new(rec, 1, true);
        loop {
            match rl.read_full_record(&mut reader) {
                Ok((rt, sslv2)) => {
                    assert_eq!(rt, 22);
                    assert!(!sslv2);
                    break;
                }
                Err(TlsError::WouldBlock(Blocked::OnRead)) => continue,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(rl.take_in(usize::MAX), b"hello handshake");
    }

    #[test]
    fn test_sslv2_framing_detected_on_first_record_only() {
        let mut rl = RecordLayer::new();
        // SSLv2: length 0x000b with high bit, msg type 1, version 3.3,
        // then 8 body bytes.
        let mut rec = vec![0x80, 0x0b, 0x01, 0x03, 0x03];
        rec.extend_from_slice(&[0xAA; 8]);
        let mut cursor = Cursor::new(rec);
        let (rt, sslv2) = rl.read_full_record(&mut cursor).unwrap();
        assert_eq!(rt, ContentType::Handshake as u8);
        assert!(sslv2);
        assert_eq!(rl.in_available(), 8);
        assert_eq!(rl.header_in()[2..5], [0x01, 0x03, 0x03]);
        rl.wipe_in();

        // A later record starting with a high bit is not SSLv2.
        let rec2 = tls_record(0x80, &[0u8; 2]);
        let mut cursor2 = Cursor::new(rec2);
        let (rt2, sslv2_2) = rl.read_full_record(&mut cursor2).unwrap();
        assert_eq!(rt2, 0x80);
        assert!(!sslv2_2);
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut rl = RecordLayer::new();
        let mut rec = vec![22, 0x03, 0x03];
        rec.extend_from_slice(&0xFFFFu16.to_be_bytes());
        let mut cursor = Cursor::new(rec);
        match rl.read_full_record(&mut cursor) {
            Err(TlsError::RecordError(msg)) => assert!(msg.contains("too large")),
            other => panic!("expected record error, got {other:?}"),
        }
    }

    #[test]
    fn test_eof_is_an_error() {
        let mut rl = RecordLayer::new();
        let mut cursor = Cursor::new(vec![22, 0x03]);
        match rl.read_full_record(&mut cursor) {
            Err(TlsError::RecordError(msg)) => assert!(msg.contains("eof")),
            other => panic!("expected record error, got {other:?}"),
        }
    }

    #[test]
    fn test_write_and_flush() {
        let mut rl = RecordLayer::new();
        rl.write_record(ContentType::Handshake, TlsVersion::Tls12, &[9, 9, 9])
            .unwrap();
        assert!(rl.out_pending());
        let mut sink = Vec::new();
        rl.flush(&mut sink).unwrap();
        assert!(!rl.out_pending());
        assert_eq!(sink, tls_record(22, &[9, 9, 9]));
    }

    #[test]
    fn test_flush_resumes_partial_writes() {
        struct OneByteSink {
            out: Vec<u8>,
            block_next: bool,
        }
        impl io::Write for OneByteSink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                if self.block_next {
                    self.block_next = false;
                    return Err(io::Error::new(io::ErrorKind::WouldBlock, "blocked"));
                }
                self.block_next = true;
                self.out.push(buf[0]);
                Ok(1)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut rl = RecordLayer::new();
        rl.write_record(ContentType::Alert, TlsVersion::Tls12, &[2, 40])
            .unwrap();
        let mut sink = OneByteSink {
            out: Vec::new(),
            block_next: false,
        };
        let mut attempts = 0;
        loop {
            match rl.flush(&mut sink) {
                Ok(()) => break,
                Err(TlsError::WouldBlock(Blocked::OnWrite)) => {
                    attempts += 1;
                    assert!(attempts < 32);
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(sink.out, tls_record(21, &[2, 40]));
    }

    #[test]
    fn test_payload_over_fragment_limit_rejected() {
        let mut rl = RecordLayer::new();
        let big = vec![0u8; MAX_FRAGMENT_LENGTH + 1];
        assert!(rl
            .write_record(ContentType::Handshake, TlsVersion::Tls12, &big)
            .is_err());
    }

    #[test]
    fn test_content_type_from_u8() {
        assert_eq!(ContentType::from_u8(20), Some(ContentType::ChangeCipherSpec));
        assert_eq!(ContentType::from_u8(21), Some(ContentType::Alert));
        assert_eq!(ContentType::from_u8(22), Some(ContentType::Handshake));
        assert_eq!(ContentType::from_u8(23), Some(ContentType::ApplicationData));
        // Heartbeat and anything else are unknown to the handshake layer.
        assert_eq!(ContentType::from_u8(24), None);
        assert_eq!(ContentType::from_u8(0), None);
    }
}
