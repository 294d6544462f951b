//! Negotiated-parameter descriptions the handshake engine keys off.
//!
//! The engine never performs key exchange or bulk encryption itself; it
//! only needs to know which hash the negotiated suite's PRF uses and
//! whether the key exchange is ephemeral.

pub mod transcript;

use crate::{CipherSuite, TlsError};

/// Hash algorithms tracked by the handshake transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Md5,
    Sha1,
    /// MD5 and SHA-1 run over the same input, digests concatenated.
    /// Used by the TLS 1.0/1.1 PRF and legacy signatures.
    Md5Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    /// Digest output size in bytes.
    pub fn output_size(self) -> usize {
        match self {
            HashAlg::Md5 => 16,
            HashAlg::Sha1 => 20,
            HashAlg::Md5Sha1 => 36,
            HashAlg::Sha224 => 28,
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            HashAlg::Sha512 => 64,
        }
    }
}

/// A set of [`HashAlg`] values, used to track signature hashes that
/// message handlers still need computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashAlgSet(u8);

impl HashAlgSet {
    const fn bit(alg: HashAlg) -> u8 {
        1 << alg as u8
    }

    pub fn insert(&mut self, alg: HashAlg) {
        self.0 |= Self::bit(alg);
    }

    pub fn remove(&mut self, alg: HashAlg) {
        self.0 &= !Self::bit(alg);
    }

    pub fn contains(self, alg: HashAlg) -> bool {
        self.0 & Self::bit(alg) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Key exchange algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeAlg {
    Rsa,
    Dhe,
    Ecdhe,
}

impl KeyExchangeAlg {
    /// Ephemeral key exchanges provide perfect forward secrecy and add a
    /// ServerKeyExchange message to the handshake.
    pub fn is_ephemeral(self) -> bool {
        matches!(self, KeyExchangeAlg::Dhe | KeyExchangeAlg::Ecdhe)
    }
}

/// Parameters of a negotiated cipher suite that shape the handshake.
#[derive(Debug, Clone)]
pub struct CipherSuiteParams {
    pub suite: CipherSuite,
    pub kx_alg: KeyExchangeAlg,
    /// Hash used by the TLS 1.2 PRF for this suite.
    pub prf_hash: HashAlg,
}

impl CipherSuiteParams {
    /// Look up parameters for a supported TLS 1.0-1.2 cipher suite.
    pub fn from_suite(suite: CipherSuite) -> Result<Self, TlsError> {
        let (kx_alg, prf_hash) = match suite {
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA => (KeyExchangeAlg::Rsa, HashAlg::Sha256),
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA => (KeyExchangeAlg::Rsa, HashAlg::Sha256),
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256 => (KeyExchangeAlg::Rsa, HashAlg::Sha256),
            CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA => (KeyExchangeAlg::Dhe, HashAlg::Sha256),
            CipherSuite::TLS_DHE_RSA_WITH_AES_256_CBC_SHA => (KeyExchangeAlg::Dhe, HashAlg::Sha256),
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA => {
                (KeyExchangeAlg::Ecdhe, HashAlg::Sha256)
            }
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 => {
                (KeyExchangeAlg::Ecdhe, HashAlg::Sha256)
            }
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => {
                (KeyExchangeAlg::Ecdhe, HashAlg::Sha384)
            }
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => {
                (KeyExchangeAlg::Ecdhe, HashAlg::Sha256)
            }
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 => {
                (KeyExchangeAlg::Ecdhe, HashAlg::Sha384)
            }
            _ => {
                return Err(TlsError::HandshakeFailed(format!(
                    "unsupported cipher suite 0x{:04X}",
                    suite.0
                )))
            }
        };
        Ok(Self {
            suite,
            kx_alg,
            prf_hash,
        })
    }
}
