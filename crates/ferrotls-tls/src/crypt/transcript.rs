//! Running handshake transcript hashes.
//!
//! Every handshake message (4-byte header plus body) is fed, in wire
//! order, into each hash whose result is still needed by the negotiated
//! parameters. Nothing else is fed: ChangeCipherSpec, alerts, and record
//! headers are excluded. For a legacy SSLv2 ClientHello the canonicalized
//! input is fed instead (see the inbound driver).

use digest::Digest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use super::{CipherSuiteParams, HashAlg, HashAlgSet};
use crate::TlsVersion;

/// The seven hash states a TLS 1.0-1.2 handshake may need.
///
/// The MD5+SHA-1 concatenation is a distinct state, not derived from the
/// individual MD5 and SHA-1 states: it advances only when both are
/// individually required, so the three can diverge.
pub struct HandshakeHashes {
    md5: Md5,
    sha1: Sha1,
    md5_sha1: (Md5, Sha1),
    sha224: Sha224,
    sha256: Sha256,
    sha384: Sha384,
    sha512: Sha512,
}

impl HandshakeHashes {
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            md5_sha1: (Md5::new(), Sha1::new()),
            sha224: Sha224::new(),
            sha256: Sha256::new(),
            sha384: Sha384::new(),
            sha512: Sha512::new(),
        }
    }

    /// Feed `data` into a single hash state.
    pub fn update_alg(&mut self, alg: HashAlg, data: &[u8]) {
        match alg {
            HashAlg::Md5 => self.md5.update(data),
            HashAlg::Sha1 => self.sha1.update(data),
            HashAlg::Md5Sha1 => {
                self.md5_sha1.0.update(data);
                self.md5_sha1.1.update(data);
            }
            HashAlg::Sha224 => self.sha224.update(data),
            HashAlg::Sha256 => self.sha256.update(data),
            HashAlg::Sha384 => self.sha384.update(data),
            HashAlg::Sha512 => self.sha512.update(data),
        }
    }

    /// Snapshot the current digest without disturbing the running state.
    ///
    /// Handlers use this to read the transcript through but not including
    /// the message currently being processed.
    pub fn digest(&self, alg: HashAlg) -> Vec<u8> {
        match alg {
            HashAlg::Md5 => self.md5.clone().finalize().to_vec(),
            HashAlg::Sha1 => self.sha1.clone().finalize().to_vec(),
            HashAlg::Md5Sha1 => {
                let mut out = self.md5_sha1.0.clone().finalize().to_vec();
                out.extend_from_slice(&self.md5_sha1.1.clone().finalize());
                out
            }
            HashAlg::Sha224 => self.sha224.clone().finalize().to_vec(),
            HashAlg::Sha256 => self.sha256.clone().finalize().to_vec(),
            HashAlg::Sha384 => self.sha384.clone().finalize().to_vec(),
            HashAlg::Sha512 => self.sha512.clone().finalize().to_vec(),
        }
    }
}

impl Default for HandshakeHashes {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `alg` is still needed by the negotiated parameters.
///
/// Evaluated per update, not cached. Before negotiation every hash is in
/// play, since any could turn out to be needed. For TLS 1.0/1.1 the PRF
/// and legacy signatures need MD5 and SHA-1. For TLS 1.2 only the suite's
/// PRF hash plus any hash a handler has registered as pending for a
/// signature computation.
pub fn is_hash_required(
    params: Option<&CipherSuiteParams>,
    version: TlsVersion,
    pending_sig_hashes: HashAlgSet,
    alg: HashAlg,
) -> bool {
    if alg == HashAlg::Md5Sha1 {
        return is_hash_required(params, version, pending_sig_hashes, HashAlg::Md5)
            && is_hash_required(params, version, pending_sig_hashes, HashAlg::Sha1);
    }
    let params = match params {
        None => return true,
        Some(p) => p,
    };
    if version < TlsVersion::Tls12 {
        return matches!(alg, HashAlg::Md5 | HashAlg::Sha1);
    }
    alg == params.prf_hash || pending_sig_hashes.contains(alg)
}

/// Feed one range of transcript input into every still-required hash.
pub fn update_handshake_hashes(
    hashes: &mut HandshakeHashes,
    params: Option<&CipherSuiteParams>,
    version: TlsVersion,
    pending_sig_hashes: HashAlgSet,
    data: &[u8],
) {
    for alg in [
        HashAlg::Md5,
        HashAlg::Sha1,
        HashAlg::Md5Sha1,
        HashAlg::Sha224,
        HashAlg::Sha256,
        HashAlg::Sha384,
        HashAlg::Sha512,
    ] {
        if is_hash_required(params, version, pending_sig_hashes, alg) {
            hashes.update_alg(alg, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn params(suite: CipherSuite) -> CipherSuiteParams {
        CipherSuiteParams::from_suite(suite).unwrap()
    }

    #[test]
    fn test_known_digests() {
        let mut h = HandshakeHashes::new();
        h.update_alg(HashAlg::Md5, b"abc");
        h.update_alg(HashAlg::Sha1, b"abc");
        h.update_alg(HashAlg::Sha256, b"abc");
        assert_eq!(to_hex(&h.digest(HashAlg::Md5)), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            to_hex(&h.digest(HashAlg::Sha1)),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            to_hex(&h.digest(HashAlg::Sha256)),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_is_nondestructive() {
        let mut h = HandshakeHashes::new();
        h.update_alg(HashAlg::Sha256, b"hello");
        let d1 = h.digest(HashAlg::Sha256);
        let d2 = h.digest(HashAlg::Sha256);
        assert_eq!(d1, d2);
        h.update_alg(HashAlg::Sha256, b" world");
        assert_ne!(h.digest(HashAlg::Sha256), d1);
    }

    #[test]
    fn test_md5_sha1_concatenation() {
        let mut h = HandshakeHashes::new();
        h.update_alg(HashAlg::Md5Sha1, b"abc");
        let concat = h.digest(HashAlg::Md5Sha1);
        assert_eq!(concat.len(), 36);
        assert_eq!(
            to_hex(&concat[..16]),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            to_hex(&concat[16..]),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_all_hashes_required_before_negotiation() {
        for alg in [
            HashAlg::Md5,
            HashAlg::Sha1,
            HashAlg::Md5Sha1,
            HashAlg::Sha224,
            HashAlg::Sha256,
            HashAlg::Sha384,
            HashAlg::Sha512,
        ] {
            assert!(is_hash_required(
                None,
                TlsVersion::Tls12,
                HashAlgSet::default(),
                alg
            ));
        }
    }

    #[test]
    fn test_legacy_versions_require_md5_sha1_only() {
        let p = params(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA);
        for version in [TlsVersion::Tls10, TlsVersion::Tls11] {
            let empty = HashAlgSet::default();
            assert!(is_hash_required(Some(&p), version, empty, HashAlg::Md5));
            assert!(is_hash_required(Some(&p), version, empty, HashAlg::Sha1));
            assert!(is_hash_required(Some(&p), version, empty, HashAlg::Md5Sha1));
            assert!(!is_hash_required(Some(&p), version, empty, HashAlg::Sha256));
            assert!(!is_hash_required(Some(&p), version, empty, HashAlg::Sha384));
        }
    }

    #[test]
    fn test_tls12_requires_prf_hash_only() {
        let p = params(CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384);
        let empty = HashAlgSet::default();
        assert!(is_hash_required(Some(&p), TlsVersion::Tls12, empty, HashAlg::Sha384));
        assert!(!is_hash_required(Some(&p), TlsVersion::Tls12, empty, HashAlg::Sha256));
        assert!(!is_hash_required(Some(&p), TlsVersion::Tls12, empty, HashAlg::Md5));
        assert!(!is_hash_required(Some(&p), TlsVersion::Tls12, empty, HashAlg::Md5Sha1));
    }

    #[test]
    fn test_tls12_pending_signature_hash() {
        let p = params(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256);
        let mut pending = HashAlgSet::default();
        pending.insert(HashAlg::Sha512);
        assert!(is_hash_required(
            Some(&p),
            TlsVersion::Tls12,
            pending,
            HashAlg::Sha512
        ));
        assert!(is_hash_required(
            Some(&p),
            TlsVersion::Tls12,
            pending,
            HashAlg::Sha256
        ));
        assert!(!is_hash_required(
            Some(&p),
            TlsVersion::Tls12,
            pending,
            HashAlg::Sha384
        ));
        // Concatenation follows only when both halves are required.
        pending.insert(HashAlg::Md5);
        assert!(!is_hash_required(
            Some(&p),
            TlsVersion::Tls12,
            pending,
            HashAlg::Md5Sha1
        ));
        pending.insert(HashAlg::Sha1);
        assert!(is_hash_required(
            Some(&p),
            TlsVersion::Tls12,
            pending,
            HashAlg::Md5Sha1
        ));
    }

    #[test]
    fn test_update_respects_requirements() {
        let p = params(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256);
        let mut h = HandshakeHashes::new();
        update_handshake_hashes(
            &mut h,
            Some(&p),
            TlsVersion::Tls12,
            HashAlgSet::default(),
            b"abc",
        );
        // SHA-256 (the PRF hash) advanced; SHA-384 did not.
        assert_eq!(
            to_hex(&h.digest(HashAlg::Sha256)),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let untouched = HandshakeHashes::new();
        assert_eq!(h.digest(HashAlg::Sha384), untouched.digest(HashAlg::Sha384));
        assert_eq!(h.digest(HashAlg::Md5), untouched.digest(HashAlg::Md5));
    }
}
