use crate::base::neterror::NetError;
use boring::pkey::PKey;
use boring::ssl::{SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode, SslVersion};
use boring::x509::X509;
use bytes::{BufMut, BytesMut};
use std::fmt;
use zeroize::Zeroizing;

/// A client identity: a DER certificate chain (leaf first) and its private key.
#[derive(Clone)]
pub struct Certificate {
    chain: Vec<Vec<u8>>,
    /// PKCS#8 or traditional DER private key (zeroized on drop)
    private_key: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("chain_len", &self.chain.len())
            .field("has_private_key", &self.private_key.is_some())
            .finish()
    }
}

impl Certificate {
    /// Create from DER-encoded certificates (leaf first) and an optional DER private key.
    pub fn from_der(chain: Vec<Vec<u8>>, private_key: Option<Vec<u8>>) -> Self {
        Self { chain, private_key: private_key.map(Zeroizing::new) }
    }

    /// Create from a PEM certificate chain and an optional PEM private key.
    pub fn from_pem(chain_pem: &[u8], key_pem: Option<&[u8]>) -> Result<Self, NetError> {
        let chain = X509::stack_from_pem(chain_pem)
            .map_err(|_| NetError::SslClientAuthCertBadFormat)?
            .iter()
            .map(|cert| cert.to_der())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| NetError::SslClientAuthCertBadFormat)?;
        if chain.is_empty() {
            return Err(NetError::SslClientAuthCertBadFormat);
        }

        let private_key = match key_pem {
            Some(pem) => {
                let key = PKey::private_key_from_pem(pem)
                    .map_err(|_| NetError::SslClientAuthCertBadFormat)?;
                let der = key
                    .private_key_to_der()
                    .map_err(|_| NetError::SslClientAuthCertBadFormat)?;
                Some(Zeroizing::new(der))
            }
            None => None,
        };

        Ok(Self { chain, private_key })
    }

    /// DER certificates, leaf first.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }
}

/// TLS settings attached to a transport.
///
/// Built and validated by the caller. Every field that changes the built
/// connector also identifies the configuration for transport reuse, see
/// [`TlsConfig::write_fingerprint`]. Private keys are the exception.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub certificates: Vec<Certificate>,
    /// Extra trust anchors (DER), added on top of the system store.
    pub root_certificates: Vec<Vec<u8>>,
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub alpn_protos: Vec<String>,
    pub insecure_skip_verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            certificates: Vec::new(),
            root_certificates: Vec::new(),
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            alpn_protos: vec!["http/1.1".to_string()],
            insecure_skip_verify: false,
        }
    }
}

impl TlsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client identity.
    pub fn with_certificate(mut self, cert: Certificate) -> Self {
        self.certificates.push(cert);
        self
    }

    /// Trust an extra root certificate (DER).
    pub fn with_root_certificate(mut self, der: Vec<u8>) -> Self {
        self.root_certificates.push(der);
        self
    }

    pub fn with_alpn_protos(mut self, protos: &[&str]) -> Self {
        self.alpn_protos = protos.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Skip server certificate verification.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.insecure_skip_verify = accept;
        self
    }

    /// Serialize everything that shapes the connector into `out`.
    ///
    /// Deterministic and order-preserving. Written in order: a count of client
    /// certificates, each chain as a count of length-prefixed DER blocks; a
    /// count of trust roots and their length-prefixed DER; the minimum and
    /// maximum protocol versions; a count of length-prefixed ALPN ids; the
    /// verification flag. Counts and lengths are big-endian `u64`. Private
    /// keys are not written since the leaf certificate already names them.
    pub fn write_fingerprint(&self, out: &mut BytesMut) {
        out.put_u64(self.certificates.len() as u64);
        for cert in &self.certificates {
            out.put_u64(cert.chain.len() as u64);
            for der in &cert.chain {
                put_block(out, der);
            }
        }

        out.put_u64(self.root_certificates.len() as u64);
        for der in &self.root_certificates {
            put_block(out, der);
        }

        out.put_u16(version_code(self.min_version));
        out.put_u16(version_code(self.max_version));

        out.put_u64(self.alpn_protos.len() as u64);
        for proto in &self.alpn_protos {
            put_block(out, proto.as_bytes());
        }

        out.put_u8(u8::from(self.insecure_skip_verify));
    }

    /// Build a BoringSSL connector from this configuration.
    pub fn connector(&self) -> Result<SslConnector, NetError> {
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
        self.apply_to_builder(&mut builder)?;
        Ok(builder.build())
    }

    /// Apply this configuration to an SSL connector builder.
    pub fn apply_to_builder(&self, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        if let Some(min) = self.min_version {
            builder.set_min_proto_version(Some(min)).map_err(|_| NetError::SslProtocolError)?;
        }
        if let Some(max) = self.max_version {
            builder.set_max_proto_version(Some(max)).map_err(|_| NetError::SslProtocolError)?;
        }

        if !self.alpn_protos.is_empty() {
            let mut alpn_wire = Vec::new();
            for proto in &self.alpn_protos {
                if proto.is_empty() || proto.len() > 255 {
                    return Err(NetError::SslProtocolError);
                }
                alpn_wire.push(proto.len() as u8);
                alpn_wire.extend_from_slice(proto.as_bytes());
            }
            builder.set_alpn_protos(&alpn_wire).map_err(|_| NetError::SslProtocolError)?;
        }

        for der in &self.root_certificates {
            let root = X509::from_der(der).map_err(|_| NetError::SslServerCertBadFormat)?;
            builder.cert_store_mut().add_cert(root).map_err(|_| NetError::SslServerCertBadFormat)?;
        }

        // BoringSSL presents a single identity; the first one wins.
        if let Some(identity) = self.certificates.first() {
            Self::apply_identity(identity, builder)?;
        }

        if self.insecure_skip_verify {
            builder.set_verify(SslVerifyMode::NONE);
        } else {
            builder.set_verify(SslVerifyMode::PEER);
        }

        Ok(())
    }

    fn apply_identity(cert: &Certificate, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        let (leaf, intermediates) =
            cert.chain.split_first().ok_or(NetError::SslClientAuthCertBadFormat)?;
        let key = cert.private_key.as_ref().ok_or(NetError::SslClientAuthCertNoPrivateKey)?;

        let leaf = X509::from_der(leaf).map_err(|_| NetError::SslClientAuthCertBadFormat)?;
        builder.set_certificate(&leaf).map_err(|_| NetError::BadSslClientAuthCert)?;

        for der in intermediates {
            let intermediate =
                X509::from_der(der).map_err(|_| NetError::SslClientAuthCertBadFormat)?;
            builder.add_extra_chain_cert(intermediate).map_err(|_| NetError::BadSslClientAuthCert)?;
        }

        let key = PKey::private_key_from_der(key).map_err(|_| NetError::SslClientAuthCertBadFormat)?;
        builder.set_private_key(&key).map_err(|_| NetError::BadSslClientAuthCert)?;
        builder.check_private_key().map_err(|_| NetError::BadSslClientAuthCert)?;

        Ok(())
    }

    /// Check if SNI should be set for this host.
    /// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
    pub fn should_set_sni(host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        host.parse::<std::net::IpAddr>().is_err()
    }
}

fn put_block(out: &mut BytesMut, bytes: &[u8]) {
    out.put_u64(bytes.len() as u64);
    out.put_slice(bytes);
}

/// Wire value of a protocol version bound; 0 when unset.
fn version_code(version: Option<SslVersion>) -> u16 {
    match version {
        None => 0,
        Some(v) if v == SslVersion::SSL3 => 0x0300,
        Some(v) if v == SslVersion::TLS1 => 0x0301,
        Some(v) if v == SslVersion::TLS1_1 => 0x0302,
        Some(v) if v == SslVersion::TLS1_2 => 0x0303,
        Some(v) if v == SslVersion::TLS1_3 => 0x0304,
        Some(_) => 0xffff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint_bytes(config: &TlsConfig) -> Vec<u8> {
        let mut out = BytesMut::new();
        config.write_fingerprint(&mut out);
        out.to_vec()
    }

    #[test]
    fn test_identity_is_deterministic() {
        let config = TlsConfig::new()
            .with_certificate(Certificate::from_der(vec![vec![1, 2, 3]], Some(vec![9])))
            .with_root_certificate(vec![7, 7]);

        assert_eq!(fingerprint_bytes(&config), fingerprint_bytes(&config.clone()));
    }

    #[test]
    fn test_identity_ignores_private_key() {
        let a = TlsConfig::new().with_certificate(Certificate::from_der(vec![vec![1]], Some(vec![1])));
        let b = TlsConfig::new().with_certificate(Certificate::from_der(vec![vec![1]], Some(vec![2])));
        assert_eq!(fingerprint_bytes(&a), fingerprint_bytes(&b));
    }

    #[test]
    fn test_identity_distinguishes_chain_boundaries() {
        // One chain of two certs vs. two chains of one cert each.
        let joined = TlsConfig::new()
            .with_certificate(Certificate::from_der(vec![vec![1], vec![2]], None));
        let split = TlsConfig::new()
            .with_certificate(Certificate::from_der(vec![vec![1]], None))
            .with_certificate(Certificate::from_der(vec![vec![2]], None));
        assert_ne!(fingerprint_bytes(&joined), fingerprint_bytes(&split));
    }

    #[test]
    fn test_identity_distinguishes_roots_from_certificates() {
        let as_cert = TlsConfig::new().with_certificate(Certificate::from_der(vec![vec![5]], None));
        let as_root = TlsConfig::new().with_root_certificate(vec![5]);
        assert_ne!(fingerprint_bytes(&as_cert), fingerprint_bytes(&as_root));
    }

    #[test]
    fn test_default_fingerprint_layout() {
        let mut expected = vec![0u8; 16];
        expected.extend_from_slice(&[0x03, 0x03, 0x03, 0x04]);
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 8]);
        expected.extend_from_slice(b"http/1.1");
        expected.push(0);
        assert_eq!(fingerprint_bytes(&TlsConfig::default()), expected);
    }

    #[test]
    fn test_fingerprint_covers_connector_settings() {
        let base = fingerprint_bytes(&TlsConfig::new());

        let insecure = TlsConfig::new().danger_accept_invalid_certs(true);
        assert_ne!(fingerprint_bytes(&insecure), base);

        let h2 = TlsConfig::new().with_alpn_protos(&["h2"]);
        assert_ne!(fingerprint_bytes(&h2), base);

        let mut tls13_only = TlsConfig::new();
        tls13_only.min_version = Some(SslVersion::TLS1_3);
        assert_ne!(fingerprint_bytes(&tls13_only), base);

        let mut unbounded = TlsConfig::new();
        unbounded.max_version = None;
        assert_ne!(fingerprint_bytes(&unbounded), base);
    }

    #[test]
    fn test_alpn_list_boundaries() {
        let one = TlsConfig::new().with_alpn_protos(&["h2http/1.1"]);
        let two = TlsConfig::new().with_alpn_protos(&["h2", "http/1.1"]);
        assert_ne!(fingerprint_bytes(&one), fingerprint_bytes(&two));
    }

    #[test]
    fn test_default_connector_builds() {
        assert!(TlsConfig::default().connector().is_ok());
    }

    #[test]
    fn test_bad_root_rejected() {
        let config = TlsConfig::new().with_root_certificate(b"not a certificate".to_vec());
        assert_eq!(config.connector().err(), Some(NetError::SslServerCertBadFormat));
    }

    #[test]
    fn test_identity_without_key_rejected() {
        let config = TlsConfig::new().with_certificate(Certificate::from_der(vec![vec![1]], None));
        assert_eq!(config.connector().err(), Some(NetError::SslClientAuthCertNoPrivateKey));
    }

    #[test]
    fn test_oversized_alpn_rejected() {
        let long = "x".repeat(256);
        let config = TlsConfig::new().with_alpn_protos(&[long.as_str()]);
        assert_eq!(config.connector().err(), Some(NetError::SslProtocolError));
    }

    #[test]
    fn test_sni_skipped_for_ip_literals() {
        assert!(TlsConfig::should_set_sni("example.com"));
        assert!(!TlsConfig::should_set_sni("127.0.0.1"));
        assert!(!TlsConfig::should_set_sni("[::1]"));
    }

    fn self_signed_pem() -> (Vec<u8>, Vec<u8>) {
        use boring::asn1::Asn1Time;
        use boring::ec::{EcGroup, EcKey};
        use boring::hash::MessageDigest;
        use boring::nid::Nid;
        use boring::x509::{X509Builder, X509NameBuilder};

        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "evalnet-test").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        let cert = builder.build();

        (cert.to_pem().unwrap(), key.private_key_to_pem_pkcs8().unwrap())
    }

    #[test]
    fn test_pem_identity_builds_connector() {
        let (cert_pem, key_pem) = self_signed_pem();
        let cert = Certificate::from_pem(&cert_pem, Some(&key_pem)).unwrap();
        assert_eq!(cert.chain().len(), 1);
        assert!(cert.has_private_key());

        let config = TlsConfig::new()
            .with_certificate(cert.clone())
            .with_root_certificate(cert.chain()[0].clone());
        assert!(config.connector().is_ok());
    }

    #[test]
    fn test_bad_pem_rejected() {
        assert_eq!(
            Certificate::from_pem(b"garbage", None).err(),
            Some(NetError::SslClientAuthCertBadFormat)
        );
    }

    #[test]
    fn test_certificate_debug_hides_key() {
        let cert = Certificate::from_der(vec![vec![1]], Some(vec![0xde, 0xad]));
        let rendered = format!("{:?}", cert);
        assert!(rendered.contains("has_private_key: true"));
        assert!(!rendered.contains("222"));
    }
}
