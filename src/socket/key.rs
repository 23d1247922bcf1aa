//! Transport cache keys.
//!
//! A [`TransportKey`] fingerprints the inputs that decide whether a cached
//! transport may serve a request. Equal keys imply the transport is safe to
//! reuse.

use crate::socket::tls::TlsConfig;
use bytes::{BufMut, Bytes, BytesMut};
use url::Url;

const TAG_TLS: u8 = 0x01;
const TAG_SCHEME: u8 = 0x02;
const TAG_SOCKET: u8 = 0x03;

/// Query-style connection parameters supplied with a destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnParams {
    pairs: Vec<(String, String)>,
}

impl ConnParams {
    /// Parameter naming a side-channel dial target.
    pub const SOCKET: &'static str = "socket";

    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters from a URL's query string.
    pub fn from_url(url: &Url) -> Self {
        url.query_pairs().into_owned().collect()
    }

    /// Parameters from a raw `a=b&c=d` query string.
    pub fn from_query(query: &str) -> Self {
        url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.pairs.push((name.to_string(), value.to_string()));
        self
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Side-channel dial target. Empty values count as absent.
    pub fn socket(&self) -> Option<&str> {
        self.get(Self::SOCKET).filter(|s| !s.is_empty())
    }
}

impl FromIterator<(String, String)> for ConnParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self { pairs: iter.into_iter().collect() }
    }
}

/// Opaque fingerprint of (TLS configuration, destination scheme, side-channel target).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportKey(Bytes);

impl TransportKey {
    /// Derive the key for a request.
    ///
    /// Components are written in a fixed order (TLS, scheme, socket), each as a
    /// tag byte, a big-endian `u64` length and the bytes. Absent components
    /// write nothing, so an absent TLS config and a present default one give
    /// different keys.
    pub fn derive(
        tls: Option<&TlsConfig>,
        destination: Option<&Url>,
        params: Option<&ConnParams>,
    ) -> Self {
        let mut buf = BytesMut::new();

        if let Some(tls) = tls {
            let mut material = BytesMut::new();
            tls.write_fingerprint(&mut material);
            put_segment(&mut buf, TAG_TLS, &material);
        }
        if let Some(url) = destination {
            put_segment(&mut buf, TAG_SCHEME, url.scheme().as_bytes());
        }
        if let Some(socket) = params.and_then(ConnParams::socket) {
            put_segment(&mut buf, TAG_SOCKET, socket.as_bytes());
        }

        TransportKey(buf.freeze())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn put_segment(buf: &mut BytesMut, tag: u8, bytes: &[u8]) {
    buf.put_u8(tag);
    buf.put_u64(bytes.len() as u64);
    buf.put_slice(bytes);
}
