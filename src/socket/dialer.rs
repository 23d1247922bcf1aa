//! Dialing strategy for a transport.
//!
//! A transport either dials the host of each request ([`Dialer::Direct`]) or,
//! when built with a side-channel target, always dials that one fixed target
//! ([`Dialer::Fixed`]) whatever address the request names.

use crate::base::neterror::NetError;
use std::fmt;
use std::path::Path;
use url::Url;

/// Network family used for a dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Unix,
}

impl Network {
    /// Family for a side-channel target: Unix when the scheme says so or the
    /// target is an absolute filesystem path, TCP otherwise.
    pub fn for_side_channel(scheme: &str, target: &str) -> Self {
        if scheme.eq_ignore_ascii_case("unix") || Path::new(target).is_absolute() {
            Network::Unix
        } else {
            Network::Tcp
        }
    }
}

/// Where a connection is actually opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    /// Scheme of the destination the target was derived from.
    pub scheme: String,
    pub network: Network,
    /// `host:port` for TCP, a filesystem path for Unix.
    pub address: String,
}

impl fmt::Display for DialTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.network {
            Network::Tcp => write!(f, "tcp://{}", self.address),
            Network::Unix => write!(f, "unix:{}", self.address),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Dialer {
    /// Dial the requested address.
    #[default]
    Direct,
    /// Dial this target for every request.
    Fixed(DialTarget),
}

impl Dialer {
    /// Dialer that redirects every connection to `target`.
    pub fn side_channel(scheme: &str, target: &str) -> Self {
        Dialer::Fixed(DialTarget {
            scheme: scheme.to_string(),
            network: Network::for_side_channel(scheme, target),
            address: target.to_string(),
        })
    }

    pub fn is_overridden(&self) -> bool {
        matches!(self, Dialer::Fixed(_))
    }

    /// Target for a request to `address` over `scheme`.
    pub fn target_for(&self, scheme: &str, address: &str) -> DialTarget {
        match self {
            Dialer::Direct => DialTarget {
                scheme: scheme.to_string(),
                network: Network::Tcp,
                address: address.to_string(),
            },
            Dialer::Fixed(target) => target.clone(),
        }
    }

    /// Target for a request to `url`. Direct dialing needs a host and a port.
    pub fn resolve(&self, url: &Url) -> Result<DialTarget, NetError> {
        match self {
            Dialer::Direct => {
                let host = url.host_str().filter(|h| !h.is_empty()).ok_or(NetError::InvalidUrl)?;
                let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;
                Ok(self.target_for(url.scheme(), &format!("{}:{}", host, port)))
            }
            Dialer::Fixed(target) => Ok(target.clone()),
        }
    }
}
