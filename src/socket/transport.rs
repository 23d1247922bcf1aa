use crate::base::neterror::NetError;
use crate::socket::client::{PooledSocket, SocketType};
use crate::socket::connectjob::ConnectJob;
use crate::socket::dialer::{DialTarget, Dialer};
use crate::socket::idle::{HostId, IdleConnPool, IdleLimits};
use crate::socket::tls::TlsConfig;
use boring::ssl::SslConnector;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::Url;

/// Connection-management settings of a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub disable_keep_alives: bool,
    /// Idle connections across all hosts. 0 = no limit.
    pub max_idle_conns: usize,
    /// Dialing plus in-use connections per host. 0 = no limit.
    pub max_conns_per_host: usize,
    /// Idle connections per host. 0 = [`Self::DEFAULT_MAX_IDLE_CONNS_PER_HOST`].
    pub max_idle_conns_per_host: usize,
    /// How long a connection may sit idle. Zero = forever.
    pub idle_conn_timeout: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            disable_keep_alives: false,
            max_idle_conns: 100,
            max_conns_per_host: 0,
            max_idle_conns_per_host: 0,
            idle_conn_timeout: Duration::from_secs(90),
        }
    }
}

impl TransportSettings {
    pub const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 2;

    fn idle_limits(&self) -> IdleLimits {
        IdleLimits {
            max_idle: self.max_idle_conns,
            max_idle_per_host: match self.max_idle_conns_per_host {
                0 => Self::DEFAULT_MAX_IDLE_CONNS_PER_HOST,
                n => n,
            },
            max_conns_per_host: self.max_conns_per_host,
            idle_timeout: self.idle_conn_timeout,
        }
    }
}

/// A reusable outbound transport: dialing strategy, TLS settings and a set of
/// idle connections kept for reuse.
///
/// Configuration is fixed at construction. Share it behind an `Arc`; every
/// holder draws from the same idle connections.
pub struct Transport {
    settings: TransportSettings,
    tls: Option<Arc<TlsConfig>>,
    dialer: Dialer,
    connector: OnceCell<SslConnector>,
    idle: IdleConnPool,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("settings", &self.settings)
            .field("tls", &self.tls.is_some())
            .field("dialer", &self.dialer)
            .field("idle", &self.idle)
            .finish()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(TransportSettings::default(), None, Dialer::Direct)
    }
}

impl Transport {
    /// Build a transport. Nothing is dialed and no TLS context is created yet.
    pub fn new(settings: TransportSettings, tls: Option<Arc<TlsConfig>>, dialer: Dialer) -> Self {
        let idle = IdleConnPool::new(settings.idle_limits());
        Self { settings, tls, dialer, connector: OnceCell::new(), idle }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// TLS configuration in use; `None` means defaults.
    pub fn tls_config(&self) -> Option<&TlsConfig> {
        self.tls.as_deref()
    }

    pub fn dialer(&self) -> &Dialer {
        &self.dialer
    }

    /// Where a dial for `address` over `scheme` would go.
    pub fn dial_target(&self, scheme: &str, address: &str) -> DialTarget {
        self.dialer.target_for(scheme, address)
    }

    /// Check out a connection for `url`.
    ///
    /// Reuses an idle connection to the same (scheme, host, port) when keep-alives
    /// are on, otherwise dials through the dialer and, for `https`, runs a TLS
    /// handshake. Waits while the per-host connection limit is reached.
    pub async fn connect(&self, url: &Url) -> Result<PooledSocket, NetError> {
        let host = HostId::from_url(url);
        let slot = self.idle.acquire_slot(&host).await?;

        if !self.settings.disable_keep_alives {
            if let Some(socket) = self.idle.take(&host) {
                tracing::trace!(host = %host, "reusing idle connection");
                return Ok(PooledSocket::new(socket, host, true, slot));
            }
        }

        let target = self.dialer.resolve(url)?;
        let stream = ConnectJob::dial(&target).await?;

        let socket = if url.scheme() == "https" {
            let connector = self.connector().await?;
            ConnectJob::handshake(connector, host.host(), stream).await?
        } else {
            SocketType::Plain(stream)
        };

        Ok(PooledSocket::new(socket, host, false, slot))
    }

    /// Return a connection after use.
    ///
    /// Kept for reuse unless keep-alives are disabled, the peer closed it, it
    /// has unread data, or the idle limits are reached. Returns whether it was kept.
    pub fn release(&self, socket: PooledSocket) -> bool {
        if self.settings.disable_keep_alives {
            return false;
        }
        let (host, socket) = socket.into_parts();
        let kept = self.idle.put(host.clone(), socket);
        if !kept {
            tracing::trace!(host = %host, "dropping connection instead of keeping it idle");
        }
        kept
    }

    /// Drop idle connections past the idle timeout or closed by the peer.
    pub fn cleanup_idle(&self) {
        self.idle.cleanup();
    }

    pub fn idle_count(&self) -> usize {
        self.idle.idle_count()
    }

    pub fn idle_count_for(&self, url: &Url) -> usize {
        self.idle.idle_count_for(&HostId::from_url(url))
    }

    async fn connector(&self) -> Result<&SslConnector, NetError> {
        self.connector
            .get_or_try_init(|| async {
                match self.tls.as_deref() {
                    Some(tls) => tls.connector(),
                    None => TlsConfig::default().connector(),
                }
            })
            .await
    }
}
