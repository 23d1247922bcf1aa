use crate::socket::dialer::Dialer;
use crate::socket::key::{ConnParams, TransportKey};
use crate::socket::tls::TlsConfig;
use crate::socket::transport::{Transport, TransportSettings};
use dashmap::DashMap;
use serde::{Deserialize, Deserializer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use url::Url;

/// Process-wide settings of a [`TransportPool`], fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Cache transports and keep connections alive.
    pub enabled: bool,
    pub max_idle_conns: usize,
    pub max_conns_per_host: usize,
    pub max_idle_conns_per_host: usize,
    /// Seconds when deserialized.
    #[serde(deserialize_with = "duration_from_secs")]
    pub idle_conn_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_idle_conns: 100,
            max_conns_per_host: 100,
            max_idle_conns_per_host: 100,
            idle_conn_timeout: Duration::from_secs(90),
        }
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }
}

fn duration_from_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

/// Builder for `PoolConfig`.
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self { config: PoolConfig::default() }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn max_idle_conns(mut self, n: usize) -> Self {
        self.config.max_idle_conns = n;
        self
    }

    pub fn max_conns_per_host(mut self, n: usize) -> Self {
        self.config.max_conns_per_host = n;
        self
    }

    pub fn max_idle_conns_per_host(mut self, n: usize) -> Self {
        self.config.max_idle_conns_per_host = n;
        self
    }

    pub fn idle_conn_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_conn_timeout = timeout;
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}

/// Keyed cache of reusable transports.
///
/// Calls whose (TLS configuration, destination scheme, side-channel
/// target) derive the same [`TransportKey`] share one `Arc<Transport>`.
/// Entries are never evicted. Clones share the same cache.
///
/// A first request for a key builds its transport inside a per-key
/// [`OnceLock`]: concurrent first callers for that key wait for the single
/// construction, callers for other keys are not held up by it.
#[derive(Clone)]
pub struct TransportPool {
    config: PoolConfig,
    transports: Arc<DashMap<TransportKey, Arc<OnceLock<Arc<Transport>>>>>,
    created: Arc<AtomicUsize>,
}

impl std::fmt::Debug for TransportPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPool")
            .field("config", &self.config)
            .field("cached", &self.len())
            .field("created", &self.created_count())
            .finish()
    }
}

impl Default for TransportPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportPool {
    /// Pool with the default configuration (enabled, 100/100/100, 90s).
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        Self { config, transports: Arc::new(DashMap::new()), created: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Return the transport for this combination, building it on first use.
    ///
    /// With pooling disabled every call builds a fresh transport with
    /// keep-alives off and nothing is cached.
    pub fn get_or_create(
        &self,
        tls: Option<&TlsConfig>,
        destination: Option<&Url>,
        params: Option<&ConnParams>,
    ) -> Arc<Transport> {
        if !self.config.enabled {
            return Arc::new(self.create_transport(tls, destination, params));
        }

        let key = TransportKey::derive(tls, destination, params);

        // Read lock only on the hit path; the guard must be gone before `entry`.
        let existing = self.transports.get(&key).map(|cell| Arc::clone(cell.value()));
        let cell = match existing {
            Some(cell) => cell,
            None => Arc::clone(self.transports.entry(key).or_default().value()),
        };

        Arc::clone(cell.get_or_init(|| Arc::new(self.create_transport(tls, destination, params))))
    }

    fn create_transport(
        &self,
        tls: Option<&TlsConfig>,
        destination: Option<&Url>,
        params: Option<&ConnParams>,
    ) -> Transport {
        self.created.fetch_add(1, Ordering::Relaxed);

        let scheme = destination.map(Url::scheme).unwrap_or_default();
        let socket = params.and_then(ConnParams::socket);
        tracing::debug!(
            destination = destination.map(Url::as_str).unwrap_or("<none>"),
            socket = socket.unwrap_or("<none>"),
            tls = tls.is_some(),
            "creating transport"
        );

        let dialer = match socket {
            Some(target) => Dialer::side_channel(scheme, target),
            None => Dialer::Direct,
        };

        let settings = TransportSettings {
            disable_keep_alives: !self.config.enabled,
            max_idle_conns: self.config.max_idle_conns,
            max_conns_per_host: self.config.max_conns_per_host,
            max_idle_conns_per_host: self.config.max_idle_conns_per_host,
            idle_conn_timeout: self.config.idle_conn_timeout,
        };

        Transport::new(settings, tls.cloned().map(Arc::new), dialer)
    }

    /// Number of cached transports.
    pub fn len(&self) -> usize {
        self.transports.iter().filter(|entry| entry.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transports built by this pool so far, cached or not.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Run idle-connection cleanup on every cached transport.
    pub fn cleanup_idle_connections(&self) {
        for entry in self.transports.iter() {
            if let Some(transport) = entry.value().get() {
                transport.cleanup_idle();
            }
        }
    }

    /// Start a background task that periodically cleans up idle connections.
    /// Must be called from within a tokio runtime.
    pub fn start_cleanup_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                pool.cleanup_idle_connections();
            }
        })
    }
}
