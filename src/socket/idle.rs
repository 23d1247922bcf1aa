//! Per-transport idle connection set.
//!
//! Connections are grouped by (scheme, host, port). Each group keeps a LIFO
//! stack of idle sockets and, when a per-host connection limit is set, a
//! semaphore bounding how many sockets may be checked out at once.

use crate::base::neterror::NetError;
use crate::socket::client::{SocketType, StreamSocket};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Identifies a connection group (scheme, host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostId {
    scheme: String,
    host: String,
    port: u16,
}

impl HostId {
    /// Host and port are optional so side-channel URLs such as
    /// `unix://localhost/v1/data` still map to a group.
    pub fn from_url(url: &Url) -> Self {
        HostId {
            scheme: url.scheme().to_string(),
            host: url.host_str().unwrap_or_default().to_string(),
            port: url.port_or_known_default().unwrap_or(0),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Idle socket with metadata for timeout tracking.
struct IdleSocket {
    socket: SocketType,
    /// When this socket was returned to the pool
    start_time: Instant,
}

struct Group {
    idle_sockets: VecDeque<IdleSocket>,
    slots: Option<Arc<Semaphore>>,
}

impl Group {
    fn new(max_conns: usize) -> Self {
        Self {
            idle_sockets: VecDeque::new(),
            slots: (max_conns > 0).then(|| Arc::new(Semaphore::new(max_conns))),
        }
    }

    /// Anyone holding the semaphore besides the group: a checked-out permit
    /// or a caller between slot lookup and acquisition.
    fn slots_in_use(&self) -> bool {
        self.slots.as_ref().is_some_and(|s| Arc::strong_count(s) > 1)
    }
}

/// Limits for an [`IdleConnPool`]. Zero means "no limit" except for
/// `max_idle_per_host`, which the caller resolves before construction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IdleLimits {
    pub max_idle: usize,
    pub max_idle_per_host: usize,
    pub max_conns_per_host: usize,
    pub idle_timeout: Duration,
}

pub(crate) struct IdleConnPool {
    limits: IdleLimits,
    groups: DashMap<HostId, Group>,
    total_idle: AtomicUsize,
}

impl fmt::Debug for IdleConnPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleConnPool")
            .field("limits", &self.limits)
            .field("total_idle", &self.total_idle.load(Ordering::Relaxed))
            .finish()
    }
}

impl IdleConnPool {
    pub fn new(limits: IdleLimits) -> Self {
        Self { limits, groups: DashMap::new(), total_idle: AtomicUsize::new(0) }
    }

    /// Wait for a per-host connection slot. `None` when connections per host are unlimited.
    pub async fn acquire_slot(&self, host: &HostId) -> Result<Option<OwnedSemaphorePermit>, NetError> {
        match self.slots_for(host) {
            Some(slots) => slots
                .acquire_owned()
                .await
                .map(Some)
                .map_err(|_| NetError::ConnectionAborted),
            None => Ok(None),
        }
    }

    /// The group's slot semaphore, creating the group if needed. The clone is
    /// taken under the entry lock, so `cleanup` never sees the group unused
    /// while the returned handle is alive.
    fn slots_for(&self, host: &HostId) -> Option<Arc<Semaphore>> {
        self.groups
            .entry(host.clone())
            .or_insert_with(|| Group::new(self.limits.max_conns_per_host))
            .slots
            .clone()
    }

    /// Pop the most recently returned usable socket for `host`.
    /// Expired or dead sockets found on the way are dropped.
    pub fn take(&self, host: &HostId) -> Option<SocketType> {
        let mut group = self.groups.get_mut(host)?;
        let now = Instant::now();

        while let Some(mut idle) = group.idle_sockets.pop_back() {
            self.total_idle.fetch_sub(1, Ordering::Relaxed);
            if !self.is_expired(&idle, now) && idle.socket.is_connected_and_idle() {
                return Some(idle.socket);
            }
        }
        None
    }

    /// Offer a socket back. Returns false when it was dropped instead.
    pub fn put(&self, host: HostId, mut socket: SocketType) -> bool {
        if !socket.is_connected_and_idle() {
            return false;
        }

        let max_idle = self.limits.max_idle;
        let reserved = self.total_idle.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (max_idle == 0 || n < max_idle).then_some(n + 1)
        });
        if reserved.is_err() {
            return false;
        }

        let mut group = self
            .groups
            .entry(host)
            .or_insert_with(|| Group::new(self.limits.max_conns_per_host));
        if group.idle_sockets.len() >= self.limits.max_idle_per_host {
            self.total_idle.fetch_sub(1, Ordering::Relaxed);
            return false;
        }

        group.idle_sockets.push_back(IdleSocket { socket, start_time: Instant::now() });
        true
    }

    /// Drop idle sockets past the idle timeout or no longer connected,
    /// and forget groups with nothing idle and nothing checked out.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut groups_to_remove = Vec::new();

        for mut entry in self.groups.iter_mut() {
            let group = entry.value_mut();
            let before = group.idle_sockets.len();
            group
                .idle_sockets
                .retain_mut(|idle| !self.is_expired(idle, now) && idle.socket.is_connected_and_idle());
            self.total_idle.fetch_sub(before - group.idle_sockets.len(), Ordering::Relaxed);

            if group.idle_sockets.is_empty() && !group.slots_in_use() {
                groups_to_remove.push(entry.key().clone());
            }
        }

        for host in groups_to_remove {
            self.groups
                .remove_if(&host, |_, group| group.idle_sockets.is_empty() && !group.slots_in_use());
        }
    }

    pub fn idle_count(&self) -> usize {
        self.total_idle.load(Ordering::Relaxed)
    }

    pub fn idle_count_for(&self, host: &HostId) -> usize {
        self.groups.get(host).map(|g| g.idle_sockets.len()).unwrap_or(0)
    }

    fn is_expired(&self, idle: &IdleSocket, now: Instant) -> bool {
        let timeout = self.limits.idle_timeout;
        !timeout.is_zero() && now.duration_since(idle.start_time) >= timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_id_default_ports() {
        let url = Url::parse("https://example.com/path").unwrap();
        let id = HostId::from_url(&url);
        assert_eq!(id.to_string(), "https://example.com:443");
    }

    #[test]
    fn test_host_id_without_host() {
        let url = Url::parse("unix:///v1/data").unwrap();
        let id = HostId::from_url(&url);
        assert_eq!(id.host(), "");
        assert_eq!(id.to_string(), "unix://:0");
    }

    #[tokio::test]
    async fn test_unlimited_conns_need_no_slot() {
        let pool = IdleConnPool::new(IdleLimits {
            max_idle: 0,
            max_idle_per_host: 2,
            max_conns_per_host: 0,
            idle_timeout: Duration::ZERO,
        });
        let host = HostId::from_url(&Url::parse("http://example.com").unwrap());
        assert!(pool.acquire_slot(&host).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_slots_bound_checked_out_connections() {
        let pool = IdleConnPool::new(IdleLimits {
            max_idle: 0,
            max_idle_per_host: 2,
            max_conns_per_host: 1,
            idle_timeout: Duration::ZERO,
        });
        let host = HostId::from_url(&Url::parse("http://example.com").unwrap());

        let first = pool.acquire_slot(&host).await.unwrap();
        assert!(first.is_some());

        let second =
            tokio::time::timeout(Duration::from_millis(50), pool.acquire_slot(&host)).await;
        assert!(second.is_err(), "second slot should wait while the first is held");

        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(50), pool.acquire_slot(&host)).await;
        assert!(matches!(third, Ok(Ok(Some(_)))));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_groups_with_checked_out_slots() {
        let pool = IdleConnPool::new(IdleLimits {
            max_idle: 0,
            max_idle_per_host: 2,
            max_conns_per_host: 1,
            idle_timeout: Duration::ZERO,
        });
        let host = HostId::from_url(&Url::parse("http://example.com").unwrap());
        let slot = pool.acquire_slot(&host).await.unwrap();

        pool.cleanup();
        assert!(pool.groups.contains_key(&host));

        drop(slot);
        pool.cleanup();
        assert!(!pool.groups.contains_key(&host));
    }

    #[tokio::test]
    async fn test_cleanup_between_lookup_and_acquire_keeps_limit() {
        let pool = IdleConnPool::new(IdleLimits {
            max_idle: 0,
            max_idle_per_host: 2,
            max_conns_per_host: 1,
            idle_timeout: Duration::ZERO,
        });
        let host = HostId::from_url(&Url::parse("http://example.com").unwrap());

        // A connect that looked up its slots but has not acquired yet.
        let pending = pool.slots_for(&host).unwrap();
        pool.cleanup();
        assert!(pool.groups.contains_key(&host));

        let held = pending.acquire_owned().await.unwrap();
        let other = tokio::time::timeout(Duration::from_millis(50), pool.acquire_slot(&host)).await;
        assert!(other.is_err(), "a second connection must wait on the same semaphore");

        drop(held);
        let other = tokio::time::timeout(Duration::from_millis(50), pool.acquire_slot(&host)).await;
        assert!(matches!(other, Ok(Ok(Some(_)))));
    }
}
