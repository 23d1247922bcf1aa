//! Transports and the pool that caches them.
//!
//! - [`pool`]: [`TransportPool`](pool::TransportPool), the keyed transport cache
//! - [`key`]: cache key derivation and connection parameters
//! - [`transport`]: a transport with its idle connections
//! - [`dialer`]: direct vs. side-channel dialing
//! - [`connectjob`]: DNS → TCP/Unix → TLS connection flow
//! - [`tls`]: TLS configuration with BoringSSL

pub mod client;
pub mod connectjob;
pub mod dialer;
pub mod idle;
pub mod key;
pub mod pool;
pub mod tls;
pub mod transport;
