//! # evalnet
//!
//! Outbound transport caching for policy evaluation.
//!
//! Rule evaluation issues many HTTP(S) calls, often to the same few services
//! with the same client certificates. `evalnet` hands every such call a
//! shared [`Transport`](socket::transport::Transport) so connections, TLS
//! contexts and dialers are reused instead of rebuilt per request.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use evalnet::socket::key::ConnParams;
//! use evalnet::socket::pool::TransportPool;
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = TransportPool::new();
//!     let url = Url::parse("http://localhost/v1/data?socket=/run/opa.sock").unwrap();
//!     let params = ConnParams::from_url(&url);
//!
//!     let transport = pool.get_or_create(None, Some(&url), Some(&params));
//!     let conn = transport.connect(&url).await.unwrap();
//!     // ... write the request, read the response ...
//!     transport.release(conn);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error definitions
//! - [`socket`] - Transport pool, transports, dialing and TLS

pub mod base;
pub mod socket;
