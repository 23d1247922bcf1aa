//! Base types and error handling.
//!
//! - [`NetError`](neterror::NetError): Network error codes matching Chromium's `net_error_list.h`
//! - [`context`]: `io::Error` to `NetError` conversion with host/port context

pub mod context;
pub mod neterror;
