//! The authorization code grant flow, as defined in [rfc6749 section 4.1].
//!
//! [rfc6749 section 4.1]: https://tools.ietf.org/html/rfc6749#section-4.1

pub mod bridge;
pub mod engine;
pub mod error;
