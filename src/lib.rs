//! # codegrant
//!
//! An OAuth2 authorization code grant engine, for use inside a host web application,
//! featuring a set of configurable and pluggable back-ends.
//!
//! ## About
//!
//! `codegrant` implements the state machine and token lifecycle of the authorization code
//! grant ([rfc6749 section 4.1]): client verification, one-time-use authorization codes
//! with replay detection and cascaded revocation, access and refresh token issuance with
//! rotation, scope enforcement, and bearer header verification. The host application keeps
//! ownership of everything around it: http routing, the login page and session, the
//! consent ui, and any persistent database.
//!
//! The interface is designed around traits in both directions. Towards the back-end, a
//! [`Registrar`] answers client lookups, a [`Store`] keeps code and token records, and an
//! [`OwnerBridge`] reports login and consent decisions; there is a simple, in-memory
//! implementation provided for each of those. Towards the host, the [`GrantEngine`]
//! exposes one operation per protocol step and returns structured results, never panicking
//! on protocol failures.
//!
//! ## Token modes
//!
//! Two interchangeable token formats are supported, selected at engine construction:
//!
//! * **Opaque** (the default): tokens are high entropy random strings and the store keeps
//!   the authoritative record. Tokens can be revoked by deleting their record.
//! * **Signed**: configuring a `jwt_secret` switches to self contained tokens signed with
//!   HMAC-SHA256. The store is bypassed entirely; in exchange, tokens cannot be revoked
//!   unless a [`Denylist`] is configured on top.
//!
//! ## Example
//!
//! ```
//! use codegrant::code_grant::engine::{AuthCodeRequest, CodeRedemption, GrantEngine};
//! use codegrant::primitives::registrar::{Client, ClientMap};
//!
//! let mut clients = ClientMap::new();
//! clients.register_client(
//!     Client::confidential("TrendyNewService", b"boo")
//!         .allow("post_images")
//!         .allow("annoy_friends"),
//! );
//!
//! let engine = GrantEngine::builder().clients(clients).build().unwrap();
//!
//! let scopes = "post_images".parse().unwrap();
//! engine.verify_client("TrendyNewService", &scopes).unwrap();
//!
//! let code = engine
//!     .issue_auth_code(&AuthCodeRequest {
//!         client_id: "TrendyNewService",
//!         user_id: Some("user-1"),
//!         scopes,
//!         redirect_uri: Some("https://client.example/endpoint"),
//!     })
//!     .unwrap();
//!
//! let authorized = engine
//!     .verify_auth_code(&CodeRedemption {
//!         client_id: "TrendyNewService",
//!         client_secret: Some(b"boo"),
//!         code: &code,
//!         redirect_uri: Some("https://client.example/endpoint"),
//!     })
//!     .unwrap();
//!
//! let issued = engine.issue_access_token(authorized).unwrap();
//! assert_ne!(issued.access_token, issued.refresh_token);
//! ```
//!
//! [rfc6749 section 4.1]: https://tools.ietf.org/html/rfc6749#section-4.1
//! [`Registrar`]: primitives/registrar/trait.Registrar.html
//! [`Store`]: primitives/store/trait.Store.html
//! [`Denylist`]: primitives/store/trait.Denylist.html
//! [`OwnerBridge`]: code_grant/bridge/trait.OwnerBridge.html
//! [`GrantEngine`]: code_grant/engine/struct.GrantEngine.html
#![warn(missing_docs)]

pub mod code_grant;
pub mod primitives;

pub use code_grant::engine::{GrantEngine, GrantEngineBuilder};
pub use code_grant::error::{ErrorKind, GrantError};
