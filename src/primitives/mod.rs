//! A collection of primitives pluggable into the grant engine.
//!
//! A primitive is the smallest independent unit of policy used while processing a grant.
//! The engine combines a [`Registrar`] for client records, a [`Store`] for token records
//! and a codec for the token strings themselves. There is a simple, in-memory
//! implementation provided for each of those; more complex deployments substitute their
//! own trait implementation, for example a database backed store.
//!
//! [`Registrar`]: registrar/trait.Registrar.html
//! [`Store`]: store/trait.Store.html

use chrono::DateTime;
use chrono::Utc;

pub mod codec;
pub mod grant;
pub mod registrar;
pub mod scope;
pub mod store;

/// Instant in time used for expiry bookkeeping (Utc).
pub type Time = DateTime<Utc>;

/// Commonly used primitives for hosts and back-ends.
pub mod prelude {
    pub use super::codec::{JwtCodec, OpaqueCodec};
    pub use super::grant::{TokenDescriptor, TokenKind};
    pub use super::registrar::{Client, ClientMap, Registrar, ScopeMap, SecretPolicy};
    pub use super::scope::ScopeSet;
    pub use super::store::{Denylist, MemoryDenylist, MemoryStore, Store};
}
