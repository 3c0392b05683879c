//! Stores keep the authoritative records for codes and tokens in opaque mode.
//!
//! The store owns every record; the grant engine borrows them through the operations below
//! and never caches. A hook based store supplied by the host implements the same trait,
//! typically backed by a database, and must provide the same atomicity: the in-memory
//! implementation serializes all operations through a single mutex, a remote one would use
//! a transaction.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use super::grant::{AccessTokenRecord, AuthCodeRecord, RefreshTokenRecord};

/// Handled responses from a store.
#[derive(Clone, Debug)]
pub enum StoreError {
    /// The inserted key already exists. Theoretically unreachable given token entropy.
    Duplicate,

    /// Something went wrong with this primitive that has no protocol meaning.
    PrimitiveError,
}

/// Persistence interface for authorization codes, access tokens and refresh tokens.
///
/// In signed token mode the grant engine bypasses the store entirely; none of these
/// operations are invoked during issuance or verification.
pub trait Store: Send + Sync {
    /// Insert a new authorization code record. Fails with [`Duplicate`] if the code exists.
    ///
    /// [`Duplicate`]: enum.StoreError.html#variant.Duplicate
    fn put_auth_code(&self, record: AuthCodeRecord) -> Result<(), StoreError>;

    /// Atomically remove and return the record for `code`.
    ///
    /// Removal is what makes redemption single use under concurrency: of two racing
    /// redemption attempts only one can observe the stored record, the other finds it
    /// absent or already marked redeemed.
    fn take_auth_code(&self, code: &str) -> Result<Option<AuthCodeRecord>, StoreError>;

    /// Re-insert a redeemed code record, remembering the access token produced from it.
    ///
    /// A later redemption attempt observing the marker is a replay and must revoke the
    /// recorded access token.
    fn mark_auth_code_redeemed(
        &self, record: AuthCodeRecord, access_token: &str,
    ) -> Result<(), StoreError>;

    /// Insert an access token and its refresh token as one pair.
    ///
    /// Any prior refresh token for the same client and resource owner is evicted in the
    /// same step, upholding the one-active-refresh-token invariant.
    fn put_access_token(
        &self, access: AccessTokenRecord, refresh: RefreshTokenRecord,
    ) -> Result<(), StoreError>;

    /// Get the record stored for an access token, if any.
    fn get_access_token(&self, token: &str) -> Result<Option<AccessTokenRecord>, StoreError>;

    /// Get the record stored for a refresh token, if any.
    fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Unconditionally delete the record of an access token. Absent records are not an error.
    fn delete_access_token(&self, token: &str) -> Result<(), StoreError>;

    /// Unconditionally delete the record of a refresh token. Absent records are not an error.
    fn delete_refresh_token(&self, token: &str) -> Result<(), StoreError>;
}

/// Revocation set for signed tokens.
///
/// Signed tokens carry their own state, so the engine cannot invalidate them through the
/// store. A denylist layered on verification restores revocability: rotation and explicit
/// revocation add the `jti` claim here, verification refuses any listed token.
pub trait Denylist: Send + Sync {
    /// Refuse the token id from now on.
    fn revoke(&self, jti: &str) -> Result<(), StoreError>;

    /// Whether the token id has been revoked.
    fn is_revoked(&self, jti: &str) -> Result<bool, StoreError>;
}

/// Keeps all records in process memory, guarded by a single mutex.
///
/// This is the default store and suffices for single process deployments and tests. All
/// state is owned by the instance, there are no process wide statics.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    codes: HashMap<String, AuthCodeRecord>,
    access: HashMap<String, AccessTokenRecord>,
    refresh: HashMap<String, RefreshTokenRecord>,
    /// Active refresh token per (client, resource owner), for eviction.
    owners: HashMap<(String, Option<String>), String>,
}

/// In-memory denylist of revoked token ids.
#[derive(Default)]
pub struct MemoryDenylist {
    revoked: Mutex<HashSet<String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::PrimitiveError)
    }
}

impl Store for MemoryStore {
    fn put_auth_code(&self, record: AuthCodeRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.codes.contains_key(&record.code) {
            return Err(StoreError::Duplicate);
        }
        inner.codes.insert(record.code.clone(), record);
        Ok(())
    }

    fn take_auth_code(&self, code: &str) -> Result<Option<AuthCodeRecord>, StoreError> {
        Ok(self.lock()?.codes.remove(code))
    }

    fn mark_auth_code_redeemed(
        &self, mut record: AuthCodeRecord, access_token: &str,
    ) -> Result<(), StoreError> {
        record.redeemed_access_token = Some(access_token.to_string());
        self.lock()?.codes.insert(record.code.clone(), record);
        Ok(())
    }

    fn put_access_token(
        &self, access: AccessTokenRecord, refresh: RefreshTokenRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        let owner = (refresh.client_id.clone(), refresh.user_id.clone());
        if let Some(prior) = inner.owners.insert(owner, refresh.token.clone()) {
            if prior != refresh.token {
                inner.refresh.remove(&prior);
            }
        }

        inner.access.insert(access.token.clone(), access);
        inner.refresh.insert(refresh.token.clone(), refresh);
        Ok(())
    }

    fn get_access_token(&self, token: &str) -> Result<Option<AccessTokenRecord>, StoreError> {
        Ok(self.lock()?.access.get(token).cloned())
    }

    fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.lock()?.refresh.get(token).cloned())
    }

    fn delete_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.lock()?.access.remove(token);
        Ok(())
    }

    fn delete_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if let Some(record) = inner.refresh.remove(token) {
            let owner = (record.client_id, record.user_id);
            if inner.owners.get(&owner).map(String::as_str) == Some(token) {
                inner.owners.remove(&owner);
            }
        }
        Ok(())
    }
}

impl MemoryDenylist {
    /// Create an empty denylist.
    pub fn new() -> MemoryDenylist {
        MemoryDenylist::default()
    }
}

impl Denylist for MemoryDenylist {
    fn revoke(&self, jti: &str) -> Result<(), StoreError> {
        self.revoked
            .lock()
            .map_err(|_| StoreError::PrimitiveError)?
            .insert(jti.to_string());
        Ok(())
    }

    fn is_revoked(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self
            .revoked
            .lock()
            .map_err(|_| StoreError::PrimitiveError)?
            .contains(jti))
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn put_auth_code(&self, record: AuthCodeRecord) -> Result<(), StoreError> {
        (**self).put_auth_code(record)
    }

    fn take_auth_code(&self, code: &str) -> Result<Option<AuthCodeRecord>, StoreError> {
        (**self).take_auth_code(code)
    }

    fn mark_auth_code_redeemed(
        &self, record: AuthCodeRecord, access_token: &str,
    ) -> Result<(), StoreError> {
        (**self).mark_auth_code_redeemed(record, access_token)
    }

    fn put_access_token(
        &self, access: AccessTokenRecord, refresh: RefreshTokenRecord,
    ) -> Result<(), StoreError> {
        (**self).put_access_token(access, refresh)
    }

    fn get_access_token(&self, token: &str) -> Result<Option<AccessTokenRecord>, StoreError> {
        (**self).get_access_token(token)
    }

    fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        (**self).get_refresh_token(token)
    }

    fn delete_access_token(&self, token: &str) -> Result<(), StoreError> {
        (**self).delete_access_token(token)
    }

    fn delete_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        (**self).delete_refresh_token(token)
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn put_auth_code(&self, record: AuthCodeRecord) -> Result<(), StoreError> {
        (**self).put_auth_code(record)
    }

    fn take_auth_code(&self, code: &str) -> Result<Option<AuthCodeRecord>, StoreError> {
        (**self).take_auth_code(code)
    }

    fn mark_auth_code_redeemed(
        &self, record: AuthCodeRecord, access_token: &str,
    ) -> Result<(), StoreError> {
        (**self).mark_auth_code_redeemed(record, access_token)
    }

    fn put_access_token(
        &self, access: AccessTokenRecord, refresh: RefreshTokenRecord,
    ) -> Result<(), StoreError> {
        (**self).put_access_token(access, refresh)
    }

    fn get_access_token(&self, token: &str) -> Result<Option<AccessTokenRecord>, StoreError> {
        (**self).get_access_token(token)
    }

    fn get_refresh_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        (**self).get_refresh_token(token)
    }

    fn delete_access_token(&self, token: &str) -> Result<(), StoreError> {
        (**self).delete_access_token(token)
    }

    fn delete_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        (**self).delete_refresh_token(token)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Duplicate => fmt.write_str("token string already stored"),
            StoreError::PrimitiveError => fmt.write_str("token store failure"),
        }
    }
}

impl std::error::Error for StoreError {}
