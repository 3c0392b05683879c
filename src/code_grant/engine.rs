//! The grant engine, orchestrating every step of the authorization code grant.
//!
//! The host owns http, sessions and ui; it calls into the engine at each protocol step:
//! client verification, code issuance once login and consent are settled, code redemption,
//! token issuance, and token verification on resource requests. The engine delegates
//! persistence to its [`Store`] and token formatting to the configured codec, and enforces
//! the grant invariants in between: single use codes with cascaded revocation, refresh
//! rotation with eviction, scope narrowing, and uniform `invalid_grant` answers that do not
//! leak which check failed.
//!
//! [`Store`]: ../../primitives/store/trait.Store.html
use chrono::{Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::primitives::codec::{JwtCodec, OpaqueCodec};
use crate::primitives::grant::{
    AccessTokenRecord, AuthCodeRecord, RefreshTokenRecord, TokenDescriptor, TokenKind,
};
use crate::primitives::registrar::{ClientMap, Registrar, RegistrarError, ScopeMap};
use crate::primitives::scope::ScopeSet;
use crate::primitives::store::{Denylist, MemoryStore, Store};
use crate::primitives::Time;

use super::bridge::{OwnerBridge, OwnerConsent, OwnerLogin, Permissive};
use super::error::{ErrorKind, GrantError, PrimitiveError, ProtocolError};

/// Default lifetime of authorization codes, in seconds.
pub const DEFAULT_AUTH_CODE_TTL: i64 = 600;

/// Default lifetime of access tokens, in seconds.
pub const DEFAULT_ACCESS_TOKEN_TTL: i64 = 3600;

/// An authorization request forwarded by the host once login and consent succeeded.
#[derive(Clone, Debug)]
pub struct AuthCodeRequest<'a> {
    /// The client asking for authorization.
    pub client_id: &'a str,

    /// The authenticated resource owner, as reported by the host's login hook.
    pub user_id: Option<&'a str>,

    /// The scopes the resource owner consented to.
    pub scopes: ScopeSet,

    /// The redirect uri named in the authorization request, if any.
    pub redirect_uri: Option<&'a str>,
}

/// A redemption request for an authorization code, sent by the client back channel.
#[derive(Clone, Debug)]
pub struct CodeRedemption<'a> {
    /// The client claiming the code.
    pub client_id: &'a str,

    /// The client's credential, absent for public clients.
    pub client_secret: Option<&'a [u8]>,

    /// The authorization code to redeem.
    pub code: &'a str,

    /// The redirect uri repeated from the authorization request.
    pub redirect_uri: Option<&'a str>,
}

/// A request to trade a refresh token for a fresh token pair.
#[derive(Clone, Debug)]
pub struct RefreshRequest<'a> {
    /// The client the refresh token supposedly belongs to, checked when present.
    pub client_id: Option<&'a str>,

    /// The client's credential, checked when present.
    pub client_secret: Option<&'a [u8]>,

    /// The refresh token being redeemed.
    pub refresh_token: &'a str,

    /// Scopes for the new access token. Empty or absent keeps the granted scopes; anything
    /// else must be a subset of them.
    pub scopes: Option<ScopeSet>,
}

/// Proof of a successful code redemption, consumed by access token issuance.
///
/// The value cannot be constructed by hosts. In opaque mode it carries the consumed code
/// record so that issuance can mark the redemption; handing it to
/// [`GrantEngine::issue_access_token`] is the only way to complete the exchange.
///
/// [`GrantEngine::issue_access_token`]: struct.GrantEngine.html#method.issue_access_token
#[derive(Clone, Debug)]
pub struct Authorized {
    client_id: String,
    user_id: Option<String>,
    scopes: ScopeSet,
    origin: Origin,
}

#[derive(Clone, Debug)]
enum Origin {
    /// The consumed record of an opaque code.
    Code(AuthCodeRecord),

    /// The unique id of a signed code.
    SignedCode { jti: String },
}

/// The outcome of a successful token verification.
#[derive(Clone, Debug, PartialEq)]
pub struct Verified {
    /// The client the token was issued to.
    pub client_id: String,

    /// The resource owner on whose behalf the token acts, if any.
    pub user_id: Option<String>,

    /// The scopes granted to the token holder.
    pub scopes: ScopeSet,

    /// When the token expires. Absent for refresh tokens.
    pub expires_at: Option<Time>,
}

/// A freshly issued access and refresh token pair.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    /// The bearer token.
    pub access_token: String,

    /// The refresh token paired with it.
    pub refresh_token: String,

    /// Expiration timestamp of the access token (Utc).
    pub expires_at: Time,
}

/// Token response body as defined in [rfc6749 section 5.1].
///
/// [rfc6749 section 5.1]: https://tools.ietf.org/html/rfc6749#section-5.1
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    /// The access token issued by the authorization server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// The refresh token, which can be used to obtain new access tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// The type of the token issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// The lifetime in seconds of the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// The scope, which limits the permissions on the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Error code when the request was refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Errors detected while assembling a grant engine. The only fatal error path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Neither a client map nor a custom registrar was supplied; the engine cannot answer
    /// any request without one.
    MissingClients,

    /// The signing secret was empty. Refusing it beats silently issuing forgeable tokens.
    EmptySecret,
}

enum TokenBackend {
    Opaque(OpaqueCodec),
    Signed(JwtCodec),
}

/// Assembles a [`GrantEngine`].
///
/// [`GrantEngine`]: struct.GrantEngine.html
pub struct GrantEngineBuilder {
    registrar: Option<Box<dyn Registrar>>,
    store: Option<Box<dyn Store>>,
    denylist: Option<Box<dyn Denylist>>,
    bridge: Box<dyn OwnerBridge>,
    jwt_secret: Option<Vec<u8>>,
    auth_code_ttl: Duration,
    access_token_ttl: Duration,
    strict_redirect_uri: bool,
}

/// The state machine for the authorization code grant.
///
/// Reentrant by design: all operations take `&self` and multiple grant flows may run
/// concurrently. The store mediates all mutable state.
pub struct GrantEngine {
    registrar: Box<dyn Registrar>,
    store: Box<dyn Store>,
    denylist: Option<Box<dyn Denylist>>,
    bridge: Box<dyn OwnerBridge>,
    backend: TokenBackend,
    auth_code_ttl: Duration,
    access_token_ttl: Duration,
    strict_redirect_uri: bool,
}

impl GrantEngine {
    /// Start assembling an engine. See [`GrantEngineBuilder`].
    ///
    /// [`GrantEngineBuilder`]: struct.GrantEngineBuilder.html
    pub fn builder() -> GrantEngineBuilder {
        GrantEngineBuilder {
            registrar: None,
            store: None,
            denylist: None,
            bridge: Box::new(Permissive),
            jwt_secret: None,
            auth_code_ttl: Duration::seconds(DEFAULT_AUTH_CODE_TTL),
            access_token_ttl: Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL),
            strict_redirect_uri: false,
        }
    }

    /// Ask the host whether a resource owner is signed in.
    pub fn login_resource_owner(&self) -> OwnerLogin {
        self.bridge.login_resource_owner()
    }

    /// Ask the host whether the resource owner approves the request.
    pub fn confirm_by_resource_owner(&self, client_id: &str, scopes: &ScopeSet) -> OwnerConsent {
        self.bridge.confirm_by_resource_owner(client_id, scopes)
    }

    /// Check that a client exists and may request the given scopes.
    ///
    /// The first scope that fails decides the answer: a scope absent from the client's
    /// policy is `invalid_scope`, a scope present but disabled is `access_denied`. An
    /// unknown client is `unauthorized_client` before any scope is looked at.
    pub fn verify_client(&self, client_id: &str, scopes: &ScopeSet) -> Result<(), GrantError> {
        let policy = self
            .lookup(client_id)?
            .ok_or_else(|| GrantError::protocol(ErrorKind::UnauthorizedClient))?;

        for scope in scopes.iter() {
            match policy.get(scope) {
                None => return Err(GrantError::protocol(ErrorKind::InvalidScope)),
                Some(false) => return Err(GrantError::protocol(ErrorKind::AccessDenied)),
                Some(true) => (),
            }
        }

        Ok(())
    }

    /// Issue an authorization code for a client.
    ///
    /// The host must have settled [`login_resource_owner`] and [`confirm_by_resource_owner`]
    /// beforehand; the engine does not re-check them here.
    ///
    /// [`login_resource_owner`]: #method.login_resource_owner
    /// [`confirm_by_resource_owner`]: #method.confirm_by_resource_owner
    pub fn issue_auth_code(&self, request: &AuthCodeRequest) -> Result<String, GrantError> {
        if let Some(uri) = request.redirect_uri {
            let _: Url = uri
                .parse()
                .map_err(|_| GrantError::protocol(ErrorKind::InvalidRequest))?;
        }

        let descriptor = TokenDescriptor::auth(
            request.client_id,
            request.user_id,
            request.scopes.clone(),
            request.redirect_uri,
            self.auth_code_ttl,
        );
        let code = self.encode(&descriptor)?;

        if let TokenBackend::Opaque(_) = self.backend {
            self.store.put_auth_code(AuthCodeRecord {
                code: code.clone(),
                client_id: request.client_id.to_string(),
                user_id: request.user_id.map(str::to_string),
                expires_at: Utc::now() + self.auth_code_ttl,
                redirect_uri: request.redirect_uri.map(str::to_string),
                scopes: request.scopes.clone(),
                redeemed_access_token: None,
            })?;
        }

        debug!(client_id = request.client_id, "issued authorization code");
        Ok(code)
    }

    /// Redeem an authorization code.
    ///
    /// Every failure is answered with `invalid_grant`, whether the code is absent, expired,
    /// bound to another client or redirect uri, or presented with a wrong secret. A code
    /// observed with its redemption marker is a replay: the access token issued from it is
    /// revoked before the uniform error is returned.
    pub fn verify_auth_code(&self, request: &CodeRedemption) -> Result<Authorized, GrantError> {
        match &self.backend {
            TokenBackend::Opaque(_) => self.verify_auth_code_stored(request),
            TokenBackend::Signed(codec) => self.verify_auth_code_signed(codec, request),
        }
    }

    fn verify_auth_code_stored(&self, request: &CodeRedemption) -> Result<Authorized, GrantError> {
        // Taking removes the record, which is what makes redemption single use: a racing
        // second caller finds the record absent or re-inserted with the redemption marker.
        let record = match self.store.take_auth_code(request.code)? {
            Some(record) => record,
            None => return Err(invalid_grant()),
        };

        if let Some(access_token) = &record.redeemed_access_token {
            warn!(
                client_id = %record.client_id,
                "authorization code replayed, revoking the access token issued from it"
            );
            self.store.delete_access_token(access_token)?;
            // The code record stays removed, which completes the cascade.
            return Err(invalid_grant());
        }

        if record.expires_at <= Utc::now() {
            // Expired codes are dropped for good.
            return Err(invalid_grant());
        }

        let client_ok = record.client_id == request.client_id;
        let secret_ok = match self.registrar.check(request.client_id, request.client_secret) {
            Ok(()) => true,
            Err(RegistrarError::Unspecified) => false,
            Err(RegistrarError::PrimitiveError) => {
                let _ = self.store.put_auth_code(record);
                return Err(GrantError::Primitive(PrimitiveError::Registrar));
            }
        };
        let redirect_ok = self.redirect_matches(record.redirect_uri.as_deref(), request.redirect_uri);

        if !(client_ok && secret_ok && redirect_ok) {
            // Not a replay: the untouched record goes back so the honest client can still
            // redeem the code before it expires.
            self.store.put_auth_code(record)?;
            return Err(invalid_grant());
        }

        Ok(Authorized {
            client_id: record.client_id.clone(),
            user_id: record.user_id.clone(),
            scopes: record.scopes.clone(),
            origin: Origin::Code(record),
        })
    }

    fn verify_auth_code_signed(
        &self, codec: &JwtCodec, request: &CodeRedemption,
    ) -> Result<Authorized, GrantError> {
        let claims = codec.decode(request.code).map_err(|_| invalid_grant())?;

        if claims.kind != TokenKind::Auth || claims.client != request.client_id {
            return Err(invalid_grant());
        }
        if !self.redirect_matches(claims.aud.as_deref(), request.redirect_uri) {
            return Err(invalid_grant());
        }

        if self.lookup(request.client_id)?.is_none() {
            return Err(GrantError::protocol(ErrorKind::UnauthorizedClient));
        }
        match self.registrar.check(request.client_id, request.client_secret) {
            Ok(()) => (),
            Err(RegistrarError::Unspecified) => return Err(invalid_grant()),
            Err(RegistrarError::PrimitiveError) => {
                return Err(GrantError::Primitive(PrimitiveError::Registrar))
            }
        }

        // Without a denylist there is no replay detection for signed codes; the token is
        // its own record and nothing on the server remembers a redemption.
        if let Some(denylist) = &self.denylist {
            if denylist.is_revoked(&claims.jti)? {
                warn!(client_id = %claims.client, "signed authorization code replayed");
                return Err(invalid_grant());
            }
        }

        Ok(Authorized {
            client_id: claims.client,
            user_id: claims.user_id,
            scopes: claims.scopes,
            origin: Origin::SignedCode { jti: claims.jti },
        })
    }

    /// Issue the access and refresh token pair for a redeemed authorization code.
    ///
    /// In opaque mode this persists the pair, evicts any previous refresh token of the same
    /// client and owner, and marks the code as redeemed with the new access token. In
    /// signed mode nothing is stored; with a denylist configured the code's id is retired
    /// so a replay can be refused.
    pub fn issue_access_token(&self, grant: Authorized) -> Result<IssuedToken, GrantError> {
        let Authorized {
            client_id,
            user_id,
            scopes,
            origin,
        } = grant;

        let (access_token, refresh_token, expires_at) =
            self.mint_pair(&client_id, user_id.as_deref(), &scopes)?;

        match origin {
            Origin::Code(record) => {
                self.store.put_access_token(
                    AccessTokenRecord {
                        token: access_token.clone(),
                        client_id: client_id.clone(),
                        user_id: user_id.clone(),
                        expires_at,
                        scopes: scopes.clone(),
                        refresh_token: Some(refresh_token.clone()),
                    },
                    RefreshTokenRecord {
                        token: refresh_token.clone(),
                        client_id: client_id.clone(),
                        user_id,
                        access_token: access_token.clone(),
                        auth_code: Some(record.code.clone()),
                        scopes,
                    },
                )?;
                self.store.mark_auth_code_redeemed(record, &access_token)?;
            }
            Origin::SignedCode { jti } => {
                if let Some(denylist) = &self.denylist {
                    denylist.revoke(&jti)?;
                }
            }
        }

        debug!(client_id = %client_id, "issued access token pair");
        Ok(IssuedToken {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Trade a refresh token for a new token pair, rotating the refresh token.
    ///
    /// The old access token is revoked and the old refresh token deleted before the new
    /// pair is persisted; scopes narrow to the requested subset or carry over unchanged.
    pub fn refresh_access_token(&self, request: &RefreshRequest) -> Result<IssuedToken, GrantError> {
        match &self.backend {
            TokenBackend::Opaque(_) => self.refresh_stored(request),
            TokenBackend::Signed(codec) => self.refresh_signed(codec, request),
        }
    }

    fn refresh_stored(&self, request: &RefreshRequest) -> Result<IssuedToken, GrantError> {
        let old = self
            .store
            .get_refresh_token(request.refresh_token)?
            .ok_or_else(invalid_grant)?;

        if let Some(client_id) = request.client_id {
            if client_id != old.client_id {
                return Err(invalid_grant());
            }
        }
        if let Some(secret) = request.client_secret {
            match self.registrar.check(&old.client_id, Some(secret)) {
                Ok(()) => (),
                Err(RegistrarError::Unspecified) => return Err(invalid_grant()),
                Err(RegistrarError::PrimitiveError) => {
                    return Err(GrantError::Primitive(PrimitiveError::Registrar))
                }
            }
        }

        let scopes = narrowed_scopes(request.scopes.as_ref(), &old.scopes)?;

        // Rotation: the previous pair dies with the redemption.
        self.store.delete_access_token(&old.access_token)?;
        self.store.delete_refresh_token(&old.token)?;

        let (access_token, refresh_token, expires_at) =
            self.mint_pair(&old.client_id, old.user_id.as_deref(), &scopes)?;

        self.store.put_access_token(
            AccessTokenRecord {
                token: access_token.clone(),
                client_id: old.client_id.clone(),
                user_id: old.user_id.clone(),
                expires_at,
                scopes: scopes.clone(),
                refresh_token: Some(refresh_token.clone()),
            },
            RefreshTokenRecord {
                token: refresh_token.clone(),
                client_id: old.client_id.clone(),
                user_id: old.user_id.clone(),
                access_token: access_token.clone(),
                auth_code: old.auth_code.clone(),
                scopes,
            },
        )?;

        debug!(client_id = %old.client_id, "rotated refresh token");
        Ok(IssuedToken {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    fn refresh_signed(
        &self, codec: &JwtCodec, request: &RefreshRequest,
    ) -> Result<IssuedToken, GrantError> {
        let claims = codec
            .decode(request.refresh_token)
            .map_err(|_| invalid_grant())?;

        if claims.kind != TokenKind::Refresh {
            return Err(invalid_grant());
        }
        if let Some(client_id) = request.client_id {
            if client_id != claims.client {
                return Err(invalid_grant());
            }
        }
        if let Some(secret) = request.client_secret {
            match self.registrar.check(&claims.client, Some(secret)) {
                Ok(()) => (),
                Err(RegistrarError::Unspecified) => return Err(invalid_grant()),
                Err(RegistrarError::PrimitiveError) => {
                    return Err(GrantError::Primitive(PrimitiveError::Registrar))
                }
            }
        }
        if let Some(denylist) = &self.denylist {
            if denylist.is_revoked(&claims.jti)? {
                return Err(invalid_grant());
            }
        }

        let scopes = narrowed_scopes(request.scopes.as_ref(), &claims.scopes)?;
        let (access_token, refresh_token, expires_at) =
            self.mint_pair(&claims.client, claims.user_id.as_deref(), &scopes)?;

        // Self contained refresh tokens cannot be deleted; retiring the id on the denylist
        // is the closest equivalent of rotation this mode offers.
        if let Some(denylist) = &self.denylist {
            denylist.revoke(&claims.jti)?;
        }

        debug!(client_id = %claims.client, "rotated signed refresh token");
        Ok(IssuedToken {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Check an access token, or a refresh token when `is_refresh_token` is set.
    ///
    /// Each requested scope must be among the token's granted scopes. In opaque mode an
    /// expired access token is deleted from the store as a side effect of the failed check.
    pub fn verify_access_token(
        &self, token: &str, scopes: &ScopeSet, is_refresh_token: bool,
    ) -> Result<Verified, GrantError> {
        match &self.backend {
            TokenBackend::Opaque(_) => self.verify_token_stored(token, scopes, is_refresh_token),
            TokenBackend::Signed(codec) => {
                self.verify_token_signed(codec, token, scopes, is_refresh_token)
            }
        }
    }

    fn verify_token_stored(
        &self, token: &str, scopes: &ScopeSet, is_refresh_token: bool,
    ) -> Result<Verified, GrantError> {
        if is_refresh_token {
            let record = self
                .store
                .get_refresh_token(token)?
                .ok_or_else(invalid_grant)?;
            check_scopes(scopes, &record.scopes)?;

            return Ok(Verified {
                client_id: record.client_id,
                user_id: record.user_id,
                scopes: record.scopes,
                expires_at: None,
            });
        }

        let record = self
            .store
            .get_access_token(token)?
            .ok_or_else(invalid_grant)?;

        if record.expires_at <= Utc::now() {
            debug!(client_id = %record.client_id, "access token expired, deleting its record");
            self.store.delete_access_token(token)?;
            return Err(invalid_grant());
        }
        check_scopes(scopes, &record.scopes)?;

        Ok(Verified {
            client_id: record.client_id,
            user_id: record.user_id,
            scopes: record.scopes,
            expires_at: Some(record.expires_at),
        })
    }

    fn verify_token_signed(
        &self, codec: &JwtCodec, token: &str, scopes: &ScopeSet, is_refresh_token: bool,
    ) -> Result<Verified, GrantError> {
        let claims = codec.decode(token).map_err(|_| invalid_grant())?;

        match (claims.kind, is_refresh_token) {
            (TokenKind::Access, false) | (TokenKind::Refresh, true) => (),
            _ => return Err(invalid_grant()),
        }
        if let Some(denylist) = &self.denylist {
            if denylist.is_revoked(&claims.jti)? {
                return Err(invalid_grant());
            }
        }
        check_scopes(scopes, &claims.scopes)?;

        let expires_at = match claims.exp {
            Some(stamp) => Some(
                Utc.timestamp_opt(stamp, 0)
                    .single()
                    .ok_or_else(invalid_grant)?,
            ),
            None => None,
        };

        Ok(Verified {
            client_id: claims.client,
            user_id: claims.user_id,
            scopes: claims.scopes,
            expires_at,
        })
    }

    /// Verify a bearer authorization header, or a refresh token when one is supplied.
    ///
    /// The header must consist of the case sensitive scheme `Bearer`, a single space and
    /// the token. Anything else, including a missing header, is `invalid_request`.
    pub fn verify_token_and_scope(
        &self, auth_header: Option<&str>, scopes: &ScopeSet, refresh_token: Option<&str>,
    ) -> Result<Verified, GrantError> {
        if let Some(refresh_token) = refresh_token {
            return self.verify_access_token(refresh_token, scopes, true);
        }

        let header = auth_header.ok_or_else(|| GrantError::protocol(ErrorKind::InvalidRequest))?;
        let token = match header.split_once(' ') {
            Some(("Bearer", token)) if !token.is_empty() => token,
            _ => return Err(GrantError::protocol(ErrorKind::InvalidRequest)),
        };

        self.verify_access_token(token, scopes, false)
    }

    /// Unconditionally revoke a token.
    ///
    /// In opaque mode the access or refresh record is deleted, whichever the string names.
    /// In signed mode the token's id is added to the denylist; without one the call has no
    /// effect, which is logged, since a signed token cannot be recalled.
    pub fn revoke_token(&self, token: &str) -> Result<(), GrantError> {
        match &self.backend {
            TokenBackend::Opaque(_) => {
                self.store.delete_access_token(token)?;
                self.store.delete_refresh_token(token)?;
                Ok(())
            }
            TokenBackend::Signed(codec) => {
                let claims = codec.decode(token).map_err(|_| invalid_grant())?;
                match &self.denylist {
                    Some(denylist) => Ok(denylist.revoke(&claims.jti)?),
                    None => {
                        warn!(
                            client_id = %claims.client,
                            "revocation without a denylist, the signed token stays valid until expiry"
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    fn mint_pair(
        &self, client_id: &str, user_id: Option<&str>, scopes: &ScopeSet,
    ) -> Result<(String, String, Time), GrantError> {
        let expires_at = Utc::now() + self.access_token_ttl;
        let access = self.encode(&TokenDescriptor::access(
            client_id,
            user_id,
            scopes.clone(),
            self.access_token_ttl,
        ))?;
        let refresh = self.encode(&TokenDescriptor::refresh(client_id, user_id, scopes.clone()))?;
        Ok((access, refresh, expires_at))
    }

    fn encode(&self, descriptor: &TokenDescriptor) -> Result<String, GrantError> {
        match &self.backend {
            TokenBackend::Opaque(codec) => Ok(codec.encode(descriptor)),
            TokenBackend::Signed(codec) => Ok(codec.encode(descriptor)?),
        }
    }

    fn lookup(&self, client_id: &str) -> Result<Option<ScopeMap>, GrantError> {
        match self.registrar.lookup(client_id) {
            Ok(found) => Ok(found),
            Err(RegistrarError::Unspecified) => Ok(None),
            Err(RegistrarError::PrimitiveError) => {
                Err(GrantError::Primitive(PrimitiveError::Registrar))
            }
        }
    }

    fn redirect_matches(&self, stored: Option<&str>, presented: Option<&str>) -> bool {
        match (stored, presented) {
            (None, None) => true,
            (None, Some(_)) => false,
            (Some(stored), Some(presented)) => stored == presented,
            // The authorization request named a redirect uri but the redemption does not
            // repeat it. Lax mode skips the comparison, strict mode refuses.
            (Some(_), None) => !self.strict_redirect_uri,
        }
    }
}

impl GrantEngineBuilder {
    /// Use an in-memory client map as the registrar.
    pub fn clients(mut self, clients: ClientMap) -> Self {
        self.registrar = Some(Box::new(clients));
        self
    }

    /// Use a host supplied registrar, for example one backed by a client database.
    pub fn registrar<R: Registrar + 'static>(mut self, registrar: R) -> Self {
        self.registrar = Some(Box::new(registrar));
        self
    }

    /// Use a host supplied store instead of the default in-memory one.
    pub fn store<S: Store + 'static>(mut self, store: S) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Consult a denylist during signed token verification, restoring revocability.
    pub fn denylist<D: Denylist + 'static>(mut self, denylist: D) -> Self {
        self.denylist = Some(Box::new(denylist));
        self
    }

    /// Use a host supplied resource owner bridge instead of the permissive default.
    pub fn owner_bridge<B: OwnerBridge + 'static>(mut self, bridge: B) -> Self {
        self.bridge = Box::new(bridge);
        self
    }

    /// Switch to signed, self contained tokens under the given shared secret.
    ///
    /// With a secret set the store is bypassed entirely; tokens carry their own state and
    /// cannot be revoked unless a denylist is configured as well.
    pub fn jwt_secret<S: Into<Vec<u8>>>(mut self, secret: S) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    /// Lifetime of authorization codes. Defaults to 600 seconds.
    pub fn auth_code_ttl(mut self, ttl: Duration) -> Self {
        self.auth_code_ttl = ttl;
        self
    }

    /// Lifetime of access tokens. Defaults to 3600 seconds.
    pub fn access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    /// Refuse code redemptions that omit a redirect uri the authorization request named.
    ///
    /// Off by default: the lax behavior skips the comparison in that case.
    pub fn strict_redirect_uri(mut self, strict: bool) -> Self {
        self.strict_redirect_uri = strict;
        self
    }

    /// Assemble the engine.
    pub fn build(self) -> Result<GrantEngine, ConfigError> {
        let registrar = self.registrar.ok_or(ConfigError::MissingClients)?;

        let backend = match self.jwt_secret {
            Some(secret) if secret.is_empty() => return Err(ConfigError::EmptySecret),
            Some(secret) => TokenBackend::Signed(JwtCodec::new(&secret)),
            None => TokenBackend::Opaque(OpaqueCodec::new()),
        };

        Ok(GrantEngine {
            registrar,
            store: self.store.unwrap_or_else(|| Box::new(MemoryStore::new())),
            denylist: self.denylist,
            bridge: self.bridge,
            backend,
            auth_code_ttl: self.auth_code_ttl,
            access_token_ttl: self.access_token_ttl,
            strict_redirect_uri: self.strict_redirect_uri,
        })
    }
}

impl Authorized {
    /// The client the code was issued to.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The resource owner who approved the code, if the host supplied one.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// The scopes the resource owner consented to.
    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }
}

impl TokenResponse {
    /// Build the success body for a freshly issued pair.
    pub fn from_issued(token: &IssuedToken, scope: Option<&ScopeSet>) -> TokenResponse {
        let remaining = token.expires_at.signed_duration_since(Utc::now());
        TokenResponse {
            access_token: Some(token.access_token.clone()),
            refresh_token: Some(token.refresh_token.clone()),
            token_type: Some("bearer".to_owned()),
            expires_in: Some(remaining.num_seconds()),
            scope: scope.map(ToString::to_string),
            error: None,
        }
    }

    /// Build the error body for a refused request.
    pub fn from_error(error: &ProtocolError) -> TokenResponse {
        TokenResponse {
            access_token: None,
            refresh_token: None,
            token_type: None,
            expires_in: None,
            scope: None,
            error: Some(error.kind().as_ref().to_owned()),
        }
    }

    /// Convert the response into a json string, viable for being sent over a network with
    /// `application/json` encoding.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

fn invalid_grant() -> GrantError {
    GrantError::protocol(ErrorKind::InvalidGrant)
}

fn check_scopes(requested: &ScopeSet, granted: &ScopeSet) -> Result<(), GrantError> {
    if requested.subset_of(granted) {
        Ok(())
    } else {
        Err(invalid_grant())
    }
}

fn narrowed_scopes(requested: Option<&ScopeSet>, granted: &ScopeSet) -> Result<ScopeSet, GrantError> {
    match requested {
        None => Ok(granted.clone()),
        Some(scopes) if scopes.is_empty() => Ok(granted.clone()),
        Some(scopes) => {
            if !scopes.subset_of(granted) {
                return Err(GrantError::protocol(ErrorKind::InvalidScope));
            }
            Ok(scopes.clone())
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::MissingClients => {
                fmt.write_str("a client map or registrar is required to build a grant engine")
            }
            ConfigError::EmptySecret => fmt.write_str("the jwt secret must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}
