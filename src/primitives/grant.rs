//! Shared data model for grants: token descriptors and the records kept by stores.
use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::Time;
use super::scope::ScopeSet;

/// The role a token plays in the grant flow.
///
/// Verification always checks the kind, so an authorization code can never pass as a bearer
/// token and a refresh token can never pass as an access token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    /// A short lived authorization code, redeemable exactly once.
    Auth,

    /// A bearer token presented to resource servers.
    Access,

    /// A long lived token redeemable for a fresh access token.
    Refresh,
}

/// Everything a token codec needs to know to mint a token.
///
/// For opaque tokens the descriptor is not recoverable from the token string and the store
/// keeps the authoritative copy. For signed tokens the descriptor becomes the claim set.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenDescriptor {
    /// The role the minted token will play.
    pub kind: TokenKind,

    /// The client the token is issued to.
    pub client_id: String,

    /// The resource owner on whose behalf the token acts, if any.
    pub user_id: Option<String>,

    /// The scope tokens granted to the holder.
    pub scopes: ScopeSet,

    /// The audience restriction, the redirect uri for authorization codes.
    pub audience: Option<String>,

    /// How long the token stays valid. Refresh tokens carry no expiry.
    pub ttl: Option<Duration>,
}

/// A stored authorization code awaiting redemption.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthCodeRecord {
    /// The code string handed to the client.
    pub code: String,

    /// The client the code was issued to.
    pub client_id: String,

    /// The authenticated resource owner, if the host supplied one.
    pub user_id: Option<String>,

    /// Instant after which the code must no longer be redeemed.
    pub expires_at: Time,

    /// The redirect uri named in the authorization request, if any.
    pub redirect_uri: Option<String>,

    /// The scopes the resource owner consented to.
    pub scopes: ScopeSet,

    /// Set to the issued access token once the code has been redeemed.
    ///
    /// A second redemption attempt observing this field is a replay and triggers revocation
    /// of the referenced access token.
    pub redeemed_access_token: Option<String>,
}

/// A stored access token.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessTokenRecord {
    /// The bearer token string.
    pub token: String,

    /// The client the token was issued to.
    pub client_id: String,

    /// The resource owner on whose behalf the token acts, if any.
    pub user_id: Option<String>,

    /// Instant after which the token is invalid.
    pub expires_at: Time,

    /// The granted scopes.
    pub scopes: ScopeSet,

    /// The refresh token issued alongside this access token.
    pub refresh_token: Option<String>,
}

/// A stored refresh token. Refresh tokens do not expire on their own; they are replaced
/// when redeemed and evicted when a newer pair is issued for the same client and owner.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshTokenRecord {
    /// The refresh token string.
    pub token: String,

    /// The client the token was issued to.
    pub client_id: String,

    /// The resource owner on whose behalf the token acts, if any.
    pub user_id: Option<String>,

    /// The access token currently paired with this refresh token.
    pub access_token: String,

    /// The authorization code this lineage of tokens originates from, if any.
    pub auth_code: Option<String>,

    /// The granted scopes, carried forward across rotations.
    pub scopes: ScopeSet,
}

impl TokenKind {
    /// The wire representation of the kind, used as the `type` claim of signed tokens.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Auth => "auth",
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    fn from_str(kind: &str) -> Option<TokenKind> {
        match kind {
            "auth" => Some(TokenKind::Auth),
            "access" => Some(TokenKind::Access),
            "refresh" => Some(TokenKind::Refresh),
            _ => None,
        }
    }
}

impl Serialize for TokenKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TokenKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let string: String = Deserialize::deserialize(deserializer)?;
        TokenKind::from_str(&string)
            .ok_or_else(|| serde::de::Error::custom("unknown token kind"))
    }
}

impl TokenDescriptor {
    /// Describe an authorization code for `client_id`, expiring after `ttl`.
    pub fn auth(
        client_id: &str, user_id: Option<&str>, scopes: ScopeSet, redirect_uri: Option<&str>,
        ttl: Duration,
    ) -> TokenDescriptor {
        TokenDescriptor {
            kind: TokenKind::Auth,
            client_id: client_id.to_string(),
            user_id: user_id.map(str::to_string),
            scopes,
            audience: redirect_uri.map(str::to_string),
            ttl: Some(ttl),
        }
    }

    /// Describe an access token for `client_id`, expiring after `ttl`.
    pub fn access(
        client_id: &str, user_id: Option<&str>, scopes: ScopeSet, ttl: Duration,
    ) -> TokenDescriptor {
        TokenDescriptor {
            kind: TokenKind::Access,
            client_id: client_id.to_string(),
            user_id: user_id.map(str::to_string),
            scopes,
            audience: None,
            ttl: Some(ttl),
        }
    }

    /// Describe a refresh token for `client_id`. Refresh tokens carry no expiry.
    pub fn refresh(client_id: &str, user_id: Option<&str>, scopes: ScopeSet) -> TokenDescriptor {
        TokenDescriptor {
            kind: TokenKind::Refresh,
            client_id: client_id.to_string(),
            user_id: user_id.map(str::to_string),
            scopes,
            audience: None,
            ttl: None,
        }
    }
}
