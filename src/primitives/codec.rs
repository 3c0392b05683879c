//! Codecs turn token descriptors into transportable strings.
//!
//! Two implementations exist:
//!     - `OpaqueCodec` depends on the entropy of the generated token to make guessing
//!     infeasible; nothing is recoverable from the string and the store keeps the record.
//!     - `JwtCodec` signs the descriptor into a self contained token, trading server side
//!     state for the loss of revocability. Verification happens by signature alone.
use std::fmt;

use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::grant::{TokenDescriptor, TokenKind};
use super::scope::ScopeSet;

type HmacSha256 = Hmac<Sha256>;

/// Number of random octets appended to every opaque token.
const OPAQUE_TAIL_OCTETS: usize = 30;

/// Number of random octets in the `jti` claim of signed tokens.
const JTI_OCTETS: usize = 32;

/// Errors produced while decoding a signed token.
///
/// The variants deliberately carry no further detail. Callers map all of them to the same
/// protocol answer so that decode failures do not become a distinguishing oracle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CodecError {
    /// The token was not structurally a signed token.
    Malformed,

    /// The signature did not verify under the shared secret.
    BadSignature,

    /// The `exp` claim lies in the past.
    Expired,
}

/// Generates unguessable tokens from random bytes.
///
/// The token concatenates the current unix seconds, the microsecond fraction, a uniform
/// random 64 bit value and 30 further random octets, then encodes the result url safe.
/// No meaning can be recovered from the string; verification goes through the store.
pub struct OpaqueCodec {
    random: OsRng,
}

impl OpaqueCodec {
    /// Create a codec drawing from the operating system generator.
    pub fn new() -> OpaqueCodec {
        OpaqueCodec { random: OsRng {} }
    }

    /// Mint a fresh token. The descriptor only determines bookkeeping done by the caller,
    /// the string itself is pure entropy.
    pub fn encode(&self, _descriptor: &TokenDescriptor) -> String {
        let now = Utc::now();
        let mut rnd = self.random;

        let mut raw = format!(
            "{}:{}:{}:",
            now.timestamp(),
            now.timestamp_subsec_micros(),
            rnd.next_u64()
        )
        .into_bytes();

        let mut tail = [0u8; OPAQUE_TAIL_OCTETS];
        rnd.try_fill_bytes(&mut tail)
            .expect("Failed to generate random token");
        raw.extend_from_slice(&tail);

        base64::encode_config(&raw, base64::URL_SAFE_NO_PAD)
    }
}

impl Default for OpaqueCodec {
    fn default() -> Self {
        OpaqueCodec::new()
    }
}

/// The claim set carried by signed tokens.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Claims {
    /// Unix timestamp the token was issued at.
    pub iat: i64,

    /// Unix timestamp the token expires at, absent for refresh tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// The audience restriction, the redirect uri for authorization codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Random unique token id, 32 octets of entropy.
    pub jti: String,

    /// The role of the token, checked on every verification.
    #[serde(rename = "type")]
    pub kind: TokenKind,

    /// The client the token was issued to.
    pub client: String,

    /// The resource owner on whose behalf the token acts, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// The granted scopes.
    pub scopes: ScopeSet,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Signs descriptors into self contained tokens instead of storing them.
///
/// Tokens use the compact JWS serialization with an HMAC-SHA256 signature over the header
/// and claim segments. While this codec preserves memory it also implies that tokens, once
/// issued, are impossible to revoke without an additional denylist.
pub struct JwtCodec {
    mac: HmacSha256,
}

impl JwtCodec {
    /// Construct a codec from a shared signing secret.
    ///
    /// Security notice: never use a plain password as the secret. Instead, generate a new
    /// key using a utility such as `openssl rand` that you then store away securely.
    pub fn new(secret: &[u8]) -> JwtCodec {
        JwtCodec {
            mac: HmacSha256::new_from_slice(secret).expect("hmac accepts keys of any length"),
        }
    }

    /// Construct a codec whose tokens are only valid for the program execution.
    pub fn ephemeral() -> JwtCodec {
        let mut key = [0u8; 32];
        OsRng {}
            .try_fill_bytes(&mut key)
            .expect("Failed to generate ephemeral signing key");
        JwtCodec::new(&key)
    }

    /// Sign the descriptor into a compact token string.
    pub fn encode(&self, descriptor: &TokenDescriptor) -> Result<String, CodecError> {
        let now = Utc::now();
        let claims = Claims {
            iat: now.timestamp(),
            exp: descriptor.ttl.map(|ttl| (now + ttl).timestamp()),
            aud: descriptor.audience.clone(),
            jti: random_jti(),
            kind: descriptor.kind,
            client: descriptor.client_id.clone(),
            user_id: descriptor.user_id.clone(),
            scopes: descriptor.scopes.clone(),
        };

        let header = base64::encode_config(br#"{"alg":"HS256","typ":"JWT"}"#, base64::URL_SAFE_NO_PAD);
        let body = serde_json::to_vec(&claims).map_err(|_| CodecError::Malformed)?;

        let mut token = header;
        token.push('.');
        token.push_str(&base64::encode_config(&body, base64::URL_SAFE_NO_PAD));

        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        let signature = mac.finalize().into_bytes();

        token.push('.');
        token.push_str(&base64::encode_config(&signature, base64::URL_SAFE_NO_PAD));
        Ok(token)
    }

    /// Verify the signature and expiry of a token and recover its claims.
    pub fn decode(&self, token: &str) -> Result<Claims, CodecError> {
        let signed_len = match token.rfind('.') {
            Some(index) => index,
            None => return Err(CodecError::Malformed),
        };
        let (signed, signature) = (&token[..signed_len], &token[signed_len + 1..]);

        let header_len = match signed.find('.') {
            Some(index) => index,
            None => return Err(CodecError::Malformed),
        };
        let (header, payload) = (&signed[..header_len], &signed[header_len + 1..]);
        if payload.contains('.') {
            return Err(CodecError::Malformed);
        }

        let signature = base64::decode_config(signature, base64::URL_SAFE_NO_PAD)
            .map_err(|_| CodecError::Malformed)?;
        let mut mac = self.mac.clone();
        mac.update(signed.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CodecError::BadSignature)?;

        let header = base64::decode_config(header, base64::URL_SAFE_NO_PAD)
            .map_err(|_| CodecError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header).map_err(|_| CodecError::Malformed)?;
        if header.alg != "HS256" {
            return Err(CodecError::Malformed);
        }

        let payload = base64::decode_config(payload, base64::URL_SAFE_NO_PAD)
            .map_err(|_| CodecError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| CodecError::Malformed)?;

        if let Some(exp) = claims.exp {
            if exp <= Utc::now().timestamp() {
                return Err(CodecError::Expired);
            }
        }

        Ok(claims)
    }
}

fn random_jti() -> String {
    let mut raw = [0u8; JTI_OCTETS];
    OsRng {}
        .try_fill_bytes(&mut raw)
        .expect("Failed to generate token id");
    base64::encode_config(&raw, base64::URL_SAFE_NO_PAD)
}

impl fmt::Display for CodecError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodecError::Malformed => fmt.write_str("token is not a valid signed token"),
            CodecError::BadSignature => fmt.write_str("token signature does not verify"),
            CodecError::Expired => fmt.write_str("token has expired"),
        }
    }
}

impl std::error::Error for CodecError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn descriptor(kind: TokenKind, ttl: Option<Duration>) -> TokenDescriptor {
        TokenDescriptor {
            kind,
            client_id: "Client".to_string(),
            user_id: Some("Owner".to_string()),
            scopes: "default".parse().unwrap(),
            audience: Some("https://client.example/endpoint".to_string()),
            ttl,
        }
    }

    #[test]
    fn opaque_tokens_never_repeat() {
        let codec = OpaqueCodec::new();
        let descriptor = descriptor(TokenKind::Access, Some(Duration::seconds(3600)));

        let one = codec.encode(&descriptor);
        let two = codec.encode(&descriptor);
        assert_ne!(one, two);
        // Url safe alphabet only; the token must survive query strings unescaped.
        assert!(one.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn signed_roundtrip() {
        let codec = JwtCodec::ephemeral();
        let descriptor = descriptor(TokenKind::Auth, Some(Duration::seconds(600)));

        let token = codec.encode(&descriptor).unwrap();
        let claims = codec.decode(&token).unwrap();

        assert_eq!(claims.kind, TokenKind::Auth);
        assert_eq!(claims.client, "Client");
        assert_eq!(claims.user_id.as_deref(), Some("Owner"));
        assert_eq!(claims.aud.as_deref(), Some("https://client.example/endpoint"));
        assert_eq!(claims.scopes, "default".parse().unwrap());
        assert!(claims.exp.unwrap() > claims.iat);
    }

    #[test]
    fn refresh_tokens_have_no_expiry() {
        let codec = JwtCodec::ephemeral();
        let descriptor = TokenDescriptor::refresh("Client", None, ScopeSet::new());

        let claims = codec.decode(&codec.encode(&descriptor).unwrap()).unwrap();
        assert_eq!(claims.exp, None);
    }

    #[test]
    fn unique_token_ids() {
        let codec = JwtCodec::ephemeral();
        let descriptor = descriptor(TokenKind::Access, Some(Duration::seconds(3600)));

        let one = codec.decode(&codec.encode(&descriptor).unwrap()).unwrap();
        let two = codec.decode(&codec.encode(&descriptor).unwrap()).unwrap();
        assert_ne!(one.jti, two.jti);
    }

    #[test]
    fn rejects_foreign_signature() {
        let ours = JwtCodec::ephemeral();
        let theirs = JwtCodec::ephemeral();
        let token = theirs
            .encode(&descriptor(TokenKind::Access, Some(Duration::seconds(3600))))
            .unwrap();

        assert_eq!(ours.decode(&token), Err(CodecError::BadSignature));
    }

    #[test]
    fn rejects_tampered_payload() {
        let codec = JwtCodec::ephemeral();
        let token = codec
            .encode(&descriptor(TokenKind::Access, Some(Duration::seconds(3600))))
            .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let other = codec
            .encode(&descriptor(TokenKind::Refresh, None))
            .unwrap();
        let stolen: Vec<&str> = other.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], stolen[1], parts[2]);

        assert_eq!(codec.decode(&forged), Err(CodecError::BadSignature));
    }

    #[test]
    fn rejects_expired() {
        let codec = JwtCodec::ephemeral();
        let token = codec
            .encode(&descriptor(TokenKind::Access, Some(Duration::seconds(0))))
            .unwrap();

        assert_eq!(codec.decode(&token), Err(CodecError::Expired));
    }

    #[test]
    fn rejects_garbage() {
        let codec = JwtCodec::ephemeral();
        assert_eq!(codec.decode("not-a-token"), Err(CodecError::Malformed));
        assert_eq!(codec.decode("a.b"), Err(CodecError::Malformed));
        assert_eq!(codec.decode(""), Err(CodecError::Malformed));
    }
}
