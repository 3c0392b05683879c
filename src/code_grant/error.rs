//! Errors defined in [rfc6749].
//!
//! [rfc6749]: https://tools.ietf.org/html/rfc6749#section-5.2
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::vec;

use crate::primitives::codec::CodecError;
use crate::primitives::store::StoreError;

/// The protocol error codes emitted by the grant engine.
///
/// These are the only values ever surfaced to clients. Verification failures of codes and
/// tokens deliberately collapse into the single [`InvalidGrant`] kind so that absence,
/// expiry, bad secrets and replays cannot be told apart from the outside.
///
/// [`InvalidGrant`]: #variant.InvalidGrant
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The request is missing a required parameter or is otherwise malformed, for example a
    /// bearer header that does not parse.
    InvalidRequest,

    /// The requested scope is unknown to the client's scope policy.
    InvalidScope,

    /// The requested scope is known but disabled for this client, or the resource owner
    /// denied the request.
    AccessDenied,

    /// The client id is unknown.
    UnauthorizedClient,

    /// The provided authorization code or token is invalid, expired, revoked, does not
    /// match the redirection uri used in the authorization request, or was issued to
    /// another client.
    InvalidGrant,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidScope => "invalid_scope",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::UnauthorizedClient => "unauthorized_client",
            ErrorKind::InvalidGrant => "invalid_grant",
        }
    }
}

/// Represents parameters of a protocol error response.
///
/// Hosts render this as the `error=` component of a redirect query or as the json body of a
/// bad request response.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolError {
    error: ErrorKind,
    description: Option<Cow<'static, str>>,
}

impl ProtocolError {
    pub(crate) fn new(error: ErrorKind) -> Self {
        ProtocolError {
            error,
            description: None,
        }
    }

    /// Get the formal kind of error.
    pub fn kind(&self) -> ErrorKind {
        self.error
    }

    /// Provide a short text explanation for the error.
    pub fn explain<D: Into<Cow<'static, str>>>(&mut self, description: D) {
        self.description = Some(description.into())
    }

    /// Iterate over the key value pairs that describe this error.
    ///
    /// These pairs must be added to the detailed description of an error, either as part of
    /// a form urlencoded query component in a `Location` header or in a json body.
    pub fn iter(&self) -> <&Self as IntoIterator>::IntoIter {
        self.into_iter()
    }

    /// Convert the error into a json string, viable for being sent over a network with
    /// `application/json` encoding.
    pub fn to_json(&self) -> String {
        let asmap = self
            .iter()
            .map(|(k, v)| (k.to_string(), v.into_owned()))
            .collect::<HashMap<String, String>>();
        serde_json::to_string(&asmap).unwrap()
    }
}

/// An operation of the grant engine did not complete.
#[derive(Clone, Debug)]
pub enum GrantError {
    /// The request was answered with a protocol error defined by the rfc.
    ///
    /// This is a regular outcome of grant processing, not a malfunction.
    Protocol(ProtocolError),

    /// An underlying primitive failed and no protocol answer exists.
    ///
    /// Hosts should answer with an internal server error and consult their own diagnostics.
    Primitive(PrimitiveError),
}

/// The failing primitive behind a [`GrantError::Primitive`].
///
/// [`GrantError::Primitive`]: enum.GrantError.html#variant.Primitive
#[derive(Clone, Debug)]
pub enum PrimitiveError {
    /// The token store failed.
    Store(StoreError),

    /// The client registry failed.
    Registrar,

    /// The token codec failed to produce a token.
    Codec,
}

impl GrantError {
    pub(crate) fn protocol(kind: ErrorKind) -> Self {
        GrantError::Protocol(ProtocolError::new(kind))
    }

    /// The protocol error kind, if this is a protocol level rejection.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            GrantError::Protocol(err) => Some(err.kind()),
            GrantError::Primitive(_) => None,
        }
    }
}

impl From<StoreError> for GrantError {
    fn from(err: StoreError) -> Self {
        GrantError::Primitive(PrimitiveError::Store(err))
    }
}

impl From<CodecError> for GrantError {
    fn from(_: CodecError) -> Self {
        GrantError::Primitive(PrimitiveError::Codec)
    }
}

impl AsRef<str> for ErrorKind {
    fn as_ref(&self) -> &str {
        self.description()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}

impl fmt::Display for GrantError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrantError::Protocol(err) => write!(f, "{}", err),
            GrantError::Primitive(err) => write!(f, "{}", err),
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrimitiveError::Store(err) => write!(f, "{}", err),
            PrimitiveError::Registrar => f.write_str("client registry failure"),
            PrimitiveError::Codec => f.write_str("token codec failure"),
        }
    }
}

impl std::error::Error for ProtocolError {}
impl std::error::Error for GrantError {}

/// The error as key-value pairs.
impl IntoIterator for ProtocolError {
    type Item = (&'static str, Cow<'static, str>);
    type IntoIter = vec::IntoIter<(&'static str, Cow<'static, str>)>;

    fn into_iter(self) -> Self::IntoIter {
        let mut vec = vec![("error", Cow::Borrowed(self.error.description()))];
        if let Some(description) = self.description {
            vec.push(("error_description", description));
        }
        vec.into_iter()
    }
}

impl IntoIterator for &'_ ProtocolError {
    type Item = (&'static str, Cow<'static, str>);
    type IntoIter = vec::IntoIter<(&'static str, Cow<'static, str>)>;

    fn into_iter(self) -> Self::IntoIter {
        let mut vec = vec![("error", Cow::Borrowed(self.error.description()))];
        if let Some(description) = &self.description {
            vec.push(("error_description", description.clone()));
        }
        vec.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings() {
        assert_eq!(ErrorKind::InvalidRequest.as_ref(), "invalid_request");
        assert_eq!(ErrorKind::InvalidScope.as_ref(), "invalid_scope");
        assert_eq!(ErrorKind::AccessDenied.as_ref(), "access_denied");
        assert_eq!(ErrorKind::UnauthorizedClient.as_ref(), "unauthorized_client");
        assert_eq!(ErrorKind::InvalidGrant.as_ref(), "invalid_grant");
    }

    #[test]
    fn json_rendering() {
        let mut error = ProtocolError::new(ErrorKind::InvalidGrant);
        error.explain("code was already redeemed");

        let json = error.to_json();
        let parsed: HashMap<String, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get("error").map(String::as_str), Some("invalid_grant"));
        assert_eq!(
            parsed.get("error_description").map(String::as_str),
            Some("code was already redeemed")
        );
    }
}
