//! The client registry and the secret policies guarding client credentials.
//!
//! During grant processing the registry answers two questions: which scopes a client may
//! request, and whether a presented credential authenticates it. Registration itself is not
//! covered by this library; hosts populate a [`ClientMap`] up front or implement
//! [`Registrar`] over their own client database.
//!
//! [`ClientMap`]: struct.ClientMap.html
//! [`Registrar`]: trait.Registrar.html
use std::collections::HashMap;
use std::fmt;
use std::iter::{Extend, FromIterator};
use std::sync::Arc;

use argon2::{self, Config};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// The scope policy of a client: scope name to granted (`true`) or known-but-denied
/// (`false`). A scope absent from the map is unknown to the client.
pub type ScopeMap = HashMap<String, bool>;

/// Registrars provide read access to client records.
///
/// The registry is immutable for the lifetime of a grant engine; registration happens out
/// of band. Hosts with their own client database implement this trait instead of using the
/// in-memory [`ClientMap`].
///
/// [`ClientMap`]: struct.ClientMap.html
pub trait Registrar: Send + Sync {
    /// Look up the scope policy of a client. `Ok(None)` means the client id is unknown.
    fn lookup(&self, client_id: &str) -> Result<Option<ScopeMap>, RegistrarError>;

    /// Try to authenticate as the client with some credential.
    fn check(&self, client_id: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError>;
}

/// Answers a registrar can give besides success.
#[derive(Clone, Debug)]
pub enum RegistrarError {
    /// The client is unknown, or the credential did not match.
    ///
    /// Both causes share one variant on purpose: an answer that told a guessed client id
    /// apart from a guessed secret would hand callers an enumeration oracle.
    Unspecified,

    /// The registry back-end itself failed. Carries no protocol meaning.
    PrimitiveError,
}

/// A client known to the authorization server, as assembled at registration time.
///
/// Confidential clients hold a secret and can be authenticated on the back channel. Public
/// clients (native apps, single page apps) cannot keep one and are identified by id alone.
#[derive(Clone, Debug)]
pub struct Client {
    client_id: String,
    scopes: ScopeMap,
    credentials: ClientCredentials,
}

/// The storable form of a client, its credential already run through a [`SecretPolicy`].
///
/// [`SecretPolicy`]: trait.SecretPolicy.html
#[derive(Clone, Debug)]
pub struct EncodedClient {
    /// The id of this client, the key under which it is registered.
    pub client_id: String,

    /// The scope policy of the client.
    pub scopes: ScopeMap,

    /// The credential in its policy-encoded form.
    pub credentials: ClientCredentials,
}

/// Credential material attached to a client record.
#[derive(Clone)]
pub enum ClientCredentials {
    /// No credential; the client authenticates by id alone.
    Public,

    /// A secret, held as whatever bytes the active policy produced from it.
    Confidential {
        /// Policy-encoded secret data.
        passdata: Vec<u8>,
    },
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        // Never print credential bytes, encoded or not.
        match self {
            ClientCredentials::Public => f.write_str("ClientCredentials::Public"),
            ClientCredentials::Confidential { .. } => {
                f.write_str("ClientCredentials::Confidential(..)")
            }
        }
    }
}

impl Client {
    /// Create a public client without any granted scopes.
    pub fn public(client_id: &str) -> Client {
        Client {
            client_id: client_id.to_string(),
            scopes: ScopeMap::new(),
            credentials: ClientCredentials::Public,
        }
    }

    /// Create a confidential client without any granted scopes.
    pub fn confidential(client_id: &str, passphrase: &[u8]) -> Client {
        Client {
            client_id: client_id.to_string(),
            scopes: ScopeMap::new(),
            credentials: ClientCredentials::Confidential {
                passdata: passphrase.to_owned(),
            },
        }
    }

    /// Grant the named scope to this client.
    pub fn allow(mut self, scope: &str) -> Self {
        self.scopes.insert(scope.to_string(), true);
        self
    }

    /// Register the named scope as known but disabled for this client.
    ///
    /// Requests for a denied scope are answered differently from requests for a scope the
    /// client never registered, see the grant engine's client verification.
    pub fn deny(mut self, scope: &str) -> Self {
        self.scopes.insert(scope.to_string(), false);
        self
    }

    /// Replace the whole scope policy at once.
    pub fn with_scopes(mut self, scopes: ScopeMap) -> Self {
        self.scopes = scopes;
        self
    }

    /// Run the credential through a policy, producing the storable form of the client.
    ///
    /// Until this point a confidential client still holds the raw passphrase it was
    /// constructed with; afterwards only the policy output remains.
    pub fn encode(self, policy: &dyn SecretPolicy) -> EncodedClient {
        let credentials = match self.credentials {
            ClientCredentials::Public => ClientCredentials::Public,
            ClientCredentials::Confidential { passdata } => ClientCredentials::Confidential {
                passdata: policy.store(&self.client_id, &passdata),
            },
        };

        EncodedClient {
            client_id: self.client_id,
            scopes: self.scopes,
            credentials,
        }
    }
}

impl EncodedClient {
    /// Check a presented credential under the policy that encoded this client.
    ///
    /// A public client passes exactly when no credential is offered; one that sends a
    /// secret anyway is misconfigured or probing, and is refused. A confidential client
    /// must present a secret that the policy accepts against the stored encoding.
    pub fn authenticate(
        &self, policy: &dyn SecretPolicy, passphrase: Option<&[u8]>,
    ) -> Result<(), RegistrarError> {
        match &self.credentials {
            ClientCredentials::Public => match passphrase {
                None => Ok(()),
                Some(_) => Err(RegistrarError::Unspecified),
            },
            ClientCredentials::Confidential { passdata } => {
                let provided = passphrase.ok_or(RegistrarError::Unspecified)?;
                policy.check(&self.client_id, provided, passdata)
            }
        }
    }
}

/// Encodes client secrets for storage and decides whether a presented secret matches.
///
/// `check` MUST run in constant time with respect to the secret material; a comparison
/// that bails out at the first differing byte lets callers binary-search the secret.
pub trait SecretPolicy: Send + Sync {
    /// Encode a secret at registration time into the bytes kept in the client record.
    fn store(&self, client_id: &str, passphrase: &[u8]) -> Vec<u8>;

    /// Decide whether `passphrase` matches the `stored` encoding for this client.
    fn check(&self, client_id: &str, passphrase: &[u8], stored: &[u8]) -> Result<(), RegistrarError>;
}

/// The default policy: secrets are kept as salted argon2 hashes.
#[derive(Clone, Debug, Default)]
pub struct Argon2 {
    _private: (),
}

impl SecretPolicy for Argon2 {
    fn store(&self, client_id: &str, passphrase: &[u8]) -> Vec<u8> {
        let mut salt = [0u8; 32];
        OsRng {}
            .try_fill_bytes(&mut salt)
            .expect("Failed to generate hash salt");

        // The client id goes in as associated data, so the hash commits to the record it
        // belongs to: lifting the passdata bytes onto another client's entry produces a
        // blob that no longer verifies there.
        let config = Config {
            ad: client_id.as_bytes(),
            ..Config::default()
        };

        argon2::hash_encoded(passphrase, &salt, &config)
            .expect("argon2 parameters are statically valid")
            .into_bytes()
    }

    fn check(&self, client_id: &str, passphrase: &[u8], stored: &[u8]) -> Result<(), RegistrarError> {
        let encoded =
            std::str::from_utf8(stored).map_err(|_| RegistrarError::PrimitiveError)?;

        // Same associated data as in `store`; the empty slice is the (unused) keyed-hash
        // secret, not the client credential.
        match argon2::verify_encoded_ext(encoded, passphrase, &[], client_id.as_bytes()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(RegistrarError::Unspecified),
            Err(_) => Err(RegistrarError::PrimitiveError),
        }
    }
}

/// Keep secrets as they are and compare them in constant time.
///
/// Use this when the host already stores client secrets elsewhere and hands them over
/// verbatim, or in tests. Prefer [`Argon2`] wherever the registrar is the system of record.
///
/// [`Argon2`]: struct.Argon2.html
#[derive(Clone, Debug, Default)]
pub struct Plaintext {
    _private: (),
}

impl SecretPolicy for Plaintext {
    fn store(&self, _client_id: &str, passphrase: &[u8]) -> Vec<u8> {
        passphrase.to_vec()
    }

    fn check(&self, _client_id: &str, passphrase: &[u8], stored: &[u8]) -> Result<(), RegistrarError> {
        if bool::from(passphrase.ct_eq(stored)) {
            Ok(())
        } else {
            Err(RegistrarError::Unspecified)
        }
    }
}

/// A very simple, in-memory hash map of client ids to client entries.
///
/// The secret policy is fixed at construction and encodes every credential on its way in,
/// so the map never holds a raw secret.
pub struct ClientMap {
    clients: HashMap<String, EncodedClient>,
    policy: Box<dyn SecretPolicy>,
}

impl ClientMap {
    /// Create an empty map hashing secrets with the default [`Argon2`] policy.
    ///
    /// [`Argon2`]: struct.Argon2.html
    pub fn new() -> ClientMap {
        ClientMap::with_policy(Argon2::default())
    }

    /// Create an empty map encoding secrets with a custom policy.
    pub fn with_policy<P: SecretPolicy + 'static>(policy: P) -> ClientMap {
        ClientMap {
            clients: HashMap::new(),
            policy: Box::new(policy),
        }
    }

    /// Insert or update a client record, encoding its credential on the way in.
    pub fn register_client(&mut self, client: Client) {
        let encoded = client.encode(&*self.policy);
        self.clients.insert(encoded.client_id.clone(), encoded);
    }
}

impl Default for ClientMap {
    fn default() -> Self {
        ClientMap::new()
    }
}

impl Extend<Client> for ClientMap {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = Client>,
    {
        iter.into_iter().for_each(|client| self.register_client(client))
    }
}

impl FromIterator<Client> for ClientMap {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Client>,
    {
        let mut into = ClientMap::new();
        into.extend(iter);
        into
    }
}

impl Registrar for ClientMap {
    fn lookup(&self, client_id: &str) -> Result<Option<ScopeMap>, RegistrarError> {
        Ok(self.clients.get(client_id).map(|client| client.scopes.clone()))
    }

    fn check(&self, client_id: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        match self.clients.get(client_id) {
            Some(client) => client.authenticate(&*self.policy, passphrase),
            None => Err(RegistrarError::Unspecified),
        }
    }
}

impl<'s, R: Registrar + ?Sized> Registrar for &'s R {
    fn lookup(&self, client_id: &str) -> Result<Option<ScopeMap>, RegistrarError> {
        (**self).lookup(client_id)
    }

    fn check(&self, client_id: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(client_id, passphrase)
    }
}

impl<R: Registrar + ?Sized> Registrar for Box<R> {
    fn lookup(&self, client_id: &str) -> Result<Option<ScopeMap>, RegistrarError> {
        (**self).lookup(client_id)
    }

    fn check(&self, client_id: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(client_id, passphrase)
    }
}

impl<R: Registrar + ?Sized> Registrar for Arc<R> {
    fn lookup(&self, client_id: &str) -> Result<Option<ScopeMap>, RegistrarError> {
        (**self).lookup(client_id)
    }

    fn check(&self, client_id: &str, passphrase: Option<&[u8]>) -> Result<(), RegistrarError> {
        (**self).check(client_id, passphrase)
    }
}

impl fmt::Display for RegistrarError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistrarError::Unspecified => fmt.write_str("client authentication failed"),
            RegistrarError::PrimitiveError => fmt.write_str("client registry failure"),
        }
    }
}

impl std::error::Error for RegistrarError {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariants every registrar should uphold, public and confidential clients alike.
    ///
    /// Custom implementations may want to import and use this in their own tests.
    pub fn simple_test_suite<Reg, RegFn>(registrar: &mut Reg, register: RegFn)
    where
        Reg: Registrar,
        RegFn: Fn(&mut Reg, Client),
    {
        register(registrar, Client::public("PhotoViewer").allow("view_images"));
        register(
            registrar,
            Client::confidential("TrendyNewService", b"boo")
                .allow("post_images")
                .deny("sleep"),
        );

        registrar
            .check("PhotoViewer", None)
            .expect("public client without a secret must pass");
        registrar
            .check("PhotoViewer", Some(b"boo"))
            .expect_err("a secret offered for a public client must be refused");

        registrar
            .check("TrendyNewService", Some(b"boo"))
            .expect("the registered secret must authenticate");
        registrar
            .check("TrendyNewService", Some(b"bo"))
            .expect_err("a wrong secret must not authenticate");
        registrar
            .check("TrendyNewService", None)
            .expect_err("a confidential client must present its secret");
        registrar
            .check("SomeoneElse", Some(b"boo"))
            .expect_err("an unknown client must not authenticate");

        let scopes = registrar
            .lookup("TrendyNewService")
            .expect("registry should answer")
            .expect("client was registered");
        assert_eq!(scopes.get("post_images"), Some(&true));
        assert_eq!(scopes.get("sleep"), Some(&false));
        assert_eq!(scopes.get("view_images"), None);
        assert!(registrar.lookup("SomeoneElse").unwrap().is_none());
    }

    #[test]
    fn public_clients_refuse_credentials() {
        let policy = Plaintext::default();
        let client = Client::public("PhotoViewer").allow("view_images").encode(&policy);

        assert!(client.authenticate(&policy, None).is_ok());
        assert!(client.authenticate(&policy, Some(b"")).is_err());
        assert!(client.authenticate(&policy, Some(b"anything")).is_err());
    }

    #[test]
    fn confidential_clients_require_their_secret() {
        let policy = Plaintext::default();
        let client = Client::confidential("TrendyNewService", b"boo")
            .allow("post_images")
            .encode(&policy);

        assert!(client.authenticate(&policy, Some(b"boo")).is_ok());
        assert!(client.authenticate(&policy, None).is_err());
        assert!(client.authenticate(&policy, Some(b"bo")).is_err());
        assert!(client.authenticate(&policy, Some(b"")).is_err());
    }

    #[test]
    fn argon2_binds_the_hash_to_its_client() {
        let policy = Argon2::default();
        let stored = policy.store("TrendyNewService", b"boo");

        assert!(policy.check("TrendyNewService", b"boo", &stored).is_ok());
        assert!(policy.check("TrendyNewService", b"bo", &stored).is_err());
        // The same passdata moved onto another client id must not verify there.
        assert!(policy.check("ImposterService", b"boo", &stored).is_err());
    }

    #[test]
    fn plaintext_policy_compares_exactly() {
        let policy = Plaintext::default();
        let stored = policy.store("TrendyNewService", b"boo");
        assert!(policy.check("TrendyNewService", b"boo", &stored).is_ok());
        assert!(policy.check("TrendyNewService", b"bo", &stored).is_err());
        assert!(policy.check("TrendyNewService", b"bool", &stored).is_err());
    }

    #[test]
    fn scope_policy_is_exposed() {
        let mut map = ClientMap::new();
        map.register_client(
            Client::public("TrendyNewService")
                .allow("post_images")
                .deny("sleep"),
        );

        let scopes = map.lookup("TrendyNewService").unwrap().unwrap();
        assert_eq!(scopes.get("post_images"), Some(&true));
        assert_eq!(scopes.get("sleep"), Some(&false));
        assert_eq!(scopes.get("yawn"), None);
    }

    #[test]
    fn client_map_with_plaintext_policy() {
        let mut map = ClientMap::with_policy(Plaintext::default());
        simple_test_suite(&mut map, ClientMap::register_client);
    }

    #[test]
    fn client_map_with_argon2_policy() {
        let mut map = ClientMap::new();
        simple_test_suite(&mut map, ClientMap::register_client);
    }
}
