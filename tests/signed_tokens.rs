//! The signed, self contained token mode: statelessness, tag checks and the denylist.
use codegrant::code_grant::engine::{
    AuthCodeRequest, CodeRedemption, GrantEngine, GrantEngineBuilder, IssuedToken, RefreshRequest,
};
use codegrant::primitives::grant::{AccessTokenRecord, AuthCodeRecord, RefreshTokenRecord};
use codegrant::primitives::registrar::{Client, ClientMap, Plaintext};
use codegrant::primitives::scope::ScopeSet;
use codegrant::primitives::store::{MemoryDenylist, Store, StoreError};
use codegrant::ErrorKind;

const CLIENT_ID: &str = "TrendyNewService";
const CLIENT_SECRET: &[u8] = b"boo";
const REDIRECT_URI: &str = "https://client.example/endpoint";
const JWT_SECRET: &[u8] = b"7EGgy8zManReq9l/ez0AyYE+xPpcTbssgW+8gBnIv3s=";

/// A store that fails the test if the engine ever touches it.
struct UntouchableStore;

impl Store for UntouchableStore {
    fn put_auth_code(&self, _: AuthCodeRecord) -> Result<(), StoreError> {
        panic!("signed mode must not store authorization codes");
    }

    fn take_auth_code(&self, _: &str) -> Result<Option<AuthCodeRecord>, StoreError> {
        panic!("signed mode must not read authorization codes");
    }

    fn mark_auth_code_redeemed(&self, _: AuthCodeRecord, _: &str) -> Result<(), StoreError> {
        panic!("signed mode must not mark authorization codes");
    }

    fn put_access_token(
        &self, _: AccessTokenRecord, _: RefreshTokenRecord,
    ) -> Result<(), StoreError> {
        panic!("signed mode must not store token pairs");
    }

    fn get_access_token(&self, _: &str) -> Result<Option<AccessTokenRecord>, StoreError> {
        panic!("signed mode must not read access tokens");
    }

    fn get_refresh_token(&self, _: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        panic!("signed mode must not read refresh tokens");
    }

    fn delete_access_token(&self, _: &str) -> Result<(), StoreError> {
        panic!("signed mode must not delete access tokens");
    }

    fn delete_refresh_token(&self, _: &str) -> Result<(), StoreError> {
        panic!("signed mode must not delete refresh tokens");
    }
}

fn client_map() -> ClientMap {
    let mut clients = ClientMap::with_policy(Plaintext::default());
    clients.register_client(
        Client::confidential(CLIENT_ID, CLIENT_SECRET)
            .allow("post_images")
            .allow("annoy_friends"),
    );
    clients
}

fn builder() -> GrantEngineBuilder {
    GrantEngine::builder()
        .clients(client_map())
        .store(UntouchableStore)
        .jwt_secret(JWT_SECRET)
}

fn scopes(list: &str) -> ScopeSet {
    list.parse().unwrap()
}

fn issue_code(engine: &GrantEngine) -> String {
    engine
        .issue_auth_code(&AuthCodeRequest {
            client_id: CLIENT_ID,
            user_id: Some("user-37"),
            scopes: scopes("post_images"),
            redirect_uri: Some(REDIRECT_URI),
        })
        .unwrap()
}

fn redeem(engine: &GrantEngine, code: &str) -> Result<IssuedToken, ErrorKind> {
    let authorized = engine
        .verify_auth_code(&CodeRedemption {
            client_id: CLIENT_ID,
            client_secret: Some(CLIENT_SECRET),
            code,
            redirect_uri: Some(REDIRECT_URI),
        })
        .map_err(|err| err.kind().expect("not a protocol error"))?;
    Ok(engine.issue_access_token(authorized).unwrap())
}

#[test]
fn whole_flow_never_touches_the_store() {
    let engine = builder().build().unwrap();

    engine
        .verify_client(CLIENT_ID, &scopes("post_images"))
        .unwrap();

    let code = issue_code(&engine);
    let issued = redeem(&engine, &code).unwrap();

    let verified = engine
        .verify_access_token(&issued.access_token, &scopes("post_images"), false)
        .unwrap();
    assert_eq!(verified.client_id, CLIENT_ID);
    assert_eq!(verified.user_id.as_deref(), Some("user-37"));
    assert!(verified.expires_at.is_some());

    let refreshed = engine
        .refresh_access_token(&RefreshRequest {
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
            refresh_token: &issued.refresh_token,
            scopes: None,
        })
        .unwrap();
    assert!(engine
        .verify_access_token(&refreshed.access_token, &scopes("post_images"), false)
        .is_ok());
}

#[test]
fn token_kind_is_enforced() {
    let engine = builder().build().unwrap();
    let code = issue_code(&engine);
    let issued = redeem(&engine, &code).unwrap();

    // An access token is no refresh token and vice versa.
    assert_eq!(
        engine
            .verify_access_token(&issued.access_token, &ScopeSet::new(), true)
            .unwrap_err()
            .kind(),
        Some(ErrorKind::InvalidGrant)
    );
    assert_eq!(
        engine
            .verify_access_token(&issued.refresh_token, &ScopeSet::new(), false)
            .unwrap_err()
            .kind(),
        Some(ErrorKind::InvalidGrant)
    );

    // An authorization code passes as neither.
    let code = issue_code(&engine);
    assert_eq!(
        engine
            .verify_access_token(&code, &ScopeSet::new(), false)
            .unwrap_err()
            .kind(),
        Some(ErrorKind::InvalidGrant)
    );
}

#[test]
fn code_is_bound_to_its_client() {
    let mut clients = client_map();
    clients.register_client(Client::confidential("OtherService", b"hiss").allow("post_images"));
    let engine = GrantEngine::builder()
        .clients(clients)
        .store(UntouchableStore)
        .jwt_secret(JWT_SECRET)
        .build()
        .unwrap();

    let code = issue_code(&engine);

    // Another registered client cannot redeem the code.
    assert_eq!(
        engine
            .verify_auth_code(&CodeRedemption {
                client_id: "OtherService",
                client_secret: Some(b"hiss"),
                code: &code,
                redirect_uri: Some(REDIRECT_URI),
            })
            .unwrap_err()
            .kind(),
        Some(ErrorKind::InvalidGrant)
    );

    // An unregistered client is told apart, the code itself decoded fine.
    let foreign = engine
        .issue_auth_code(&AuthCodeRequest {
            client_id: "GhostService",
            user_id: None,
            scopes: scopes("post_images"),
            redirect_uri: Some(REDIRECT_URI),
        })
        .unwrap();
    assert_eq!(
        engine
            .verify_auth_code(&CodeRedemption {
                client_id: "GhostService",
                client_secret: Some(b"boo"),
                code: &foreign,
                redirect_uri: Some(REDIRECT_URI),
            })
            .unwrap_err()
            .kind(),
        Some(ErrorKind::UnauthorizedClient)
    );
}

#[test]
fn wrong_secret_is_rejected() {
    let engine = builder().build().unwrap();
    let code = issue_code(&engine);

    assert_eq!(
        engine
            .verify_auth_code(&CodeRedemption {
                client_id: CLIENT_ID,
                client_secret: Some(b"wrong"),
                code: &code,
                redirect_uri: Some(REDIRECT_URI),
            })
            .unwrap_err()
            .kind(),
        Some(ErrorKind::InvalidGrant)
    );
}

#[test]
fn tampered_tokens_are_rejected() {
    let engine = builder().build().unwrap();
    let issued = redeem(&engine, &issue_code(&engine)).unwrap();

    let mut tampered = issued.access_token.clone();
    // Flip the final signature character to something else from the url safe alphabet.
    let last = tampered.pop().unwrap();
    tampered.push(if last == 'A' { 'B' } else { 'A' });

    assert_eq!(
        engine
            .verify_access_token(&tampered, &ScopeSet::new(), false)
            .unwrap_err()
            .kind(),
        Some(ErrorKind::InvalidGrant)
    );
}

#[test]
fn without_denylist_codes_can_be_replayed() {
    let engine = builder().build().unwrap();
    let code = issue_code(&engine);

    // Stateless verification has nothing to remember a redemption by.
    assert!(redeem(&engine, &code).is_ok());
    assert!(redeem(&engine, &code).is_ok());
}

#[test]
fn denylist_restores_replay_detection() {
    let engine = builder().denylist(MemoryDenylist::new()).build().unwrap();
    let code = issue_code(&engine);

    assert!(redeem(&engine, &code).is_ok());
    assert_eq!(redeem(&engine, &code).unwrap_err(), ErrorKind::InvalidGrant);
}

#[test]
fn denylist_rotates_refresh_tokens() {
    let engine = builder().denylist(MemoryDenylist::new()).build().unwrap();
    let issued = redeem(&engine, &issue_code(&engine)).unwrap();

    let rotate = |token: &str| {
        engine.refresh_access_token(&RefreshRequest {
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
            refresh_token: token,
            scopes: None,
        })
    };

    let refreshed = rotate(&issued.refresh_token).unwrap();
    // The rotated-out token is retired on the denylist.
    assert_eq!(
        rotate(&issued.refresh_token).unwrap_err().kind(),
        Some(ErrorKind::InvalidGrant)
    );
    assert!(rotate(&refreshed.refresh_token).is_ok());
}

#[test]
fn denylist_backs_revocation() {
    let engine = builder().denylist(MemoryDenylist::new()).build().unwrap();
    let issued = redeem(&engine, &issue_code(&engine)).unwrap();

    assert!(engine
        .verify_access_token(&issued.access_token, &scopes("post_images"), false)
        .is_ok());

    engine.revoke_token(&issued.access_token).unwrap();
    assert_eq!(
        engine
            .verify_access_token(&issued.access_token, &scopes("post_images"), false)
            .unwrap_err()
            .kind(),
        Some(ErrorKind::InvalidGrant)
    );
}

#[test]
fn scope_claims_are_enforced() {
    let engine = builder().build().unwrap();
    let issued = redeem(&engine, &issue_code(&engine)).unwrap();

    assert!(engine
        .verify_access_token(&issued.access_token, &scopes("post_images"), false)
        .is_ok());
    assert_eq!(
        engine
            .verify_access_token(&issued.access_token, &scopes("annoy_friends"), false)
            .unwrap_err()
            .kind(),
        Some(ErrorKind::InvalidGrant)
    );
}
