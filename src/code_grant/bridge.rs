//! Interface through which the host reports resource owner login and consent.
//!
//! The grant engine never authenticates users or renders consent pages. The host owns the
//! session and the ui; it consults these hooks at the authorization endpoint and only calls
//! into code issuance once both answers are positive. The engine itself does not enforce
//! this ordering.
use crate::primitives::scope::ScopeSet;

/// Outcome of asking the host whether a resource owner is authenticated.
#[derive(Clone, Debug, PartialEq)]
pub enum OwnerLogin {
    /// A user is signed in. The id, when present, becomes the `user_id` of issued grants.
    Authenticated {
        /// The host's identifier for the signed in user.
        user_id: Option<String>,
    },

    /// Nobody is signed in; the host has initiated its login flow, for example through a
    /// redirect, and will come back to the authorization step afterwards.
    InProgress,
}

/// Outcome of asking the resource owner to approve a client's scope request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OwnerConsent {
    /// The owner approved the request, issuance may proceed.
    Allowed,

    /// The owner rejected the request; the host answers with `access_denied`.
    Denied,

    /// The host has initiated its consent page and will come back with a decision.
    InProgress,
}

/// Hooks supplied by the host, consulted at the authorization endpoint.
///
/// Both methods default to the permissive answer, which enables a trivial single process
/// development mode where every request is treated as an authenticated, consenting owner.
pub trait OwnerBridge: Send + Sync {
    /// Whether a resource owner is currently authenticated with the host.
    fn login_resource_owner(&self) -> OwnerLogin {
        OwnerLogin::Authenticated { user_id: None }
    }

    /// Whether the resource owner approves `client_id` acting with `scopes`.
    fn confirm_by_resource_owner(&self, _client_id: &str, _scopes: &ScopeSet) -> OwnerConsent {
        OwnerConsent::Allowed
    }
}

/// The default bridge: always logged in, always consenting.
#[derive(Clone, Copy, Debug, Default)]
pub struct Permissive;

impl OwnerBridge for Permissive {}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticUser(&'static str);

    impl OwnerBridge for StaticUser {
        fn login_resource_owner(&self) -> OwnerLogin {
            OwnerLogin::Authenticated {
                user_id: Some(self.0.to_string()),
            }
        }

        fn confirm_by_resource_owner(&self, client_id: &str, _: &ScopeSet) -> OwnerConsent {
            if client_id == "trusted" {
                OwnerConsent::Allowed
            } else {
                OwnerConsent::Denied
            }
        }
    }

    #[test]
    fn permissive_defaults() {
        let bridge = Permissive;
        assert_eq!(
            bridge.login_resource_owner(),
            OwnerLogin::Authenticated { user_id: None }
        );
        assert_eq!(
            bridge.confirm_by_resource_owner("any", &ScopeSet::new()),
            OwnerConsent::Allowed
        );
    }

    #[test]
    fn host_bridge_decides() {
        let bridge = StaticUser("Owner");
        assert_eq!(
            bridge.login_resource_owner(),
            OwnerLogin::Authenticated {
                user_id: Some("Owner".to_string())
            }
        );
        assert_eq!(
            bridge.confirm_by_resource_owner("trusted", &ScopeSet::new()),
            OwnerConsent::Allowed
        );
        assert_eq!(
            bridge.confirm_by_resource_owner("other", &ScopeSet::new()),
            OwnerConsent::Denied
        );
    }
}
