use crate::libs::api::{ApiClient, ConnectAction, ReviewAction};
use crate::libs::core::models::UserId;
use crate::libs::models::{ConnectionRequest, SignupRequest, UserProfile};
use crate::libs::state::AppState;
use crate::ClientError;
use async_trait::async_trait;

/// REST calls the account screens depend on.
#[async_trait]
pub trait AccountApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError>;
    async fn signup(&self, request: &SignupRequest) -> Result<String, ClientError>;
    async fn logout(&self) -> Result<(), ClientError>;
    async fn current_profile(&self) -> Result<UserProfile, ClientError>;
    async fn feed(&self) -> Result<Vec<UserProfile>, ClientError>;
    async fn send_interest(&self, user: &UserId, action: ConnectAction) -> Result<(), ClientError>;
    async fn requests(&self) -> Result<Vec<ConnectionRequest>, ClientError>;
    async fn review_request(&self, request_id: &str, action: ReviewAction) -> Result<(), ClientError>;
    async fn connections(&self) -> Result<Vec<UserProfile>, ClientError>;
    async fn ignored_reviews(&self) -> Result<Vec<ConnectionRequest>, ClientError>;
    async fn review_ignored(&self, request_id: &str, action: ReviewAction) -> Result<(), ClientError>;
}

#[async_trait]
impl AccountApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        ApiClient::login(self, email, password).await
    }

    async fn signup(&self, request: &SignupRequest) -> Result<String, ClientError> {
        ApiClient::signup(self, request).await
    }

    async fn logout(&self) -> Result<(), ClientError> {
        ApiClient::logout(self).await
    }

    async fn current_profile(&self) -> Result<UserProfile, ClientError> {
        ApiClient::current_profile(self).await
    }

    async fn feed(&self) -> Result<Vec<UserProfile>, ClientError> {
        ApiClient::feed(self).await
    }

    async fn send_interest(&self, user: &UserId, action: ConnectAction) -> Result<(), ClientError> {
        ApiClient::send_interest(self, user, action).await
    }

    async fn requests(&self) -> Result<Vec<ConnectionRequest>, ClientError> {
        ApiClient::requests(self).await
    }

    async fn review_request(&self, request_id: &str, action: ReviewAction) -> Result<(), ClientError> {
        ApiClient::review_request(self, request_id, action).await
    }

    async fn connections(&self) -> Result<Vec<UserProfile>, ClientError> {
        ApiClient::connections(self).await
    }

    async fn ignored_reviews(&self) -> Result<Vec<ConnectionRequest>, ClientError> {
        ApiClient::ignored_reviews(self).await
    }

    async fn review_ignored(&self, request_id: &str, action: ReviewAction) -> Result<(), ClientError> {
        ApiClient::review_ignored(self, request_id, action).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
}

impl From<SwipeDirection> for ConnectAction {
    fn from(direction: SwipeDirection) -> Self {
        match direction {
            SwipeDirection::Right => ConnectAction::Interested,
            SwipeDirection::Left => ConnectAction::Ignored,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwipeOutcome {
    pub user_id: String,
    pub action: ConnectAction,
    /// False when the server call failed; the card is removed regardless.
    pub delivered: bool,
}

/// Re-validates the session cookie. An unauthorized answer signs the user out locally.
pub async fn restore_session<A: AccountApi + ?Sized>(
    state: &mut AppState,
    api: &A,
) -> Result<Option<UserProfile>, ClientError> {
    state.user.set_loading(true);
    let result = api.current_profile().await;
    state.user.set_loading(false);
    match result {
        Ok(profile) => {
            state.user.set_user(profile.clone());
            Ok(Some(profile))
        }
        Err(err) if err.is_unauthorized() => {
            tracing::info!("stored session rejected, signing out");
            state.reset();
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub async fn login<A: AccountApi + ?Sized>(
    state: &mut AppState,
    api: &A,
    email: &str,
    password: &str,
) -> Result<UserProfile, ClientError> {
    state.user.set_loading(true);
    let result = api.login(email, password).await;
    state.user.set_loading(false);
    let profile = result?;
    state.reset();
    state.user.set_user(profile.clone());
    Ok(profile)
}

/// Registers an account without signing in; the front-end moves on to the login screen.
pub async fn signup<A: AccountApi + ?Sized>(
    state: &mut AppState,
    api: &A,
    request: &SignupRequest,
    password_confirmation: &str,
) -> Result<String, ClientError> {
    if request.password != password_confirmation {
        return Err(ClientError::InvalidInput("passwords do not match".into()));
    }
    state.user.set_loading(true);
    let result = api.signup(request).await;
    state.user.set_loading(false);
    result
}

/// Local state is cleared even when the server call fails.
pub async fn logout<A: AccountApi + ?Sized>(state: &mut AppState, api: &A) -> Result<(), ClientError> {
    let result = api.logout().await;
    state.reset();
    if let Err(err) = &result {
        tracing::warn!("logout request failed: {}", err);
    }
    result
}

/// Fetches the deck only when it is empty. Returns the number of profiles available.
pub async fn load_feed<A: AccountApi + ?Sized>(state: &mut AppState, api: &A) -> Result<usize, ClientError> {
    if !state.feed.needs_fetch() {
        return Ok(state.feed.profiles().len());
    }
    let feed = api.feed().await?;
    tracing::debug!(count = feed.len(), "feed loaded");
    state.feed.set_feed(feed);
    Ok(state.feed.profiles().len())
}

pub async fn swipe<A: AccountApi + ?Sized>(
    state: &mut AppState,
    api: &A,
    direction: SwipeDirection,
) -> Option<SwipeOutcome> {
    let user_id = state.feed.current()?.id.clone();
    let action = ConnectAction::from(direction);
    let delivered = match UserId::parse(&user_id) {
        Some(user) => match api.send_interest(&user, action).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user = %user, "connection action failed: {}", err);
                false
            }
        },
        None => false,
    };
    state.feed.remove_from_feed(&user_id);
    Some(SwipeOutcome {
        user_id,
        action,
        delivered,
    })
}

pub async fn load_requests<A: AccountApi + ?Sized>(state: &mut AppState, api: &A) -> Result<usize, ClientError> {
    let requests = api.requests().await?;
    state.requests.set_requests(requests);
    Ok(state.requests.requests.len())
}

/// The request leaves the list only once the server accepted the review.
pub async fn review_request<A: AccountApi + ?Sized>(
    state: &mut AppState,
    api: &A,
    request_id: &str,
    action: ReviewAction,
) -> Result<(), ClientError> {
    api.review_request(request_id, action).await?;
    state.requests.remove(request_id);
    Ok(())
}

pub async fn load_connections<A: AccountApi + ?Sized>(state: &mut AppState, api: &A) -> Result<usize, ClientError> {
    let connections = api.connections().await?;
    state.connections.set_connections(connections);
    Ok(state.connections.connections.len())
}

pub async fn load_reviews<A: AccountApi + ?Sized>(state: &mut AppState, api: &A) -> Result<usize, ClientError> {
    let reviews = api.ignored_reviews().await?;
    state.reviews.set_reviews(reviews);
    Ok(state.reviews.reviews.len())
}

pub async fn review_ignored<A: AccountApi + ?Sized>(
    state: &mut AppState,
    api: &A,
    request_id: &str,
    action: ReviewAction,
) -> Result<(), ClientError> {
    api.review_ignored(request_id, action).await?;
    state.reviews.remove(request_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn profile(id: &str) -> UserProfile {
        serde_json::from_value(json!({ "_id": id, "firstName": id })).unwrap()
    }

    fn request(id: &str) -> ConnectionRequest {
        serde_json::from_value(json!({ "_id": id })).unwrap()
    }

    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        unauthorized: bool,
        fail_actions: bool,
        feed: Vec<UserProfile>,
    }

    impl FakeApi {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn action_result(&self) -> Result<(), ClientError> {
            if self.fail_actions {
                Err(ClientError::Api {
                    status: 500,
                    message: "boom".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl AccountApi for FakeApi {
        async fn login(&self, email: &str, _password: &str) -> Result<UserProfile, ClientError> {
            self.record(format!("login {}", email));
            Ok(profile("me"))
        }

        async fn signup(&self, request: &SignupRequest) -> Result<String, ClientError> {
            self.record(format!("signup {}", request.email));
            self.action_result().map(|()| "created".to_string())
        }

        async fn logout(&self) -> Result<(), ClientError> {
            self.record("logout");
            self.action_result()
        }

        async fn current_profile(&self) -> Result<UserProfile, ClientError> {
            self.record("profile");
            if self.unauthorized {
                Err(ClientError::Unauthorized)
            } else {
                Ok(profile("me"))
            }
        }

        async fn feed(&self) -> Result<Vec<UserProfile>, ClientError> {
            self.record("feed");
            Ok(self.feed.clone())
        }

        async fn send_interest(&self, user: &UserId, action: ConnectAction) -> Result<(), ClientError> {
            self.record(format!("connect {:?} {}", action, user));
            self.action_result()
        }

        async fn requests(&self) -> Result<Vec<ConnectionRequest>, ClientError> {
            self.record("requests");
            Ok(vec![request("r1"), request("r2")])
        }

        async fn review_request(&self, request_id: &str, action: ReviewAction) -> Result<(), ClientError> {
            self.record(format!("review {:?} {}", action, request_id));
            self.action_result()
        }

        async fn connections(&self) -> Result<Vec<UserProfile>, ClientError> {
            self.record("connections");
            Ok(vec![profile("friend")])
        }

        async fn ignored_reviews(&self) -> Result<Vec<ConnectionRequest>, ClientError> {
            self.record("reviews");
            Ok(vec![request("i1")])
        }

        async fn review_ignored(&self, request_id: &str, action: ReviewAction) -> Result<(), ClientError> {
            self.record(format!("reviews {:?} {}", action, request_id));
            self.action_result()
        }
    }

    #[tokio::test]
    async fn test_restore_session_unauthorized_clears_user() {
        let api = FakeApi {
            unauthorized: true,
            ..FakeApi::default()
        };
        let mut state = AppState::new();
        state.user.set_user(profile("stale"));

        let restored = restore_session(&mut state, &api).await.unwrap();
        assert!(restored.is_none());
        assert!(!state.user.is_signed_in());
        assert!(!state.user.is_loading);
    }

    fn signup_request() -> SignupRequest {
        SignupRequest {
            first_name: "Uma".into(),
            last_name: "Rao".into(),
            email: "uma@devmatch.test".into(),
            password: "hunter22".into(),
        }
    }

    #[tokio::test]
    async fn test_signup_checks_confirmation_before_calling() {
        let api = FakeApi::default();
        let mut state = AppState::new();

        let err = signup(&mut state, &api, &signup_request(), "hunter23")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput(_)));
        assert!(api.calls().is_empty());

        let message = signup(&mut state, &api, &signup_request(), "hunter22")
            .await
            .unwrap();
        assert_eq!(message, "created");
        assert_eq!(api.calls(), vec!["signup uma@devmatch.test"]);
        assert!(!state.user.is_signed_in());
        assert!(!state.user.is_loading);
    }

    #[tokio::test]
    async fn test_logout_clears_state_even_when_call_fails() {
        let api = FakeApi {
            fail_actions: true,
            ..FakeApi::default()
        };
        let mut state = AppState::new();
        login(&mut state, &api, "me@devmatch.test", "secret").await.unwrap();
        state.feed.set_feed(vec![profile("a")]);

        assert!(logout(&mut state, &api).await.is_err());
        assert!(!state.user.is_signed_in());
        assert!(state.feed.needs_fetch());
    }

    #[tokio::test]
    async fn test_feed_is_fetched_only_when_empty() {
        let api = FakeApi {
            feed: vec![profile("a"), profile("b")],
            ..FakeApi::default()
        };
        let mut state = AppState::new();

        assert_eq!(load_feed(&mut state, &api).await.unwrap(), 2);
        assert_eq!(load_feed(&mut state, &api).await.unwrap(), 2);
        assert_eq!(api.calls(), vec!["feed"]);
    }

    #[tokio::test]
    async fn test_swipe_removes_card_even_when_action_fails() {
        let api = FakeApi {
            fail_actions: true,
            ..FakeApi::default()
        };
        let mut state = AppState::new();
        state.feed.set_feed(vec![profile("a"), profile("b")]);

        let outcome = swipe(&mut state, &api, SwipeDirection::Right).await.unwrap();
        assert_eq!(outcome.user_id, "a");
        assert_eq!(outcome.action, ConnectAction::Interested);
        assert!(!outcome.delivered);
        assert_eq!(state.feed.current().map(|p| p.id.as_str()), Some("b"));
        assert_eq!(api.calls(), vec!["connect Interested a"]);
    }

    #[tokio::test]
    async fn test_swipe_on_empty_feed_does_nothing() {
        let api = FakeApi::default();
        let mut state = AppState::new();
        assert!(swipe(&mut state, &api, SwipeDirection::Left).await.is_none());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_review_removes_request_only_on_success() {
        let mut state = AppState::new();
        let api = FakeApi::default();
        load_requests(&mut state, &api).await.unwrap();
        review_request(&mut state, &api, "r1", ReviewAction::Accepted).await.unwrap();
        assert_eq!(state.requests.requests.len(), 1);

        let failing = FakeApi {
            fail_actions: true,
            ..FakeApi::default()
        };
        assert!(review_request(&mut state, &failing, "r2", ReviewAction::Rejected).await.is_err());
        assert_eq!(state.requests.requests.len(), 1);
    }

    #[tokio::test]
    async fn test_review_ignored_and_connections() {
        let mut state = AppState::new();
        let api = FakeApi::default();
        assert_eq!(load_reviews(&mut state, &api).await.unwrap(), 1);
        review_ignored(&mut state, &api, "i1", ReviewAction::Accepted).await.unwrap();
        assert!(state.reviews.reviews.is_empty());

        assert_eq!(load_connections(&mut state, &api).await.unwrap(), 1);
        assert_eq!(api.calls().last().map(String::as_str), Some("connections"));
    }
}
