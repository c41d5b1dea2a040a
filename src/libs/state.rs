pub mod actions;

use crate::libs::models::{ConnectionRequest, UserProfile};

#[derive(Debug, Clone, Default)]
pub struct UserState {
    pub user: Option<UserProfile>,
    pub is_loading: bool,
}

impl UserState {
    pub fn set_user(&mut self, user: UserProfile) {
        self.user = Some(user);
    }

    pub fn clear_user(&mut self) {
        self.user = None;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}

/// Swipe deck. Only refilled from the server once it has been exhausted.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    feed: Vec<UserProfile>,
}

impl FeedState {
    pub fn set_feed(&mut self, feed: Vec<UserProfile>) {
        self.feed = feed;
    }

    pub fn remove_from_feed(&mut self, user_id: &str) -> bool {
        let before = self.feed.len();
        self.feed.retain(|profile| profile.id != user_id);
        self.feed.len() != before
    }

    pub fn clear_feed(&mut self) {
        self.feed.clear();
    }

    pub fn current(&self) -> Option<&UserProfile> {
        self.feed.first()
    }

    pub fn needs_fetch(&self) -> bool {
        self.feed.is_empty()
    }

    pub fn profiles(&self) -> &[UserProfile] {
        &self.feed
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub connections: Vec<UserProfile>,
}

impl ConnectionState {
    pub fn set_connections(&mut self, connections: Vec<UserProfile>) {
        self.connections = connections;
    }
}

/// Pending requests addressed to the signed-in user.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    pub requests: Vec<ConnectionRequest>,
}

impl RequestState {
    pub fn set_requests(&mut self, requests: Vec<ConnectionRequest>) {
        self.requests = requests;
    }

    pub fn remove(&mut self, request_id: &str) -> bool {
        remove_request(&mut self.requests, request_id)
    }
}

/// Requests the user previously ignored and may revisit.
#[derive(Debug, Clone, Default)]
pub struct ReviewState {
    pub reviews: Vec<ConnectionRequest>,
}

impl ReviewState {
    pub fn set_reviews(&mut self, reviews: Vec<ConnectionRequest>) {
        self.reviews = reviews;
    }

    pub fn remove(&mut self, request_id: &str) -> bool {
        remove_request(&mut self.reviews, request_id)
    }
}

fn remove_request(requests: &mut Vec<ConnectionRequest>, request_id: &str) -> bool {
    let before = requests.len();
    requests.retain(|request| request.id != request_id);
    requests.len() != before
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub user: UserState,
    pub feed: FeedState,
    pub connections: ConnectionState,
    pub requests: RequestState,
    pub reviews: ReviewState,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything tied to the signed-in user.
    pub fn reset(&mut self) {
        self.user.clear_user();
        self.user.set_loading(false);
        self.feed.clear_feed();
        self.connections.connections.clear();
        self.requests.requests.clear();
        self.reviews.reviews.clear();
    }
}
