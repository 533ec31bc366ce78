//! Bearer-token session shared by the transport and the CLI.
//!
//! The session only holds the current access token and announces changes.
//! Login flows live elsewhere; the transport invalidates the session when the
//! server rejects a token.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Routes reachable without a token.
pub const PUBLIC_ROUTES: &[&str] = &["/login", "/register", "/invite/accept"];

/// Where an unauthenticated visitor is sent.
pub const LOGIN_ROUTE: &str = "/login";

/// Where an authenticated visitor of a public route is sent.
pub const HOME_ROUTE: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    Authenticated,
    SignedOut,
    /// The server rejected the token; the session has already been cleared.
    Unauthorized { message: String },
}

#[derive(Debug)]
struct SessionInner {
    token: RwLock<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
}

/// Cheaply cloneable handle; all clones share one token.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(SessionInner {
                token: RwLock::new(None),
                events,
            }),
        }
    }

    /// A session that starts out holding `token`, if any. Blank tokens are
    /// treated as absent.
    pub fn with_token(token: Option<String>) -> Self {
        let session = Self::new();
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            *session.inner.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        }
        session
    }

    pub fn token(&self) -> Option<String> {
        self.inner
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.inner.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
        info!("session authenticated");
        self.publish(SessionEvent::Authenticated);
    }

    pub fn clear(&self) {
        self.inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.publish(SessionEvent::SignedOut);
    }

    /// Drop the token after the server refused it.
    pub fn invalidate(&self, message: impl Into<String>) {
        let message = message.into();
        self.inner
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        warn!(%message, "session invalidated by server");
        self.publish(SessionEvent::Unauthorized { message });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

pub fn is_public_route(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    PUBLIC_ROUTES.contains(&path)
}

/// Route guard: where to send a visitor of `path`, or `None` to let them
/// through.
pub fn route_redirect(path: &str, authenticated: bool) -> Option<&'static str> {
    match (is_public_route(path), authenticated) {
        (false, false) => Some(LOGIN_ROUTE),
        (true, true) => Some(HOME_ROUTE),
        _ => None,
    }
}
