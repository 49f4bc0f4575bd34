//! Per-navigation access control.
//!
//! Exactly two paths are public (`login`, `register`); everything else,
//! the root included, needs a signed-in principal. A signed-in principal
//! asking for a public path is sent home.

use crate::auth::SessionFeed;

pub const LOGIN_PATH: &str = "login";
pub const REGISTER_PATH: &str = "register";
pub const HOME_PATH: &str = "home";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    Public,
    Protected,
}

/// Classify a requested path. Leading/trailing slashes, the query string
/// and the fragment are ignored.
pub fn classify(path: &str) -> PathClass {
    match normalize(path) {
        LOGIN_PATH | REGISTER_PATH => PathClass::Public,
        _ => PathClass::Protected,
    }
}

fn normalize(path: &str) -> &str {
    let end = path.find(|c: char| c == '?' || c == '#').unwrap_or(path.len());
    path[..end].trim_matches('/')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectToLogin,
    RedirectToHome,
}

impl RouteDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Absolute path to navigate to instead, if the navigation is refused.
    pub fn redirect_target(&self) -> Option<String> {
        match self {
            Self::Allow => None,
            Self::RedirectToLogin => Some(format!("/{LOGIN_PATH}")),
            Self::RedirectToHome => Some(format!("/{HOME_PATH}")),
        }
    }
}

/// Pure access decision over (authenticated, requested path).
pub fn decide(authenticated: bool, path: &str) -> RouteDecision {
    match (authenticated, classify(path)) {
        (true, PathClass::Public) => RouteDecision::RedirectToHome,
        (true, PathClass::Protected) => RouteDecision::Allow,
        (false, PathClass::Public) => RouteDecision::Allow,
        (false, PathClass::Protected) => RouteDecision::RedirectToLogin,
    }
}

/// Route guard bound to a live session feed.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    sessions: SessionFeed,
}

impl RouteGuard {
    pub fn new(sessions: SessionFeed) -> Self {
        Self { sessions }
    }

    /// Decide one navigation attempt from the first session value of a
    /// fresh subscription. Later session changes do not affect it.
    pub fn can_activate(&self, path: &str) -> RouteDecision {
        let session = self.sessions.subscribe().first();
        let decision = decide(session.is_authenticated(), path);
        match decision {
            RouteDecision::Allow => tracing::debug!(path, "Route guard: access granted"),
            RouteDecision::RedirectToLogin => {
                tracing::debug!(path, "Route guard: not signed in, redirecting to login")
            }
            RouteDecision::RedirectToHome => {
                tracing::debug!(path, "Route guard: already signed in, redirecting to home")
            }
        }
        decision
    }
}
