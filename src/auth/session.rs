//! Live authentication state.
//!
//! A [`SessionFeed`] holds the current [`Session`] and fans every transition
//! out to any number of subscribers. A new subscriber always sees the current
//! value first, then each later transition in publish order. Consumers that
//! only need "who is signed in right now" call [`SessionSubscription::first`],
//! which returns that initial value and detaches.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

/// Transitions buffered per subscriber before it starts lagging.
const FEED_CAPACITY: usize = 64;

/// The authenticated principal, or none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub principal_id: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(principal_id: impl Into<String>) -> Self {
        Self {
            principal_id: Some(principal_id.into()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal_id.is_some()
    }

    pub fn principal_id(&self) -> Option<&str> {
        self.principal_id.as_deref()
    }
}

struct FeedInner {
    current: RwLock<Session>,
    tx: broadcast::Sender<Session>,
}

/// Multi-subscriber channel of the latest [`Session`].
///
/// Cloning is cheap; every clone reads from the same state. Only the identity
/// providers in this crate publish, so holders of a feed can observe it but
/// never forge a session:
///
/// ```compile_fail
/// let feed = jitcall::SessionFeed::new();
/// feed.publish(jitcall::Session::signed_in("forged"));
/// ```
///
/// Each subscriber buffers up to 64 transitions. One that falls further
/// behind skips the backlog and resumes at the then-current session.
#[derive(Clone)]
pub struct SessionFeed {
    inner: Arc<FeedInner>,
}

impl SessionFeed {
    /// Create a feed whose current value is the anonymous session.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(FeedInner {
                current: RwLock::new(Session::anonymous()),
                tx,
            }),
        }
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Session {
        self.inner.current.read().clone()
    }

    /// Record a new current session and notify subscribers.
    ///
    /// Publishing the value that is already current is not a transition and
    /// emits nothing.
    pub(crate) fn publish(&self, session: Session) {
        let mut current = self.inner.current.write();
        if *current == session {
            return;
        }
        *current = session.clone();
        // No subscribers is fine: the value is still recorded as current.
        let _ = self.inner.tx.send(session);
    }

    /// Attach a new subscriber.
    ///
    /// The current value and the receiver are captured under the same lock
    /// that `publish` takes, so no transition is missed or seen twice.
    pub fn subscribe(&self) -> SessionSubscription {
        let current = self.inner.current.read();
        SessionSubscription {
            initial: current.clone(),
            initial_delivered: false,
            rx: self.inner.tx.subscribe(),
            feed: Arc::downgrade(&self.inner),
        }
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

impl Default for SessionFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFeed")
            .field("current", &*self.inner.current.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// One subscriber's view of a [`SessionFeed`].
///
/// Dropping the subscription detaches it.
pub struct SessionSubscription {
    initial: Session,
    initial_delivered: bool,
    rx: broadcast::Receiver<Session>,
    // Weak so a subscription never keeps the feed open.
    feed: Weak<FeedInner>,
}

impl SessionSubscription {
    /// The session that was current when this subscription was created.
    /// Consumes the subscription, so later transitions are never observed.
    pub fn first(self) -> Session {
        self.initial
    }

    /// Next session value: the initial one first, then every transition.
    /// After a lag the skipped backlog collapses into the current value.
    ///
    /// Returns `None` once every feed handle has been dropped.
    pub async fn next(&mut self) -> Option<Session> {
        if !self.initial_delivered {
            self.initial_delivered = true;
            return Some(self.initial.clone());
        }

        loop {
            match self.rx.recv().await {
                Ok(session) => return Some(session),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    let Some(inner) = self.feed.upgrade() else {
                        return None;
                    };
                    // Same lock order as `subscribe`: the fresh receiver starts
                    // right after the value returned here.
                    let current = inner.current.read();
                    self.rx = inner.tx.subscribe();
                    tracing::warn!(skipped, "Session subscriber lagged; resuming at the current session");
                    return Some(current.clone());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
