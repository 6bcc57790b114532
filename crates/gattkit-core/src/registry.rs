//! Process-wide session registry and callback dispatch.
//!
//! Platform callbacks and spawned transport tasks never hold a reference to
//! a session. They hold a [`SessionToken`] and post messages through a
//! [`Dispatcher`], which looks the token up in a [`SessionRegistry`] and
//! forwards the message to the session's mailbox. A token that is no longer
//! registered means the session is gone, and the message is dropped.
//!
//! Tokens are random non-zero 64-bit values, regenerated on collision, so a
//! token reused by a stale callback cannot reach an unrelated session.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::machine::Inbound;
use crate::transport::TransportEvent;

/// Opaque key for one live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

impl SessionToken {
    /// Raw token value. Never zero.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub(crate) type Mailbox = mpsc::UnboundedSender<Inbound>;

/// Maps live session tokens to their mailboxes.
///
/// Every method takes the internal lock for the duration of one map
/// operation only; senders are cloned out before any message is sent.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionToken, Mailbox>>,
}

/// Registry shared by every session that does not ask for its own.
static GLOBAL_REGISTRY: LazyLock<Arc<SessionRegistry>> =
    LazyLock::new(|| Arc::new(SessionRegistry::new()));

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<SessionRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Register a mailbox under a fresh token.
    pub(crate) fn register(&self, mailbox: Mailbox) -> SessionToken {
        let mut sessions = self.sessions.lock();
        let token = loop {
            let candidate = rand::random::<u64>();
            if candidate != 0 && !sessions.contains_key(&SessionToken(candidate)) {
                break SessionToken(candidate);
            }
        };
        sessions.insert(token, mailbox);
        trace!(%token, "session registered");
        token
    }

    /// Remove a token. Returns `false` if it was not registered.
    pub fn deregister(&self, token: SessionToken) -> bool {
        let removed = self.sessions.lock().remove(&token).is_some();
        if removed {
            trace!(%token, "session deregistered");
        }
        removed
    }

    /// Whether `token` belongs to a live session.
    pub fn contains(&self, token: SessionToken) -> bool {
        self.sessions.lock().contains_key(&token)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    fn lookup(&self, token: SessionToken) -> Option<Mailbox> {
        self.sessions.lock().get(&token).cloned()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

/// Routes messages addressed by token to the owning session's mailbox.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher resolves tokens against.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Deliver a transport event to the session owning `token`.
    pub fn deliver(&self, token: SessionToken, event: TransportEvent) -> bool {
        self.post(token, Inbound::Transport(event))
    }

    /// Post any message to the session owning `token`.
    ///
    /// Returns `false` when the token is unknown or the session has stopped
    /// reading its mailbox; the message is dropped in both cases.
    pub(crate) fn post(&self, token: SessionToken, message: Inbound) -> bool {
        match self.registry.lookup(token) {
            Some(mailbox) => mailbox.send(message).is_ok(),
            None => {
                trace!(%token, "no session for token, message discarded");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_generates_distinct_nonzero_tokens() {
        let registry = SessionRegistry::new();
        let mut receivers = Vec::new();
        let mut tokens = std::collections::HashSet::new();
        for _ in 0..64 {
            let (tx, rx) = mpsc::unbounded_channel();
            receivers.push(rx);
            let token = registry.register(tx);
            assert_ne!(token.get(), 0);
            assert!(tokens.insert(token));
        }
        assert_eq!(registry.len(), 64);
    }

    #[test]
    fn test_deregister_twice_is_noop() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = registry.register(tx);

        assert!(registry.contains(token));
        assert!(registry.deregister(token));
        assert!(!registry.deregister(token));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispatch_to_live_session() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = registry.register(tx);

        assert!(dispatcher.deliver(token, TransportEvent::MtuChanged(185)));
        match rx.try_recv() {
            Ok(Inbound::Transport(TransportEvent::MtuChanged(mtu))) => assert_eq!(mtu, 185),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_to_stale_token_is_discarded() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = registry.register(tx);
        registry.deregister(token);

        assert!(!dispatcher.deliver(token, TransportEvent::MtuChanged(64)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_after_mailbox_closed() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let (tx, rx) = mpsc::unbounded_channel();
        let token = registry.register(tx);
        drop(rx);

        assert!(!dispatcher.deliver(token, TransportEvent::MtuChanged(64)));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let a = SessionRegistry::global();
        let b = SessionRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
