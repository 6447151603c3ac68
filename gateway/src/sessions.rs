//! Per-user session registry. One push channel per connected user; the
//! channel hop serializes concurrent pushes to a single connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    #[error("user {0} is not connected")]
    NotConnected(String),
}

struct Session {
    conn_id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    next_conn_id: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any prior one for the same user.
    /// Returns the connection id and the receiving end of the push channel.
    pub fn register(&self, user_id: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .write()
            .insert(user_id.to_string(), Session { conn_id, tx });
        (conn_id, rx)
    }

    /// Remove the registration, but only if it still belongs to this
    /// connection: a reconnect may have replaced it already.
    pub fn unregister(&self, user_id: &str, conn_id: u64) {
        let mut sessions = self.inner.write();
        if sessions
            .get(user_id)
            .is_some_and(|session| session.conn_id == conn_id)
        {
            sessions.remove(user_id);
        }
    }

    pub fn push(&self, user_id: &str, text: &str) -> Result<(), PushError> {
        let sessions = self.inner.read();
        let Some(session) = sessions.get(user_id) else {
            return Err(PushError::NotConnected(user_id.to_string()));
        };
        if session.tx.send(text.to_string()).is_err() {
            let conn_id = session.conn_id;
            drop(sessions);
            self.unregister(user_id, conn_id);
            return Err(PushError::NotConnected(user_id.to_string()));
        }
        Ok(())
    }

    pub fn connected(&self) -> usize {
        self.inner.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_to_an_unknown_user_fails_not_connected() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.push("alice", "hello"),
            Err(PushError::NotConnected("alice".into()))
        );
    }

    #[tokio::test]
    async fn push_delivers_to_the_registered_channel() {
        let registry = SessionRegistry::new();
        let (_, mut rx) = registry.register("alice");
        registry.push("alice", "hello").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn push_after_the_receiver_is_gone_unregisters() {
        let registry = SessionRegistry::new();
        let (_, rx) = registry.register("alice");
        drop(rx);
        assert!(registry.push("alice", "hello").is_err());
        assert_eq!(registry.connected(), 0);
    }

    #[tokio::test]
    async fn stale_unregister_does_not_remove_a_reconnected_session() {
        let registry = SessionRegistry::new();
        let (old_conn, _old_rx) = registry.register("alice");
        let (_new_conn, mut new_rx) = registry.register("alice");

        // the old connection's cleanup must not tear down the new session
        registry.unregister("alice", old_conn);
        registry.push("alice", "still here").unwrap();
        assert_eq!(new_rx.recv().await.unwrap(), "still here");
    }

    #[tokio::test]
    async fn unregister_removes_the_matching_session() {
        let registry = SessionRegistry::new();
        let (conn_id, _rx) = registry.register("alice");
        registry.unregister("alice", conn_id);
        assert_eq!(registry.connected(), 0);
    }
}
