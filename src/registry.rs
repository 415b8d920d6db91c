//! Online-user registry
//!
//! The single source of truth for who is online: a name → session map
//! behind one reader/writer lock. Every component that needs it receives
//! an `Arc<Registry>` at construction; there are no globals.
//!
//! The lock is only ever held for map operations, never across an await
//! point. Anything doing network IO works from a `snapshot()` instead.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::ChatError;
use crate::session::Session;

/// Concurrent mapping from username to online session
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<HashMap<String, Arc<Session>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under `name`
    ///
    /// Fails with `DuplicateName` if the name is already taken; the
    /// registry is left unchanged in that case.
    pub fn insert(&self, name: &str, session: Arc<Session>) -> Result<(), ChatError> {
        let mut map = self.write();
        if map.contains_key(name) {
            return Err(ChatError::DuplicateName(name.to_string()));
        }
        map.insert(name.to_string(), session);
        debug!("registered '{}', {} online", name, map.len());
        Ok(())
    }

    /// Remove a session by name. Idempotent: absent names are a no-op.
    pub fn remove(&self, name: &str) {
        let mut map = self.write();
        if map.remove(name).is_some() {
            debug!("unregistered '{}', {} online", name, map.len());
        }
    }

    /// Atomically rename a registered session
    ///
    /// Fails with `DuplicateName` if `new` is held by a different session,
    /// leaving the registry unchanged. Renaming to the current name is a
    /// no-op. Returns `Ok(false)` when `old` is not registered (the session
    /// is already mid-teardown) so callers do not confirm a rename that
    /// never happened. The session's own name field is updated under the
    /// same write lock, so the map key and the session never disagree.
    pub fn rename(&self, old: &str, new: &str) -> Result<bool, ChatError> {
        let mut map = self.write();
        if old == new {
            return Ok(map.contains_key(old));
        }
        if map.contains_key(new) {
            return Err(ChatError::DuplicateName(new.to_string()));
        }
        let Some(session) = map.remove(old) else {
            return Ok(false);
        };
        session.set_name(new);
        map.insert(new.to_string(), session);
        debug!("renamed '{}' to '{}'", old, new);
        Ok(true)
    }

    /// Look up a session by name
    pub fn get(&self, name: &str) -> Option<Arc<Session>> {
        self.read().get(name).cloned()
    }

    /// Point-in-time copy of all online sessions
    ///
    /// Iteration and delivery happen on the copy, so slow network writes
    /// never block registry access.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.read().values().cloned().collect()
    }

    /// Names of all online sessions
    pub fn list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of online sessions
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True if nobody is online
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every entry. Used during shutdown so writer tasks flush and exit.
    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MAILBOX_CAPACITY;
    use tokio::sync::mpsc;

    fn session(addr: &str) -> Arc<Session> {
        let (tx, _rx) = mpsc::channel(MAILBOX_CAPACITY);
        Arc::new(Session::new(addr, tx))
    }

    #[test]
    fn test_insert_and_get() {
        let registry = Registry::new();
        registry.insert("alice", session("127.0.0.1:4000")).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("alice").unwrap().addr(), "127.0.0.1:4000");
        assert!(registry.get("bob").is_none());
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let registry = Registry::new();
        registry.insert("alice", session("127.0.0.1:4000")).unwrap();

        let err = registry
            .insert("alice", session("127.0.0.1:4001"))
            .unwrap_err();
        assert!(matches!(err, ChatError::DuplicateName(name) if name == "alice"));

        // Original entry untouched
        assert_eq!(registry.get("alice").unwrap().addr(), "127.0.0.1:4000");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = Registry::new();
        registry.insert("alice", session("127.0.0.1:4000")).unwrap();

        registry.remove("alice");
        registry.remove("alice");
        registry.remove("ghost");

        assert!(registry.is_empty());
    }

    #[test]
    fn test_rename_moves_entry_and_updates_session() {
        let registry = Registry::new();
        registry.insert("127.0.0.1:4000", session("127.0.0.1:4000")).unwrap();

        assert!(registry.rename("127.0.0.1:4000", "alice").unwrap());

        assert!(registry.get("127.0.0.1:4000").is_none());
        let renamed = registry.get("alice").unwrap();
        assert_eq!(renamed.name(), "alice");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rename_collision_leaves_registry_unchanged() {
        let registry = Registry::new();
        registry.insert("alice", session("127.0.0.1:4000")).unwrap();
        registry.insert("bob", session("127.0.0.1:4001")).unwrap();

        let err = registry.rename("bob", "alice").unwrap_err();
        assert!(matches!(err, ChatError::DuplicateName(_)));

        // Both entries still present under their original names
        assert_eq!(registry.get("bob").unwrap().name(), "bob");
        assert_eq!(registry.get("alice").unwrap().addr(), "127.0.0.1:4000");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rename_to_same_name_is_noop() {
        let registry = Registry::new();
        registry.insert("alice", session("127.0.0.1:4000")).unwrap();

        assert!(registry.rename("alice", "alice").unwrap());
        assert_eq!(registry.get("alice").unwrap().name(), "127.0.0.1:4000");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rename_absent_name_reports_nothing_renamed() {
        let registry = Registry::new();

        assert!(!registry.rename("ghost", "alice").unwrap());
        // No entry materialized out of nowhere
        assert!(registry.get("alice").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_and_snapshot() {
        let registry = Registry::new();
        registry.insert("alice", session("127.0.0.1:4000")).unwrap();
        registry.insert("bob", session("127.0.0.1:4001")).unwrap();

        let mut names = registry.list();
        names.sort();
        assert_eq!(names, vec!["alice", "bob"]);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_keep_names_unique() {
        let registry = Arc::new(Registry::new());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry
                    .insert("alice", session(&format!("127.0.0.1:{}", 4000 + i)))
                    .is_ok()
            }));
        }

        let mut successes = 0;
        for task in tasks {
            if task.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(registry.len(), 1);
    }
}
