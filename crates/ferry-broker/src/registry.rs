//! Concurrent in-memory session registry
//!
//! The only shared mutable state in the system. Join and leave are atomic
//! per-key check-and-set steps: the check and the mutation happen under
//! the entry's guard, so two concurrent joiners can never both succeed.
//! Sessions live until the process restarts; nothing deletes them.

use dashmap::DashMap;
use ferry_core::id::generate_id;
use ferry_core::{Error, Result, Session};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh session with a generated session and sender id and
    /// no receiver; returns a copy of the stored record.
    pub fn create(&self) -> Session {
        let session = Session {
            session_id: generate_id(),
            sender_id: generate_id(),
            receiver_id: String::new(),
        };
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        session
    }

    /// Attach a receiver to the session, failing without mutation if the
    /// session is unknown or already has one.
    pub fn join(&self, session_id: &str) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        if entry.has_receiver() {
            return Err(Error::SessionConflict);
        }
        entry.receiver_id = generate_id();
        Ok(entry.value().clone())
    }

    /// Detach the receiver so the session can be joined again, failing if
    /// the session is unknown or has no receiver attached.
    pub fn leave(&self, session_id: &str) -> Result<Session> {
        let mut entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        if !entry.has_receiver() {
            return Err(Error::SessionConflict);
        }
        entry.receiver_id.clear();
        Ok(entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn create_issues_distinct_ids() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        assert_eq!(session.session_id.len(), ferry_core::id::ID_LEN);
        assert_ne!(session.session_id, session.sender_id);
        assert!(!session.has_receiver());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn join_leave_cycle() {
        let registry = SessionRegistry::new();
        let session = registry.create();

        let joined = registry.join(&session.session_id).unwrap();
        assert!(joined.has_receiver());

        // Occupied: the second join must fail without clobbering the
        // receiver already attached.
        match registry.join(&session.session_id) {
            Err(Error::SessionConflict) => {}
            other => panic!("expected conflict, got {other:?}"),
        }

        let left = registry.leave(&session.session_id).unwrap();
        assert!(!left.has_receiver());

        // Freed: joinable again, with a fresh receiver id.
        let rejoined = registry.join(&session.session_id).unwrap();
        assert!(rejoined.has_receiver());
        assert_ne!(rejoined.receiver_id, joined.receiver_id);
    }

    #[test]
    fn join_unknown_session() {
        let registry = SessionRegistry::new();
        match registry.join("ab12cd") {
            Err(Error::SessionNotFound(id)) => assert_eq!(id, "ab12cd"),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[test]
    fn leave_without_receiver_is_a_conflict() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        match registry.leave(&session.session_id) {
            Err(Error::SessionConflict) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_joins_admit_exactly_one_receiver() {
        let registry = Arc::new(SessionRegistry::new());
        let session = registry.create();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = session.session_id.clone();
                std::thread::spawn(move || registry.join(&id).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(successes, 1);
    }
}
