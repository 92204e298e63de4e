//! In-flight conversation state, keyed by external id. Process-local and
//! in-memory: sessions do not survive a restart, by design.

use std::collections::HashMap;

use crate::account::types::{ExternalId, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    AwaitingSecret,
    AwaitingSurname,
    AwaitingGivenName,
    /// Terminal; doubles as the steady-state marker for identities that
    /// already have an account.
    Registered,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub state: RegistrationState,
    pub pending_role: Option<Role>,
    pub surname: Option<String>,
    pub locale: Option<String>,
}

impl Session {
    pub fn new(state: RegistrationState) -> Self {
        Session {
            state,
            pending_role: None,
            surname: None,
            locale: None,
        }
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: HashMap<ExternalId, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, external_id: ExternalId) -> Option<RegistrationState> {
        self.sessions.get(&external_id).map(|s| s.state)
    }

    pub fn get(&self, external_id: ExternalId) -> Option<&Session> {
        self.sessions.get(&external_id)
    }

    pub fn get_mut(&mut self, external_id: ExternalId) -> Option<&mut Session> {
        self.sessions.get_mut(&external_id)
    }

    pub fn insert(&mut self, external_id: ExternalId, session: Session) {
        self.sessions.insert(external_id, session);
    }

    pub fn clear(&mut self, external_id: ExternalId) {
        self.sessions.remove(&external_id);
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

    #[test]
    fn cleared_sessions_are_gone() {
        let mut store = SessionStore::new();
        store.insert(7, Session::new(RegistrationState::AwaitingSecret));
        assert_eq!(store.state(7), Some(RegistrationState::AwaitingSecret));

        store.clear(7);
        assert_eq!(store.state(7), None);
        assert!(store.is_empty());
    }
}
