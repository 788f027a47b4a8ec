use std::collections::HashMap;

/// Session state recovered for a websocket handoff.
///
/// A connection without a session cookie, or whose cookie misses the
/// store, gets an anonymous session; that is not an error.
#[derive(Debug, Clone, Default)]
pub struct Session {
    id: Option<String>,
    data: HashMap<String, String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn resumed(id: impl Into<String>, data: HashMap<String, String>) -> Self {
        Self {
            id: Some(id.into()),
            data,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

/// Session store collaborator. A miss yields an anonymous session.
pub trait SessionStore {
    fn find_session(&self, session_id: &str) -> Session;
}
