use std::collections::BTreeMap;

use identity::NetworkId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub session_id: SessionId,
    pub text: String,
    /// When true, the output router will close the session's write channel
    /// after delivering this message, which closes the WebSocket.
    pub disconnect: bool,
}

impl SessionOutput {
    pub fn new(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            disconnect: false,
        }
    }

    /// Create a final message that will disconnect the session after delivery.
    pub fn with_disconnect(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            text: text.into(),
            disconnect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no `ready` received yet.
    AwaitingReady,
    Playing,
}

#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub session_id: SessionId,
    pub state: SessionState,
    pub character: Option<NetworkId>,
    /// Name of the area whose roster this connection is registered in.
    pub area: Option<String>,
    pub player_name: Option<String>,
}

impl PlayerSession {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: SessionState::AwaitingReady,
            character: None,
            area: None,
            player_name: None,
        }
    }
}

/// Connection to character and area bookkeeping. Ids come from the network layer.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: BTreeMap<SessionId, PlayerSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under the id the network layer assigned.
    pub fn create_session_with_id(&mut self, id: SessionId) {
        self.sessions.insert(id, PlayerSession::new(id));
    }

    pub fn get_session(&self, id: SessionId) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    pub fn get_session_mut(&mut self, id: SessionId) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&id)
    }

    /// Bind a character living in `area` to a session and mark it playing.
    pub fn bind_character(&mut self, session_id: SessionId, character: NetworkId, area: &str) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.character = Some(character);
            session.area = Some(area.to_string());
            session.state = SessionState::Playing;
        }
    }

    /// Point the session at a new area after a transfer.
    pub fn rehome(&mut self, session_id: SessionId, area: &str) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            tracing::debug!(
                session = %session_id,
                from = ?session.area,
                to = area,
                "session rehomed"
            );
            session.area = Some(area.to_string());
        }
    }

    /// Remove a session entirely.
    pub fn remove_session(&mut self, session_id: SessionId) -> Option<PlayerSession> {
        self.sessions.remove(&session_id)
    }

    /// All sessions in Playing state (sorted by session ID).
    pub fn playing_sessions(&self) -> Vec<&PlayerSession> {
        self.sessions
            .values()
            .filter(|s| s.state == SessionState::Playing)
            .collect()
    }
}
