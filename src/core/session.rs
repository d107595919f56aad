//! Session model and the host abstraction used by the monitor
//!
//! This trait allows testing without a terminal server by supporting mock implementations.
//! Platform-specific implementations are in `src/platform/`.

use crate::constants::{
    SERVICES_SESSION_ID, WTS_CONSOLE_CONNECT, WTS_CONSOLE_DISCONNECT, WTS_REMOTE_CONNECT,
    WTS_REMOTE_DISCONNECT, WTS_SESSION_LOCK, WTS_SESSION_LOGOFF, WTS_SESSION_LOGON,
    WTS_SESSION_UNLOCK,
};
use crate::utils::SessionEnumerationError;
use serde::Serialize;

/// Connection state of a session (`WTS_CONNECTSTATE_CLASS`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Active,
    Connected,
    ConnectQuery,
    Shadow,
    Disconnected,
    Idle,
    Listen,
    Reset,
    Down,
    Init,
    Unknown(u32),
}

impl SessionState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => SessionState::Active,
            1 => SessionState::Connected,
            2 => SessionState::ConnectQuery,
            3 => SessionState::Shadow,
            4 => SessionState::Disconnected,
            5 => SessionState::Idle,
            6 => SessionState::Listen,
            7 => SessionState::Reset,
            8 => SessionState::Down,
            9 => SessionState::Init,
            other => SessionState::Unknown(other),
        }
    }
}

/// One entry of a session enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub session_id: u32,
    pub state: SessionState,
    pub station_name: String,
}

impl SessionInfo {
    pub fn new(session_id: u32, state: SessionState, station_name: impl Into<String>) -> Self {
        Self {
            session_id,
            state,
            station_name: station_name.into(),
        }
    }
}

/// Fresh enumeration of every session on the host
///
/// Fetched once per disconnect event and never cached.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub sessions: Vec<SessionInfo>,
}

impl SessionSnapshot {
    pub fn new(sessions: Vec<SessionInfo>) -> Self {
        Self { sessions }
    }

    /// Whether a remote user other than `self_id` is still connected
    ///
    /// A session counts when it is active, is not `self_id` or the services
    /// session, and its station name starts with `remote_prefix`
    /// (case-insensitive, e.g. `RDP-Tcp#3`).
    pub fn has_other_active_remote_session(&self, self_id: u32, remote_prefix: &str) -> bool {
        self.sessions.iter().any(|session| {
            session.state == SessionState::Active
                && session.session_id != self_id
                && session.session_id != SERVICES_SESSION_ID
                && is_remote_station(&session.station_name, remote_prefix)
        })
    }
}

fn is_remote_station(station_name: &str, remote_prefix: &str) -> bool {
    station_name
        .get(..remote_prefix.len())
        .map(|head| head.eq_ignore_ascii_case(remote_prefix))
        .unwrap_or(false)
}

/// A session-change notification, reduced to what the monitor acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Disconnect { session_id: u32 },
    Lock { session_id: u32 },
    Unlock { session_id: u32 },
}

impl SessionEvent {
    /// Decode the `wParam`/`lParam` pair of `WM_WTSSESSION_CHANGE`
    ///
    /// Console and remote disconnects both map to [`SessionEvent::Disconnect`];
    /// connect, logon and logoff notifications are not actionable.
    pub fn from_notification(code: u32, session_id: u32) -> Option<Self> {
        match code {
            WTS_CONSOLE_DISCONNECT | WTS_REMOTE_DISCONNECT => {
                Some(SessionEvent::Disconnect { session_id })
            }
            WTS_SESSION_LOCK => Some(SessionEvent::Lock { session_id }),
            WTS_SESSION_UNLOCK => Some(SessionEvent::Unlock { session_id }),
            WTS_CONSOLE_CONNECT | WTS_REMOTE_CONNECT | WTS_SESSION_LOGON | WTS_SESSION_LOGOFF => {
                None
            }
            _ => None,
        }
    }

    pub fn session_id(&self) -> u32 {
        match *self {
            SessionEvent::Disconnect { session_id }
            | SessionEvent::Lock { session_id }
            | SessionEvent::Unlock { session_id } => session_id,
        }
    }
}

/// OS operations the session monitor needs
///
/// Implementations must not block the async runtime; blocking OS calls are
/// moved onto a blocking thread so the monitor can bound them with a timeout.
#[async_trait::async_trait]
pub trait SessionHost: Send + Sync {
    /// Enumerate all sessions on this host
    async fn enumerate_sessions(&self) -> Result<Vec<SessionInfo>, SessionEnumerationError>;

    /// Force the interactive session into the locked state
    async fn lock_workstation(&self) -> Result<(), String>;
}
