//! Terminal Services session host
//!
//! Session enumeration and the forced lock are synchronous Win32 calls; they
//! run on the blocking pool so the monitor can bound them with a timeout.

use crate::core::session::{SessionHost, SessionInfo, SessionState};
use crate::utils::SessionEnumerationError;
use async_trait::async_trait;
use windows::Win32::System::RemoteDesktop::{
    WTSEnumerateSessionsW, WTSFreeMemory, WTS_CURRENT_SERVER_HANDLE, WTS_SESSION_INFOW,
};
use windows::Win32::System::Shutdown::LockWorkStation;

/// [`SessionHost`] for the local terminal server
#[derive(Debug, Default, Clone, Copy)]
pub struct WtsSessionHost;

impl WtsSessionHost {
    pub fn new() -> Self {
        WtsSessionHost
    }
}

#[async_trait]
impl SessionHost for WtsSessionHost {
    async fn enumerate_sessions(&self) -> Result<Vec<SessionInfo>, SessionEnumerationError> {
        tokio::task::spawn_blocking(enumerate_sessions_sync)
            .await
            .map_err(|e| SessionEnumerationError::Unavailable(format!("task failed: {}", e)))?
    }

    async fn lock_workstation(&self) -> Result<(), String> {
        tokio::task::spawn_blocking(|| {
            // SAFETY: No arguments; fails cleanly when no interactive desktop exists.
            unsafe { LockWorkStation() }.map_err(|e| format!("LockWorkStation failed: {:?}", e))
        })
        .await
        .map_err(|e| format!("task failed: {}", e))?
    }
}

fn enumerate_sessions_sync() -> Result<Vec<SessionInfo>, SessionEnumerationError> {
    let mut raw: *mut WTS_SESSION_INFOW = std::ptr::null_mut();
    let mut count: u32 = 0;

    // SAFETY: Out pointers are valid; on success `raw` points at `count`
    // entries owned by WTS until WTSFreeMemory.
    unsafe {
        WTSEnumerateSessionsW(WTS_CURRENT_SERVER_HANDLE, 0, 1, &mut raw, &mut count).map_err(
            |e| SessionEnumerationError::Unavailable(format!("WTSEnumerateSessionsW failed: {:?}", e)),
        )?;

        if raw.is_null() {
            return Ok(Vec::new());
        }

        let sessions = std::slice::from_raw_parts(raw, count as usize)
            .iter()
            .map(|entry| {
                let station_name = if entry.pWinStationName.is_null() {
                    String::new()
                } else {
                    entry.pWinStationName.to_string().unwrap_or_default()
                };
                SessionInfo::new(
                    entry.SessionId,
                    SessionState::from_raw(entry.State.0 as u32),
                    station_name,
                )
            })
            .collect();

        // CRITICAL: Free the array allocated by WTS
        WTSFreeMemory(raw as *mut _);
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enumeration_includes_services_session() {
        let sessions = WtsSessionHost::new()
            .enumerate_sessions()
            .await
            .expect("enumerate sessions");
        assert!(sessions.iter().any(|s| s.session_id == 0));
    }
}
