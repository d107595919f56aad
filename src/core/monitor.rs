//! Session monitor
//!
//! Watches session-change notifications and, when the last remote session
//! disconnects, arms the unlock channel and forces the console session into
//! the lock screen so the unlock agent gets a chance to run.
//!
//! ```text
//!            disconnect                 other remote user active
//!   IDLE ─────────────▶ DISCONNECT_PENDING_CHECK ─────────────────▶ IDLE
//!    ▲                          │ nobody else connected
//!    │    settle, arm, lock,    ▼
//!    └────── settle ───── LOCK_TRIGGERED
//! ```
//!
//! Every step is fail-closed: enumeration problems abort the cycle without
//! arming, and a failed lock clears the request it just armed.

use crate::config::MonitorConfig;
use crate::core::channel::UnlockChannel;
use crate::core::session::{SessionEvent, SessionHost, SessionSnapshot};
use crate::utils::MonitorError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    DisconnectPendingCheck,
    LockTriggered,
}

/// What a single event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Lock or other non-actionable event
    Ignored,
    /// Another remote session is still active, nothing armed
    OtherRemoteSessionActive,
    /// Request armed and session locked
    LockedAndArmed,
    /// Unlock observed, request cleared
    RequestCleared,
    /// Cycle abandoned, channel left CLEAR
    Aborted(String),
    /// Stop signal observed mid-cycle
    Stopped,
}

pub struct SessionMonitor {
    host: Arc<dyn SessionHost>,
    channel: UnlockChannel,
    config: MonitorConfig,
    state: MonitorState,
    stop: Option<watch::Receiver<bool>>,
}

impl SessionMonitor {
    pub fn new(host: Arc<dyn SessionHost>, channel: UnlockChannel, config: MonitorConfig) -> Self {
        Self {
            host,
            channel,
            config,
            state: MonitorState::Idle,
            stop: None,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Drain `events` serially until `stop` turns true or every sender is gone
    ///
    /// The stop signal is observed within `poll_interval`, including while a
    /// cycle is waiting on one of its settle delays.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        stop: watch::Receiver<bool>,
    ) {
        self.stop = Some(stop.clone());
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        info!("Session monitor running");

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                biased;
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => {
                        let outcome = self.handle_event(event).await;
                        debug!("Event {:?} -> {:?}", event, outcome);
                        if outcome == CycleOutcome::Stopped {
                            break;
                        }
                    }
                    None => {
                        warn!("Session event source closed");
                        break;
                    }
                },
                _ = ticker.tick() => {}
            }
        }

        info!("Session monitor stopped");
    }

    /// Apply one session event and return to `Idle`.
    pub async fn handle_event(&mut self, event: SessionEvent) -> CycleOutcome {
        match event {
            SessionEvent::Disconnect { session_id } => {
                let outcome = match self.handle_disconnect(session_id).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!("Disconnect cycle for session {} aborted: {}", session_id, e);
                        CycleOutcome::Aborted(e.to_string())
                    }
                };
                self.state = MonitorState::Idle;
                outcome
            }
            SessionEvent::Unlock { session_id } => {
                // Covers a manual unlock where the agent never consumed the request
                match self.channel.clear() {
                    Ok(()) => debug!("Session {} unlocked, request cleared", session_id),
                    Err(e) => warn!("Session {} unlocked but clear failed: {}", session_id, e),
                }
                CycleOutcome::RequestCleared
            }
            SessionEvent::Lock { .. } => CycleOutcome::Ignored,
        }
    }

    async fn handle_disconnect(&mut self, session_id: u32) -> Result<CycleOutcome, MonitorError> {
        self.state = MonitorState::DisconnectPendingCheck;
        info!("Session {} disconnected, checking remaining sessions", session_id);

        let host = self.host.clone();
        let Some(sessions) = self
            .bounded("Session enumeration", host.enumerate_sessions())
            .await?
        else {
            return Ok(CycleOutcome::Stopped);
        };
        let sessions = sessions?;
        let snapshot = SessionSnapshot::new(sessions);

        if snapshot.has_other_active_remote_session(session_id, &self.config.remote_station_prefix)
        {
            info!("Another remote session is active, not locking");
            return Ok(CycleOutcome::OtherRemoteSessionActive);
        }

        self.state = MonitorState::LockTriggered;
        if !self.pause(self.config.settle_delay).await {
            return Ok(CycleOutcome::Stopped);
        }

        // The agent reads the request once the lock screen shows, so arm first
        self.channel.arm()?;

        let lock_result = match self.bounded("Forced lock", host.lock_workstation()).await {
            Ok(Some(result)) => result.map_err(MonitorError::LockFailed),
            Ok(None) => {
                info!("Stopped while locking, clearing the unlock request");
                if let Err(e) = self.channel.clear() {
                    error!("Stale unlock request could not be cleared: {}", e);
                }
                return Ok(CycleOutcome::Stopped);
            }
            Err(e) => Err(e),
        };

        if let Err(e) = lock_result {
            error!("Failed to lock the workstation: {}", e);
            if let Err(clear_err) = self.channel.clear() {
                error!("Stale unlock request could not be cleared: {}", clear_err);
            }
            return Err(e);
        }

        info!("Workstation locked, unlock request pending");
        if !self.pause(self.config.lock_delay).await {
            return Ok(CycleOutcome::Stopped);
        }

        Ok(CycleOutcome::LockedAndArmed)
    }

    /// Sleep for `delay`; `false` if the stop signal fired first.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            _ = stop_requested(self.stop.as_mut()) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Run an OS call under `os_call_timeout`; `Ok(None)` if stopped first.
    async fn bounded<T>(
        &mut self,
        what: &'static str,
        call: impl Future<Output = T>,
    ) -> Result<Option<T>, MonitorError> {
        let limit = self.config.os_call_timeout;
        tokio::select! {
            biased;
            _ = stop_requested(self.stop.as_mut()) => Ok(None),
            result = timeout(limit, call) => result
                .map(Some)
                .map_err(|_| MonitorError::Timeout(what, limit)),
        }
    }
}

/// Resolves once `stop` reads true; never, without a receiver or sender.
async fn stop_requested(stop: Option<&mut watch::Receiver<bool>>) {
    let Some(stop) = stop else {
        return std::future::pending().await;
    };
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
