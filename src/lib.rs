//! WinUnlock - automatic re-unlock after a Remote Desktop disconnect
//!
//! A session monitor arms a persisted unlock request and locks the console
//! when the last remote user disconnects; a logon agent hosted by LogonUI
//! consumes the request and submits the stored credential.

// Public modules
pub mod config;
pub mod constants;
pub mod core;
pub mod logger;
pub mod models;
pub mod utils;

// Platform-specific modules
#[cfg(windows)]
pub mod platform;

// Re-export commonly used types
pub use config::{AgentPolicy, MonitorConfig};
pub use core::{CredentialVault, SessionMonitor, UnlockAgent, UnlockChannel};
pub use models::{SecureString, UsageScenario, Username};
pub use utils::{AgentError, ChannelError, MonitorError, PayloadError, VaultError};
