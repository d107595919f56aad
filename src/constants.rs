//! # Application-Wide Constants
//!
//! Registry names, timing defaults and buffer capacities shared by the
//! session monitor and the unlock agent.
//!
//! The monitor (a service in session 0) and the agent (loaded by LogonUI)
//! never share memory, so every name in the "Registry" block below is part of
//! the contract between the two processes. Changing one of them breaks the
//! rendezvous between an already-installed service and a newer agent.
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use winunlock::constants::*;
//!
//! let settle = Duration::from_millis(DISCONNECT_SETTLE_DELAY_MS);
//! ```

// ============================================================================
// Registry
// ============================================================================

/// Registry key (under `HKEY_LOCAL_MACHINE`) holding all persisted state.
pub const REGISTRY_KEY_PATH: &str = "SOFTWARE\\WinUnlock";

/// REG_BINARY (or legacy base64 REG_SZ) value holding the DPAPI ciphertext.
pub const VALUE_ENCRYPTED_PASSWORD: &str = "EncryptedPassword";

/// REG_DWORD value used as the unlock request mailbox (1 = armed).
pub const VALUE_UNLOCK_REQUEST: &str = "UnlockRequest";

/// Legacy plaintext username (REG_SZ). Weaker than the encrypted path.
pub const VALUE_LEGACY_USERNAME: &str = "Username";

/// Legacy plaintext password (REG_SZ). Weaker than the encrypted path.
pub const VALUE_LEGACY_PASSWORD: &str = "Password";

/// Optional REG_DWORD policy: 0 lets the agent unlock without a service request.
pub const VALUE_REQUIRE_ARMED_REQUEST: &str = "RequireArmedRequest";

/// Optional REG_DWORD policy: 1 enables the legacy plaintext credential path.
pub const VALUE_ALLOW_LEGACY_PLAINTEXT: &str = "AllowLegacyPlaintext";

/// Description recorded inside the DPAPI blob.
pub const PROTECTED_DATA_DESCRIPTION: &str = "WinUnlock";

// ============================================================================
// Session Monitor timing
// ============================================================================

/// Delay between the disconnect notification and arming the channel
///
/// **Rationale**: the WTS state of the disconnecting session flips a moment
/// after the notification is delivered.
pub const DISCONNECT_SETTLE_DELAY_MS: u64 = 1000;

/// Delay after forcing the lock before the monitor returns to idle.
pub const LOCK_SETTLE_DELAY_MS: u64 = 500;

/// Upper bound on how long the monitor waits before re-checking the stop signal.
pub const MONITOR_POLL_INTERVAL_MS: u64 = 100;

/// Bounded wait applied to every OS primitive the monitor calls
///
/// Session enumeration and the forced lock are expected to return quickly; a
/// call that exceeds this budget aborts the current cycle.
pub const OS_CALL_TIMEOUT_MS: u64 = 5000;

/// Station name prefix used by Remote Desktop sessions (`RDP-Tcp#3`, ...).
pub const REMOTE_STATION_PREFIX: &str = "RDP";

/// Session 0 hosts services and never carries an interactive remote user.
pub const SERVICES_SESSION_ID: u32 = 0;

// ============================================================================
// WTS notification codes (wParam of WM_WTSSESSION_CHANGE)
// ============================================================================

pub const WM_WTSSESSION_CHANGE: u32 = 0x02B1;
pub const WTS_CONSOLE_CONNECT: u32 = 0x1;
pub const WTS_CONSOLE_DISCONNECT: u32 = 0x2;
pub const WTS_REMOTE_CONNECT: u32 = 0x3;
pub const WTS_REMOTE_DISCONNECT: u32 = 0x4;
pub const WTS_SESSION_LOGON: u32 = 0x5;
pub const WTS_SESSION_LOGOFF: u32 = 0x6;
pub const WTS_SESSION_LOCK: u32 = 0x7;
pub const WTS_SESSION_UNLOCK: u32 = 0x8;

// ============================================================================
// Logon payload
// ============================================================================

/// Maximum username length in UTF-16 units (UNLEN).
pub const MAX_USERNAME_CHARS: usize = 256;

/// Maximum password length in UTF-16 units (PWLEN).
pub const MAX_PASSWORD_CHARS: usize = 256;

/// Maximum NetBIOS computer name length in UTF-16 units (MAX_COMPUTERNAME_LENGTH).
pub const MAX_DOMAIN_CHARS: usize = 15;

/// `KERB_LOGON_SUBMIT_TYPE::KerbInteractiveUnlockLogon`.
pub const KERB_INTERACTIVE_UNLOCK_LOGON: u32 = 7;

/// Authentication package the unlock payload is routed to.
///
/// Negotiate accepts `KERB_INTERACTIVE_UNLOCK_LOGON` for local accounts and
/// forwards to MSV1_0 when Kerberos does not apply. Looking up
/// `MSV1_0_PACKAGE_NAME` directly would restrict the tile to local accounts.
pub const AUTH_PACKAGE_NAME: &str = "Negotiate";

// ============================================================================
// Logging
// ============================================================================

/// Rotate the log file once it grows past this size.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Directory name created under `%ProgramData%` for log files.
pub const APP_DATA_DIR: &str = "WinUnlock";

// ============================================================================
// Logon plugin identity
// ============================================================================

/// CLSID the credential provider is registered under
/// (`{A1B2C3D4-E5F6-7890-ABCD-EF1234567891}`).
pub const PROVIDER_CLSID: u128 = 0xa1b2c3d4_e5f6_7890_abcd_ef1234567891;
