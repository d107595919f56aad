//! # Domain Models
//!
//! Core data structures representing the stored credential and the logon
//! situation the agent is asked to serve.
//!
//! ## Security Design
//!
//! The [`SecureString`] type provides memory-safe credential handling:
//! - Password data is zeroed on drop (`zeroize`) to prevent leakage via swap/core dumps
//! - Never exposed in `Debug` or `Display` implementations
//! - Not `Clone`, so a decrypted password has a single owner and a single wipe
//!
//! The password is stored DPAPI-encrypted under `HKLM\SOFTWARE\WinUnlock`,
//! never in plaintext files or logs. A legacy plaintext layout
//! ([`LegacyCredentials`]) is still readable for installations provisioned by
//! older tooling, but only when policy explicitly allows it.

pub mod credentials;

pub use credentials::{LegacyCredentials, SecureString, UsageScenario, Username, UsernameError};
