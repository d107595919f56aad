//! # Utilities Module
//!
//! Cross-cutting concerns shared by the monitor and the agent.
//!
//! ## Modules
//!
//! - [`errors`]: Typed error hierarchy using `thiserror` for domain-specific errors
//!
//! ## Design Notes
//!
//! Error types are defined here to avoid circular dependencies between the
//! `core` and `platform` modules. Nothing in this crate retries an OS call:
//! a failed or slow primitive aborts the current attempt and the next session
//! event starts a fresh one.

pub mod errors;

pub use errors::{
    AgentError, ChannelError, MonitorError, PayloadError, ProtectError, SessionEnumerationError,
    StoreError, VaultError,
};
