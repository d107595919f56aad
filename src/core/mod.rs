//! Core business logic (platform-agnostic)
//!
//! CRITICAL: This module MUST NOT import platform-specific code.
//! Every OS primitive is reached through a trait so the monitor/agent
//! protocol runs unchanged against in-memory doubles.

pub mod agent;
pub mod channel;
pub mod monitor;
pub mod payload;
pub mod protect;
pub mod provider;
pub mod session;
pub mod store;
pub mod vault;

// In-memory OS doubles (tests only)
#[cfg(test)]
pub mod mock;

pub use agent::{
    AgentState, CredentialSerialization, LogonEnvironment, ResultReport, SerializationOutcome,
    SerializationResponse, StatusIcon, StatusText, UnlockAgent,
};
pub use channel::UnlockChannel;
pub use monitor::{CycleOutcome, MonitorState, SessionMonitor};
pub use payload::{AuthPackageLookup, LogonPayload, PackedLogon};
pub use protect::DataProtector;
pub use provider::{
    CredentialCount, CredentialProvider, CredentialProviderFactory, FieldDescriptor,
    ProviderCredential, UnlockProvider, UnlockProviderFactory,
};
pub use session::{SessionEvent, SessionHost, SessionInfo, SessionSnapshot, SessionState};
pub use store::{ConfigStore, StoredValue};
pub use vault::CredentialVault;
