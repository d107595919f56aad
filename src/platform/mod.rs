//! Platform-specific implementations (Windows)
//!
//! All `unsafe` Win32 code is isolated here behind the `core` traits:
//! registry storage, DPAPI, Terminal Services sessions and notifications,
//! and the LSA-facing logon environment.

pub mod dpapi;
pub mod logon;
pub mod notifier;
pub mod registry;
pub mod wts;

pub use dpapi::DpapiProtector;
pub use logon::WindowsLogonEnvironment;
pub use notifier::SessionNotifier;
pub use registry::{RegistryConfigStore, RegistryRoot};
pub use wts::WtsSessionHost;
