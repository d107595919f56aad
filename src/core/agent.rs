//! Unlock agent state machine
//!
//! One [`UnlockAgent`] backs one lock-screen tile. LogonUI drives it through
//! select / serialize / report-result; the agent decides whether the stored
//! credential may be submitted and packs it for LSA.
//!
//! ```text
//! Created --initialize--> Ready --select--> AutoSubmitPending
//!                           ^                     |
//!                           |               get_serialization
//!                      report_result              v
//!                      (success)  <--------- Submitted
//!                                                 |
//!        TerminalError <--- serialization failure or rejected logon
//! ```
//!
//! Credentials are only ever handed over once per consumed unlock request;
//! a failed attempt is never retried silently.

use crate::config::AgentPolicy;
use crate::constants::PROVIDER_CLSID;
use crate::core::channel::UnlockChannel;
use crate::core::payload::{self, AuthPackageLookup};
use crate::core::vault::CredentialVault;
use crate::models::{SecureString, UsageScenario, Username};
use crate::utils::{AgentError, PayloadError, VaultError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

/// What the agent needs from the logon host besides storage
pub trait LogonEnvironment: Send + Sync {
    /// Owner of the locked interactive session
    fn current_username(&self) -> Result<Username, String>;

    /// NetBIOS name of this machine, used as the logon domain for local accounts
    fn computer_name(&self) -> Result<String, String>;

    /// Resolve an authentication package id on a fresh LSA connection
    fn lookup_auth_package(&self, name: &str) -> Result<u32, PayloadError>;
}

struct EnvironmentLookup<'a>(&'a dyn LogonEnvironment);

impl AuthPackageLookup for EnvironmentLookup<'_> {
    fn lookup_auth_package(&self, name: &str) -> Result<u32, PayloadError> {
        self.0.lookup_auth_package(name)
    }
}

/// Lifecycle of one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Created,
    Ready,
    AutoSubmitPending,
    Submitted,
    TerminalError,
}

/// `CREDENTIAL_PROVIDER_GET_SERIALIZATION_RESPONSE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationResponse {
    NoCredentialNotFinished,
    ReturnCredentialFinished,
}

/// `CREDENTIAL_PROVIDER_STATUS_ICON`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    None,
    Error,
    Warning,
    Success,
}

/// Messages shown on the tile when no credential is returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusText {
    CredentialUnavailable,
    NoUnlockRequest,
    UserUnknown,
    PackageUnavailable,
    LogonRejected,
}

impl StatusText {
    pub fn message(self) -> &'static str {
        match self {
            StatusText::CredentialUnavailable => "Unable to retrieve the auto-unlock credential",
            StatusText::NoUnlockRequest => "No automatic unlock was requested for this session",
            StatusText::UserUnknown => "Unable to determine the locked user",
            StatusText::PackageUnavailable => "The logon service is not available",
            StatusText::LogonRejected => "Automatic unlock failed, sign in manually",
        }
    }
}

/// `CREDENTIAL_PROVIDER_CREDENTIAL_SERIALIZATION` without the raw pointers
pub struct CredentialSerialization {
    pub provider_clsid: u128,
    pub auth_package: u32,
    pub serialization: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for CredentialSerialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSerialization")
            .field("provider_clsid", &format_args!("{:032x}", self.provider_clsid))
            .field("auth_package", &self.auth_package)
            .field("serialization", &format_args!("*** {} bytes ***", self.serialization.len()))
            .finish()
    }
}

/// Result of [`UnlockAgent::get_serialization`]
#[derive(Debug)]
pub struct SerializationOutcome {
    pub response: SerializationResponse,
    pub credential: Option<CredentialSerialization>,
    pub status: Option<StatusText>,
    pub icon: StatusIcon,
}

impl SerializationOutcome {
    fn finished(credential: CredentialSerialization) -> Self {
        Self {
            response: SerializationResponse::ReturnCredentialFinished,
            credential: Some(credential),
            status: None,
            icon: StatusIcon::None,
        }
    }

    fn not_finished(status: StatusText, icon: StatusIcon) -> Self {
        Self {
            response: SerializationResponse::NoCredentialNotFinished,
            credential: None,
            status: Some(status),
            icon,
        }
    }

    pub fn status_message(&self) -> Option<&'static str> {
        self.status.map(StatusText::message)
    }
}

/// Status text/icon shown after the host reports an authentication result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultReport {
    pub status: Option<StatusText>,
    pub icon: StatusIcon,
}

/// The per-tile state machine
pub struct UnlockAgent {
    vault: CredentialVault,
    channel: UnlockChannel,
    env: Arc<dyn LogonEnvironment>,
    policy: AgentPolicy,
    state: AgentState,
    scenario: Option<UsageScenario>,
    request_consumed: bool,
    auto_submit: bool,
    failure: Option<StatusText>,
}

impl UnlockAgent {
    pub fn new(
        vault: CredentialVault,
        channel: UnlockChannel,
        env: Arc<dyn LogonEnvironment>,
        policy: AgentPolicy,
    ) -> Self {
        Self {
            vault,
            channel,
            env,
            policy,
            state: AgentState::Created,
            scenario: None,
            request_consumed: false,
            auto_submit: false,
            failure: None,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn scenario(&self) -> Option<UsageScenario> {
        self.scenario
    }

    /// Whether LogonUI should call [`UnlockAgent::get_serialization`] on its own
    pub fn auto_submit(&self) -> bool {
        self.auto_submit
    }

    /// Bind the agent to a usage scenario
    ///
    /// Only unlock and logon are served; anything else is rejected and the
    /// agent stays unusable.
    pub fn initialize(&mut self, scenario: UsageScenario) -> Result<(), AgentError> {
        if !scenario.is_supported() {
            warn!("Rejecting unsupported usage scenario {:?}", scenario);
            return Err(AgentError::InvalidScenario);
        }
        self.scenario = Some(scenario);
        self.state = AgentState::Ready;
        debug!("Unlock agent initialized for {:?}", scenario);
        Ok(())
    }

    /// Tile selected; returns the auto-logon hint for the host
    ///
    /// An armed request is consumed here. With
    /// [`AgentPolicy::require_armed_request`] set, auto-submit is only
    /// requested when a request was consumed.
    pub fn select(&mut self) -> Result<bool, AgentError> {
        match self.state {
            AgentState::Created => return Err(AgentError::NotInitialized),
            AgentState::TerminalError => {
                debug!("Tile selected after a failed attempt, not auto-submitting");
                self.auto_submit = false;
                return Ok(false);
            }
            _ => {}
        }

        if self.channel.try_consume() {
            self.request_consumed = true;
        }

        self.auto_submit = self.request_consumed || !self.policy.require_armed_request;
        if self.auto_submit {
            info!(
                "Auto-submit requested (service request consumed: {})",
                self.request_consumed
            );
            self.state = AgentState::AutoSubmitPending;
        } else {
            debug!("No unlock request pending, waiting for manual sign-in");
            self.state = AgentState::Ready;
        }
        Ok(self.auto_submit)
    }

    /// Tile deselected; drops the auto-submit intent
    pub fn deselect(&mut self) -> Result<(), AgentError> {
        match self.state {
            AgentState::Created => Err(AgentError::NotInitialized),
            AgentState::TerminalError => {
                self.auto_submit = false;
                Ok(())
            }
            _ => {
                self.auto_submit = false;
                self.state = AgentState::Ready;
                Ok(())
            }
        }
    }

    /// Produce the credential for LSA, or a status explaining why not
    ///
    /// The decrypted password lives only inside this call; the returned
    /// serialization owns a separate copy that wipes itself on drop.
    pub fn get_serialization(&mut self) -> Result<SerializationOutcome, AgentError> {
        match self.state {
            AgentState::Created => return Err(AgentError::NotInitialized),
            AgentState::TerminalError => {
                debug!("Refusing to submit after a failed attempt");
                self.auto_submit = false;
                return Ok(SerializationOutcome::not_finished(
                    self.failure.unwrap_or(StatusText::LogonRejected),
                    StatusIcon::Error,
                ));
            }
            _ => {}
        }

        if self.policy.require_armed_request && !self.request_consumed {
            info!("Refusing to submit the stored credential without an unlock request");
            self.auto_submit = false;
            self.state = AgentState::Ready;
            return Ok(SerializationOutcome::not_finished(
                StatusText::NoUnlockRequest,
                StatusIcon::Warning,
            ));
        }

        // One request authorizes one attempt, whatever its outcome
        self.request_consumed = false;
        self.auto_submit = false;

        match self.build_serialization() {
            Ok(credential) => {
                info!(
                    "Returning credential serialization ({} bytes) to the host",
                    credential.serialization.len()
                );
                self.state = AgentState::Submitted;
                Ok(SerializationOutcome::finished(credential))
            }
            Err(status) => {
                self.state = AgentState::TerminalError;
                self.failure = Some(status);
                Ok(SerializationOutcome::not_finished(status, StatusIcon::Error))
            }
        }
    }

    /// The host reports how authentication went
    ///
    /// The channel is cleared in every case. A rejected logon is surfaced,
    /// not retried.
    pub fn report_result(&mut self, status: i32, substatus: i32) -> Result<ResultReport, AgentError> {
        if self.state == AgentState::Created {
            return Err(AgentError::NotInitialized);
        }

        if let Err(e) = self.channel.clear() {
            warn!("Failed to clear unlock request after logon result: {}", e);
        }
        self.auto_submit = false;
        self.request_consumed = false;

        if status >= 0 {
            info!("Automatic unlock succeeded");
            self.state = AgentState::Ready;
            Ok(ResultReport {
                status: None,
                icon: StatusIcon::None,
            })
        } else {
            warn!(
                "Automatic unlock rejected: status {:#010x}, substatus {:#010x}",
                status, substatus
            );
            self.state = AgentState::TerminalError;
            self.failure = Some(StatusText::LogonRejected);
            Ok(ResultReport {
                status: Some(StatusText::LogonRejected),
                icon: StatusIcon::Error,
            })
        }
    }

    fn build_serialization(&self) -> Result<CredentialSerialization, StatusText> {
        let (username, password) = self.load_credential()?;

        let domain = self.env.computer_name().map_err(|e| {
            error!("Failed to resolve the computer name: {}", e);
            StatusText::CredentialUnavailable
        })?;

        debug!("Building unlock payload for {}", username);
        let payload = payload::build_for_submission(
            username.account(),
            &password,
            &domain,
            &EnvironmentLookup(self.env.as_ref()),
        )
        .map_err(|e| {
            error!("Failed to build logon payload: {}", e);
            match e {
                PayloadError::FieldTooLong { .. } => StatusText::CredentialUnavailable,
                PayloadError::AuthPackageUnavailable(_) => StatusText::PackageUnavailable,
            }
        })?;
        drop(password);

        Ok(CredentialSerialization {
            provider_clsid: PROVIDER_CLSID,
            auth_package: payload.auth_package,
            serialization: payload.serialization,
        })
    }

    fn load_credential(&self) -> Result<(Username, SecureString), StatusText> {
        match self.vault.get() {
            Ok(password) => {
                let username = self.env.current_username().map_err(|e| {
                    error!("Failed to determine the locked user: {}", e);
                    StatusText::UserUnknown
                })?;
                Ok((username, password))
            }
            Err(VaultError::NotProvisioned) if self.policy.allow_legacy_plaintext => {
                match self.vault.get_legacy() {
                    Ok(legacy) => Ok((legacy.username, legacy.password)),
                    Err(e) => {
                        error!("No credential available: {}", e);
                        Err(StatusText::CredentialUnavailable)
                    }
                }
            }
            Err(e) => {
                error!("Failed to read the stored credential: {}", e);
                Err(StatusText::CredentialUnavailable)
            }
        }
    }
}

impl std::fmt::Debug for UnlockAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockAgent")
            .field("state", &self.state)
            .field("scenario", &self.scenario)
            .field("request_consumed", &self.request_consumed)
            .field("auto_submit", &self.auto_submit)
            .finish()
    }
}
