//! Logon plugin boundary
//!
//! LogonUI talks to a factory, a provider and its credentials. Each layer is
//! a trait object behind an `Arc`; a COM shim only has to forward calls and
//! map [`AgentError`] to `E_INVALIDARG` / `E_NOTIMPL`.

use crate::config::AgentPolicy;
use crate::core::agent::{LogonEnvironment, ResultReport, SerializationOutcome, UnlockAgent};
use crate::core::channel::UnlockChannel;
use crate::core::protect::DataProtector;
use crate::core::store::ConfigStore;
use crate::core::vault::CredentialVault;
use crate::models::UsageScenario;
use crate::utils::AgentError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const FIELD_TILE_IMAGE: u32 = 0;
pub const FIELD_LARGE_TEXT: u32 = 1;
pub const FIELD_SMALL_TEXT: u32 = 2;
pub const FIELD_SUBMIT_BUTTON: u32 = 3;
pub const FIELD_COUNT: u32 = 4;

const LARGE_TEXT: &str = "Auto unlock";
const SMALL_TEXT: &str = "Unlock with the pre-configured credential";

/// `CREDENTIAL_PROVIDER_FIELD_TYPE` subset used by the tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    TileImage,
    LargeText,
    SmallText,
    SubmitButton,
}

/// `CREDENTIAL_PROVIDER_FIELD_STATE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    Hidden,
    DisplayInSelectedTile,
    DisplayInDeselectedTile,
    DisplayInBoth,
}

/// `CREDENTIAL_PROVIDER_FIELD_INTERACTIVE_STATE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldInteractiveState {
    None,
    ReadOnly,
    Disabled,
    Focused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub id: u32,
    pub field_type: FieldType,
    pub label: Option<&'static str>,
}

/// All fields of the tile, indexed by id
pub fn field_descriptors() -> [FieldDescriptor; FIELD_COUNT as usize] {
    [
        FieldDescriptor {
            id: FIELD_TILE_IMAGE,
            field_type: FieldType::TileImage,
            label: None,
        },
        FieldDescriptor {
            id: FIELD_LARGE_TEXT,
            field_type: FieldType::LargeText,
            label: None,
        },
        FieldDescriptor {
            id: FIELD_SMALL_TEXT,
            field_type: FieldType::SmallText,
            label: None,
        },
        FieldDescriptor {
            id: FIELD_SUBMIT_BUTTON,
            field_type: FieldType::SubmitButton,
            label: None,
        },
    ]
}

/// Return value of `GetCredentialCount`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialCount {
    pub count: u32,
    pub default_index: u32,
    pub auto_logon_with_default: bool,
}

/// One tile as LogonUI sees it
pub trait ProviderCredential: Send + Sync {
    fn set_selected(&self) -> Result<bool, AgentError>;
    fn set_deselected(&self) -> Result<(), AgentError>;

    fn field_state(&self, id: u32) -> Result<(FieldState, FieldInteractiveState), AgentError>;
    fn string_value(&self, id: u32) -> Result<&'static str, AgentError>;
    fn submit_button_adjacent(&self, id: u32) -> Result<u32, AgentError>;

    fn checkbox_value(&self, _id: u32) -> Result<(bool, String), AgentError> {
        Err(AgentError::NotImplemented)
    }

    fn set_string_value(&self, _id: u32, _value: &str) -> Result<(), AgentError> {
        Err(AgentError::NotImplemented)
    }

    fn set_checkbox_value(&self, _id: u32, _checked: bool) -> Result<(), AgentError> {
        Err(AgentError::NotImplemented)
    }

    fn command_link_clicked(&self, _id: u32) -> Result<(), AgentError> {
        Err(AgentError::NotImplemented)
    }

    fn get_serialization(&self) -> Result<SerializationOutcome, AgentError>;
    fn report_result(&self, status: i32, substatus: i32) -> Result<ResultReport, AgentError>;
}

/// The provider LogonUI enumerates tiles from
pub trait CredentialProvider: Send + Sync {
    fn set_usage_scenario(&self, scenario: UsageScenario) -> Result<(), AgentError>;

    /// Incoming serializations (CredUI, remote logon) are not consumed
    fn set_serialization(&self, _serialization: &[u8]) -> Result<(), AgentError> {
        Err(AgentError::NotImplemented)
    }

    fn field_descriptor_count(&self) -> u32;
    fn field_descriptor_at(&self, index: u32) -> Result<FieldDescriptor, AgentError>;
    fn credential_count(&self) -> CredentialCount;
    fn credential_at(&self, index: u32) -> Result<Arc<dyn ProviderCredential>, AgentError>;
}

/// Class factory: one provider per activation
pub trait CredentialProviderFactory: Send + Sync {
    fn create_provider(&self) -> Arc<dyn CredentialProvider>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tile wrapper serializing host calls into the agent
pub struct UnlockCredential {
    agent: Mutex<UnlockAgent>,
}

impl UnlockCredential {
    pub fn new(agent: UnlockAgent) -> Self {
        Self {
            agent: Mutex::new(agent),
        }
    }
}

impl ProviderCredential for UnlockCredential {
    fn set_selected(&self) -> Result<bool, AgentError> {
        lock(&self.agent).select()
    }

    fn set_deselected(&self) -> Result<(), AgentError> {
        lock(&self.agent).deselect()
    }

    fn field_state(&self, id: u32) -> Result<(FieldState, FieldInteractiveState), AgentError> {
        let state = match id {
            FIELD_TILE_IMAGE => FieldState::DisplayInBoth,
            FIELD_LARGE_TEXT | FIELD_SMALL_TEXT | FIELD_SUBMIT_BUTTON => {
                FieldState::DisplayInSelectedTile
            }
            other => return Err(AgentError::InvalidField(other)),
        };
        Ok((state, FieldInteractiveState::None))
    }

    fn string_value(&self, id: u32) -> Result<&'static str, AgentError> {
        match id {
            FIELD_LARGE_TEXT => Ok(LARGE_TEXT),
            FIELD_SMALL_TEXT => Ok(SMALL_TEXT),
            other => Err(AgentError::InvalidField(other)),
        }
    }

    fn submit_button_adjacent(&self, id: u32) -> Result<u32, AgentError> {
        if id == FIELD_SUBMIT_BUTTON {
            Ok(FIELD_SMALL_TEXT)
        } else {
            Err(AgentError::InvalidField(id))
        }
    }

    fn get_serialization(&self) -> Result<SerializationOutcome, AgentError> {
        lock(&self.agent).get_serialization()
    }

    fn report_result(&self, status: i32, substatus: i32) -> Result<ResultReport, AgentError> {
        lock(&self.agent).report_result(status, substatus)
    }
}

/// Provider exposing the single auto-unlock tile
pub struct UnlockProvider {
    vault: CredentialVault,
    channel: UnlockChannel,
    env: Arc<dyn LogonEnvironment>,
    policy: AgentPolicy,
    scenario: Mutex<Option<UsageScenario>>,
    credential: Mutex<Option<Arc<UnlockCredential>>>,
}

impl UnlockProvider {
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
            scenario: Mutex::new(None),
            credential: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> AgentPolicy {
        self.policy
    }
}

impl CredentialProvider for UnlockProvider {
    fn set_usage_scenario(&self, scenario: UsageScenario) -> Result<(), AgentError> {
        if !scenario.is_supported() {
            debug!("Provider not offered for {:?}", scenario);
            return Err(AgentError::InvalidScenario);
        }
        *lock(&self.scenario) = Some(scenario);
        // A new scenario gets a fresh tile
        *lock(&self.credential) = None;
        Ok(())
    }

    fn field_descriptor_count(&self) -> u32 {
        FIELD_COUNT
    }

    fn field_descriptor_at(&self, index: u32) -> Result<FieldDescriptor, AgentError> {
        field_descriptors()
            .get(index as usize)
            .copied()
            .ok_or(AgentError::InvalidField(index))
    }

    /// One tile, default index 0
    ///
    /// Auto-logon is only requested when there is something to submit and
    /// the policy would let the agent submit it.
    fn credential_count(&self) -> CredentialCount {
        let authorized = !self.policy.require_armed_request || self.channel.is_armed();
        let provisioned = match self.vault.is_provisioned() {
            Ok(provisioned) => provisioned,
            Err(e) => {
                warn!("Failed to query credential vault: {}", e);
                false
            }
        };
        let legacy = self.policy.allow_legacy_plaintext && self.vault.has_legacy();
        CredentialCount {
            count: 1,
            default_index: 0,
            auto_logon_with_default: authorized && (provisioned || legacy),
        }
    }

    fn credential_at(&self, index: u32) -> Result<Arc<dyn ProviderCredential>, AgentError> {
        if index != 0 {
            return Err(AgentError::InvalidField(index));
        }
        let scenario = (*lock(&self.scenario)).ok_or(AgentError::NotInitialized)?;

        let mut slot = lock(&self.credential);
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }

        let mut agent = UnlockAgent::new(
            self.vault.clone(),
            self.channel.clone(),
            self.env.clone(),
            self.policy,
        );
        agent.initialize(scenario)?;
        let credential = Arc::new(UnlockCredential::new(agent));
        *slot = Some(credential.clone());
        Ok(credential)
    }
}

/// Factory wiring the provider to the machine's store, protector and host
pub struct UnlockProviderFactory {
    store: Arc<dyn ConfigStore>,
    protector: Arc<dyn DataProtector>,
    env: Arc<dyn LogonEnvironment>,
}

impl UnlockProviderFactory {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        protector: Arc<dyn DataProtector>,
        env: Arc<dyn LogonEnvironment>,
    ) -> Self {
        Self {
            store,
            protector,
            env,
        }
    }
}

impl CredentialProviderFactory for UnlockProviderFactory {
    /// Policy is read once per activation
    fn create_provider(&self) -> Arc<dyn CredentialProvider> {
        let policy = AgentPolicy::from_store(self.store.as_ref());
        debug!("Creating unlock provider with {:?}", policy);
        Arc::new(UnlockProvider::new(
            CredentialVault::new(self.store.clone(), self.protector.clone()),
            UnlockChannel::new(self.store.clone()),
            self.env.clone(),
            policy,
        ))
    }
}
