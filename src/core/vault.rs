//! Encrypted-at-rest credential vault
//!
//! Holds exactly one secret: the password of the account whose session is
//! unlocked. The plaintext never touches the store; only the DPAPI blob does.

use crate::constants::{
    VALUE_ENCRYPTED_PASSWORD, VALUE_LEGACY_PASSWORD, VALUE_LEGACY_USERNAME,
};
use crate::core::protect::DataProtector;
use crate::core::store::{ConfigStore, StoredValue};
use crate::models::{LegacyCredentials, SecureString, Username};
use crate::utils::{StoreError, VaultError};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tracing::{debug, warn};

/// Single-secret vault backed by a [`ConfigStore`] and a [`DataProtector`]
///
/// # Security
/// - Secrets are encrypted with a machine-bound key before they are persisted
/// - Secrets are never logged
/// - [`CredentialVault::get`] returns a [`SecureString`], which wipes itself
///   when the caller drops it
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn ConfigStore>,
    protector: Arc<dyn DataProtector>,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn ConfigStore>, protector: Arc<dyn DataProtector>) -> Self {
        Self { store, protector }
    }

    /// Encrypt `secret` and persist the ciphertext as REG_BINARY.
    pub fn put(&self, secret: &SecureString) -> Result<(), VaultError> {
        let plaintext = secret.to_utf16le();
        let ciphertext = self
            .protector
            .protect(&plaintext)
            .map_err(|e| VaultError::StorageUnavailable(e.to_string()))?;

        self.store
            .write_value(VALUE_ENCRYPTED_PASSWORD, &StoredValue::Binary(ciphertext))
            .map_err(storage_error)?;

        debug!("Stored encrypted credential");
        Ok(())
    }

    /// Read and decrypt the stored secret
    ///
    /// # Returns
    /// * `Ok(secret)` - The caller owns the plaintext and must drop it as soon as it is used
    /// * `Err(VaultError::NotProvisioned)` - Nothing stored (never reported as a decryption failure)
    /// * `Err(VaultError::DecryptionFailed)` - Wrong machine, corrupted blob or unusable primitive
    pub fn get(&self) -> Result<SecureString, VaultError> {
        let ciphertext = match self.store.read_value(VALUE_ENCRYPTED_PASSWORD) {
            Ok(StoredValue::Binary(bytes)) => bytes,
            // Older provisioning tooling wrote the blob as a base64 string
            Ok(StoredValue::String(text)) => {
                if text.trim().is_empty() {
                    return Err(VaultError::NotProvisioned);
                }
                general_purpose::STANDARD
                    .decode(text.trim())
                    .map_err(|e| VaultError::DecryptionFailed(format!("invalid base64: {}", e)))?
            }
            Ok(StoredValue::Dword(_)) | Err(StoreError::TypeMismatch) => {
                return Err(VaultError::DecryptionFailed(
                    "stored credential has an unexpected type".to_string(),
                ))
            }
            Err(StoreError::NotFound) => return Err(VaultError::NotProvisioned),
            Err(e) => return Err(storage_error(e)),
        };

        if ciphertext.is_empty() {
            return Err(VaultError::NotProvisioned);
        }

        let plaintext = self
            .protector
            .unprotect(&ciphertext)
            .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;

        SecureString::from_utf16le(&plaintext).ok_or_else(|| {
            VaultError::DecryptionFailed("decrypted credential is not valid UTF-16".to_string())
        })
    }

    /// Whether an encrypted secret is present. Does not decrypt it.
    pub fn is_provisioned(&self) -> Result<bool, VaultError> {
        match self.store.read_value(VALUE_ENCRYPTED_PASSWORD) {
            Ok(StoredValue::Binary(bytes)) => Ok(!bytes.is_empty()),
            Ok(StoredValue::String(text)) => Ok(!text.trim().is_empty()),
            Ok(StoredValue::Dword(_)) | Err(StoreError::TypeMismatch) => Ok(false),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(storage_error(e)),
        }
    }

    /// Remove the stored secret, including any legacy plaintext copy
    ///
    /// # Returns
    /// * `Ok(())` - Success (idempotent - succeeds even if nothing is stored)
    pub fn clear(&self) -> Result<(), VaultError> {
        for name in [VALUE_ENCRYPTED_PASSWORD, VALUE_LEGACY_PASSWORD] {
            self.store.delete_value(name).map_err(storage_error)?;
        }
        debug!("Cleared stored credential");
        Ok(())
    }

    /// Whether a complete legacy plaintext pair is present
    pub fn has_legacy(&self) -> bool {
        [VALUE_LEGACY_USERNAME, VALUE_LEGACY_PASSWORD]
            .into_iter()
            .all(|name| {
                matches!(
                    self.store.read_value(name),
                    Ok(StoredValue::String(text)) if !text.trim().is_empty()
                )
            })
    }

    /// Read the legacy plaintext `Username`/`Password` pair
    ///
    /// SECURITY: This layout stores the password unencrypted. Callers gate it
    /// behind an explicit policy switch.
    pub fn get_legacy(&self) -> Result<LegacyCredentials, VaultError> {
        let username = match self.store.read_value(VALUE_LEGACY_USERNAME) {
            Ok(StoredValue::String(name)) => name,
            Ok(_) | Err(StoreError::TypeMismatch) | Err(StoreError::NotFound) => {
                return Err(VaultError::NotProvisioned)
            }
            Err(e) => return Err(storage_error(e)),
        };
        let password = match self.store.read_value(VALUE_LEGACY_PASSWORD) {
            Ok(StoredValue::String(password)) => SecureString::new(password),
            Ok(_) | Err(StoreError::TypeMismatch) | Err(StoreError::NotFound) => {
                return Err(VaultError::NotProvisioned)
            }
            Err(e) => return Err(storage_error(e)),
        };

        let username = Username::new(username).map_err(|_| VaultError::NotProvisioned)?;
        warn!("Using legacy plaintext credential from the registry");
        Ok(LegacyCredentials { username, password })
    }
}

fn storage_error(err: StoreError) -> VaultError {
    VaultError::StorageUnavailable(err.to_string())
}
