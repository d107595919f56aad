//! Domain model types for WinUnlock
//!
//! SECURITY: Credential types zero their memory on drop.

use crate::constants::MAX_USERNAME_CHARS;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Windows account name of the user whose session gets unlocked
///
/// Valid formats:
/// - `user` (local user)
/// - `.\\user` (explicit local user)
/// - `HOST\\user` (machine-qualified local user)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Username(String);

/// Reason a username was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("Username cannot be empty")]
    Empty,

    #[error("Username exceeds maximum length ({0})")]
    TooLong(usize),
}

impl Username {
    /// Create a new username after validation
    pub fn new(username: impl Into<String>) -> Result<Self, UsernameError> {
        let username = username.into();
        let trimmed = username.trim();

        if trimmed.is_empty() {
            return Err(UsernameError::Empty);
        }

        if trimmed.encode_utf16().count() > MAX_USERNAME_CHARS {
            return Err(UsernameError::TooLong(MAX_USERNAME_CHARS));
        }

        Ok(Username(trimmed.to_string()))
    }

    /// Get the username as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Account part of the name with any `HOST\` or `.\` qualifier removed.
    pub fn account(&self) -> &str {
        match self.0.rsplit_once('\\') {
            Some((_, account)) => account,
            None => &self.0,
        }
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for Username {
    type Error = UsernameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Username::new(value)
    }
}

/// Password that zeros memory on drop
///
/// SECURITY: This type never implements Display or Debug in a way that reveals the password.
/// It is deliberately not `Clone`: a decrypted secret has exactly one owner.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    /// Create a new secure string
    pub fn new(password: impl Into<String>) -> Self {
        SecureString(password.into())
    }

    /// Decode a UTF-16LE byte buffer, as produced by DPAPI for wide strings.
    ///
    /// A single trailing NUL is tolerated. The caller keeps ownership of
    /// `bytes` and is responsible for wiping it.
    pub fn from_utf16le(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 2 != 0 {
            return None;
        }

        let mut wide: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        if wide.last() == Some(&0) {
            wide.pop();
        }

        let decoded = String::from_utf16(&wide).ok();
        wide.zeroize();
        decoded.map(SecureString)
    }

    /// Encode as UTF-16LE bytes without a terminator. The result wipes itself.
    pub fn to_utf16le(&self) -> zeroize::Zeroizing<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.0.len() * 2);
        for unit in self.0.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        zeroize::Zeroizing::new(bytes)
    }

    /// Get the password as a string slice
    ///
    /// Use this sparingly and only when necessary for API calls.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the length of the password in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the password is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SECURITY: Never reveal the password content
        write!(f, "SecureString(*** {} bytes ***)", self.0.len())
    }
}

/// Username and password pair read from the legacy plaintext registry path
#[derive(Debug)]
pub struct LegacyCredentials {
    pub username: Username,
    pub password: SecureString,
}

/// The logon situation the host asked the agent to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageScenario {
    Logon,
    UnlockWorkstation,
    ChangePassword,
    CredUi,
}

impl UsageScenario {
    /// Only unlocking, and plain logon where the host supports it, are served.
    pub fn is_supported(self) -> bool {
        matches!(self, UsageScenario::UnlockWorkstation | UsageScenario::Logon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_validation() {
        assert!(Username::new("bob").is_ok());
        assert!(Username::new("HOST\\bob").is_ok());
        assert!(Username::new(".\\bob").is_ok());
        assert_eq!(Username::new("   "), Err(UsernameError::Empty));
        assert_eq!(
            Username::new("a".repeat(300)),
            Err(UsernameError::TooLong(MAX_USERNAME_CHARS))
        );
    }

    #[test]
    fn test_username_account_strips_qualifier() {
        assert_eq!(Username::new("HOST\\bob").unwrap().account(), "bob");
        assert_eq!(Username::new(".\\bob").unwrap().account(), "bob");
        assert_eq!(Username::new("bob").unwrap().account(), "bob");
    }

    #[test]
    fn test_secure_string_debug_no_leak() {
        let password = SecureString::new("secret123");
        let debug_output = format!("{:?}", password);
        assert!(!debug_output.contains("secret"));
        assert!(debug_output.contains("9 bytes"));
    }

    #[test]
    fn test_secure_string_utf16_roundtrip() {
        let password = SecureString::new("pässwörd");
        let bytes = password.to_utf16le();
        let decoded = SecureString::from_utf16le(&bytes).unwrap();
        assert_eq!(decoded.as_str(), "pässwörd");
    }

    #[test]
    fn test_secure_string_utf16_trailing_nul() {
        let bytes = [b'p', 0, b'w', 0, 0, 0];
        let decoded = SecureString::from_utf16le(&bytes).unwrap();
        assert_eq!(decoded.as_str(), "pw");
    }

    #[test]
    fn test_secure_string_rejects_odd_length() {
        assert!(SecureString::from_utf16le(&[b'p', 0, b'w']).is_none());
    }

    #[test]
    fn test_usage_scenario_support() {
        assert!(UsageScenario::UnlockWorkstation.is_supported());
        assert!(UsageScenario::Logon.is_supported());
        assert!(!UsageScenario::ChangePassword.is_supported());
        assert!(!UsageScenario::CredUi.is_supported());
    }
}
