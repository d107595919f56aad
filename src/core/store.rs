//! Platform-agnostic persisted key-value storage
//!
//! Both the monitor and the agent rendezvous through a single durable
//! namespace (`HKLM\SOFTWARE\WinUnlock` on Windows). Every operation is one
//! self-contained update; no lock is held across calls.

use crate::utils::StoreError;

/// A typed value as persisted by the store
#[derive(Clone, PartialEq, Eq)]
pub enum StoredValue {
    Binary(Vec<u8>),
    Dword(u32),
    String(String),
}

impl std::fmt::Debug for StoredValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // SECURITY: String values may hold the legacy plaintext password
        match self {
            StoredValue::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
            StoredValue::Dword(value) => write!(f, "Dword({})", value),
            StoredValue::String(text) => write!(f, "String({} bytes)", text.len()),
        }
    }
}

/// Durable single-namespace value store
///
/// Implementations MUST be safe to use from unrelated processes at the same
/// time: each call maps onto one OS-level read, write or delete.
pub trait ConfigStore: Send + Sync {
    /// Read a value
    ///
    /// # Returns
    /// * `Ok(value)` - If the value exists
    /// * `Err(StoreError::NotFound)` - If the value (or the whole namespace) is absent
    /// * `Err(StoreError::Io)` - Any other storage failure
    fn read_value(&self, name: &str) -> Result<StoredValue, StoreError>;

    /// Create or overwrite a value, creating the namespace if needed
    fn write_value(&self, name: &str, value: &StoredValue) -> Result<(), StoreError>;

    /// Delete a value
    ///
    /// # Returns
    /// * `Ok(())` - Success (idempotent - succeeds even if the value doesn't exist)
    fn delete_value(&self, name: &str) -> Result<(), StoreError>;

    /// Read an optional DWORD, `None` when absent or of another type.
    fn read_dword(&self, name: &str) -> Result<Option<u32>, StoreError> {
        match self.read_value(name) {
            Ok(StoredValue::Dword(value)) => Ok(Some(value)),
            Ok(_) | Err(StoreError::NotFound) | Err(StoreError::TypeMismatch) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mock::MemoryConfigStore;

    #[test]
    fn test_debug_never_prints_string_contents() {
        let value = StoredValue::String("hunter2".to_string());
        let rendered = format!("{:?}", value);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(rendered, "String(7 bytes)");
    }

    #[test]
    fn test_read_dword_ignores_other_types() {
        let store = MemoryConfigStore::new();
        store
            .write_value("Flag", &StoredValue::String("1".to_string()))
            .unwrap();
        assert_eq!(store.read_dword("Flag").unwrap(), None);
        assert_eq!(store.read_dword("Missing").unwrap(), None);

        store.write_value("Flag", &StoredValue::Dword(3)).unwrap();
        assert_eq!(store.read_dword("Flag").unwrap(), Some(3));
    }

    #[test]
    fn test_read_dword_propagates_storage_failure() {
        let store = MemoryConfigStore::new();
        store.fail_with(StoreError::Io("access denied".to_string()));
        assert!(matches!(store.read_dword("Flag"), Err(StoreError::Io(_))));
    }
}
