//! Windows Registry integration for the shared WinUnlock namespace.
//!
//! This module provides minimal safe wrappers around Windows Registry APIs
//! so the vault and the unlock channel never see `unsafe` code. Each
//! operation opens the key, performs a single read, write or delete, and
//! closes it again; no handle is held across operations.

use crate::constants::REGISTRY_KEY_PATH;
use crate::core::store::{ConfigStore, StoredValue};
use crate::utils::StoreError;
use std::ffi::OsStr;
use std::iter;
use std::os::windows::ffi::OsStrExt;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_PATH_NOT_FOUND, WIN32_ERROR};
use windows::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegDeleteValueW, RegOpenKeyExW, RegQueryValueExW,
    RegSetValueExW, HKEY, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_QUERY_VALUE, KEY_SET_VALUE,
    REG_BINARY, REG_DWORD, REG_EXPAND_SZ, REG_OPTION_NON_VOLATILE, REG_SAM_FLAGS, REG_SZ,
    REG_VALUE_TYPE,
};
use zeroize::Zeroizing;

/// Registry hive the store lives under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRoot {
    LocalMachine,
    CurrentUser,
}

impl RegistryRoot {
    fn hkey(self) -> HKEY {
        match self {
            RegistryRoot::LocalMachine => HKEY_LOCAL_MACHINE,
            RegistryRoot::CurrentUser => HKEY_CURRENT_USER,
        }
    }
}

/// [`ConfigStore`] backed by one registry key
///
/// The production store is `HKLM\SOFTWARE\WinUnlock`: writable by the
/// SYSTEM service and administrators, readable by LogonUI.
#[derive(Debug, Clone)]
pub struct RegistryConfigStore {
    root: RegistryRoot,
    key_path: String,
}

impl RegistryConfigStore {
    pub fn new(root: RegistryRoot, key_path: impl Into<String>) -> Self {
        Self {
            root,
            key_path: key_path.into(),
        }
    }

    /// `HKLM\SOFTWARE\WinUnlock`
    pub fn machine() -> Self {
        Self::new(RegistryRoot::LocalMachine, REGISTRY_KEY_PATH)
    }

    fn open(&self, access: REG_SAM_FLAGS) -> Result<Option<OpenKey>, StoreError> {
        let key_path_w = to_wide(&self.key_path);
        let mut hkey = HKEY::default();

        // SAFETY: `key_path_w` is NUL-terminated and outlives the call; `hkey`
        // is a valid out pointer.
        let status = unsafe {
            RegOpenKeyExW(
                self.root.hkey(),
                PCWSTR::from_raw(key_path_w.as_ptr()),
                0,
                access,
                &mut hkey,
            )
        };

        if is_missing(status) {
            return Ok(None);
        }
        status.ok().map_err(|e| {
            StoreError::Io(format!(
                "Failed to open registry key '{}': {:?}",
                self.key_path, e
            ))
        })?;
        Ok(Some(OpenKey(hkey)))
    }

    fn create(&self) -> Result<OpenKey, StoreError> {
        let key_path_w = to_wide(&self.key_path);
        let mut hkey = HKEY::default();

        // SAFETY: All UTF-16 buffers live for the duration of the call and
        // `hkey` is a valid out pointer.
        let status = unsafe {
            RegCreateKeyExW(
                self.root.hkey(),
                PCWSTR::from_raw(key_path_w.as_ptr()),
                0,
                PCWSTR::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_SET_VALUE,
                None,
                &mut hkey,
                None,
            )
        };
        status.ok().map_err(|e| {
            StoreError::Io(format!(
                "Failed to create/open registry key '{}': {:?}",
                self.key_path, e
            ))
        })?;
        Ok(OpenKey(hkey))
    }
}

/// Closes the key handle on drop
struct OpenKey(HKEY);

impl Drop for OpenKey {
    fn drop(&mut self) {
        // SAFETY: The handle came from a successful RegOpenKeyExW/RegCreateKeyExW
        // and is closed exactly once.
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

impl ConfigStore for RegistryConfigStore {
    fn read_value(&self, name: &str) -> Result<StoredValue, StoreError> {
        let key = match self.open(KEY_QUERY_VALUE)? {
            Some(key) => key,
            None => return Err(StoreError::NotFound),
        };
        let value_w = to_wide(name);
        let mut value_type = REG_VALUE_TYPE::default();
        let mut data_size: u32 = 0;

        // SAFETY: Size query with valid out pointers and no data buffer.
        let status = unsafe {
            RegQueryValueExW(
                key.0,
                PCWSTR::from_raw(value_w.as_ptr()),
                None,
                Some(&mut value_type),
                None,
                Some(&mut data_size),
            )
        };
        if is_missing(status) {
            return Err(StoreError::NotFound);
        }
        status.ok().map_err(|e| {
            StoreError::Io(format!("Failed to query registry value '{}': {:?}", name, e))
        })?;

        let mut data = Zeroizing::new(vec![0u8; data_size as usize]);
        // SAFETY: `data` holds `data_size` writable bytes and the size pointer
        // reports that capacity.
        let status = unsafe {
            RegQueryValueExW(
                key.0,
                PCWSTR::from_raw(value_w.as_ptr()),
                None,
                Some(&mut value_type),
                Some(data.as_mut_ptr()),
                Some(&mut data_size),
            )
        };
        if is_missing(status) {
            return Err(StoreError::NotFound);
        }
        status.ok().map_err(|e| {
            StoreError::Io(format!("Failed to read registry value '{}': {:?}", name, e))
        })?;
        let data = &data[..data_size as usize];

        match value_type {
            REG_BINARY => Ok(StoredValue::Binary(data.to_vec())),
            REG_DWORD => {
                let bytes: [u8; 4] = data.try_into().map_err(|_| StoreError::TypeMismatch)?;
                Ok(StoredValue::Dword(u32::from_le_bytes(bytes)))
            }
            REG_SZ | REG_EXPAND_SZ => {
                let wide: Zeroizing<Vec<u16>> = Zeroizing::new(
                    data.chunks_exact(2)
                        .map(|c| u16::from_le_bytes([c[0], c[1]]))
                        .take_while(|unit| *unit != 0)
                        .collect(),
                );
                String::from_utf16(&wide)
                    .map(StoredValue::String)
                    .map_err(|_| StoreError::TypeMismatch)
            }
            _ => Err(StoreError::TypeMismatch),
        }
    }

    fn write_value(&self, name: &str, value: &StoredValue) -> Result<(), StoreError> {
        let key = self.create()?;
        let value_w = to_wide(name);

        let (value_type, bytes): (REG_VALUE_TYPE, Zeroizing<Vec<u8>>) = match value {
            StoredValue::Binary(bytes) => (REG_BINARY, Zeroizing::new(bytes.clone())),
            StoredValue::Dword(dword) => (REG_DWORD, Zeroizing::new(dword.to_le_bytes().to_vec())),
            StoredValue::String(text) => (
                REG_SZ,
                Zeroizing::new(
                    to_wide(text)
                        .iter()
                        .flat_map(|unit| unit.to_le_bytes())
                        .collect(),
                ),
            ),
        };

        // SAFETY: The name and data buffers outlive the call.
        let status = unsafe {
            RegSetValueExW(
                key.0,
                PCWSTR::from_raw(value_w.as_ptr()),
                0,
                value_type,
                Some(bytes.as_slice()),
            )
        };
        status.ok().map_err(|e| {
            StoreError::Io(format!("Failed to write registry value '{}': {:?}", name, e))
        })
    }

    /// Deletes the specified value if it exists. Missing values are treated as success.
    fn delete_value(&self, name: &str) -> Result<(), StoreError> {
        let key = match self.open(KEY_SET_VALUE)? {
            Some(key) => key,
            None => return Ok(()),
        };
        let value_w = to_wide(name);

        // SAFETY: `value_w` is NUL-terminated and outlives the call.
        let status = unsafe { RegDeleteValueW(key.0, PCWSTR::from_raw(value_w.as_ptr())) };
        if is_missing(status) {
            return Ok(());
        }
        status.ok().map_err(|e| {
            StoreError::Io(format!(
                "Failed to delete registry value '{}': {:?}",
                name, e
            ))
        })
    }
}

fn is_missing(status: WIN32_ERROR) -> bool {
    status == ERROR_FILE_NOT_FOUND || status == ERROR_PATH_NOT_FOUND
}

pub(crate) fn to_wide(input: &str) -> Vec<u16> {
    OsStr::new(input)
        .encode_wide()
        .chain(iter::once(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "SOFTWARE\\WinUnlock\\Tests";

    fn test_store(suffix: &str) -> RegistryConfigStore {
        RegistryConfigStore::new(
            RegistryRoot::CurrentUser,
            format!("{}\\{}", TEST_KEY, suffix),
        )
    }

    #[test]
    fn test_binary_dword_and_string_roundtrip() {
        let store = test_store("Values");

        let blob = StoredValue::Binary(vec![1, 2, 3, 0, 255]);
        store.write_value("Blob", &blob).expect("write binary");
        assert_eq!(store.read_value("Blob").expect("read binary"), blob);

        store
            .write_value("Flag", &StoredValue::Dword(1))
            .expect("write dword");
        assert_eq!(store.read_dword("Flag").expect("read dword"), Some(1));

        let text = StoredValue::String("héllo".to_string());
        store.write_value("Text", &text).expect("write string");
        assert_eq!(store.read_value("Text").expect("read string"), text);

        cleanup_test_key(&store.key_path);
    }

    #[test]
    fn test_missing_values_and_keys() {
        let store = test_store("Missing");
        assert_eq!(store.read_value("Nothing"), Err(StoreError::NotFound));
        store.delete_value("Nothing").expect("delete on missing key");

        store
            .write_value("Present", &StoredValue::Dword(0))
            .expect("write");
        store.delete_value("Present").expect("delete");
        store.delete_value("Present").expect("second delete");
        assert_eq!(store.read_value("Present"), Err(StoreError::NotFound));

        cleanup_test_key(&store.key_path);
    }

    fn cleanup_test_key(key_path: &str) {
        // SAFETY: This test cleanup deletes only the test key created under HKCU.
        unsafe {
            use windows::Win32::System::Registry::RegDeleteTreeW;

            let key_path_w = to_wide(key_path);
            let _ = RegDeleteTreeW(HKEY_CURRENT_USER, PCWSTR::from_raw(key_path_w.as_ptr()));
        }
    }
}
