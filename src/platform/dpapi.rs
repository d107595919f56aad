//! DPAPI data protection
//!
//! This module contains all unsafe Windows API code for encrypting the
//! stored password. The key is owned by the OS; `CRYPTPROTECT_LOCAL_MACHINE`
//! lets the SYSTEM service and LogonUI decrypt what the provisioning
//! command encrypted, and nothing decrypts it on another machine.

use crate::constants::PROTECTED_DATA_DESCRIPTION;
use crate::core::protect::DataProtector;
use crate::platform::registry::to_wide;
use crate::utils::ProtectError;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{LocalFree, HLOCAL};
use windows::Win32::Security::Cryptography::{
    CryptProtectData, CryptUnprotectData, CRYPTPROTECT_LOCAL_MACHINE, CRYPTPROTECT_UI_FORBIDDEN,
    CRYPT_INTEGER_BLOB,
};
use zeroize::{Zeroize, Zeroizing};

/// Machine-scope DPAPI
///
/// # Security
/// - Ciphertext is bound to this machine's DPAPI master key
/// - Decrypted buffers are wiped before being handed back to the OS allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct DpapiProtector;

impl DpapiProtector {
    pub fn new() -> Self {
        DpapiProtector
    }
}

fn input_blob(data: &[u8]) -> CRYPT_INTEGER_BLOB {
    CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    }
}

/// Copy an OS-allocated output blob, wipe it and free it
///
/// # Safety
/// `blob` must have been filled in by a successful DPAPI call.
unsafe fn take_output(blob: &mut CRYPT_INTEGER_BLOB) -> Zeroizing<Vec<u8>> {
    if blob.pbData.is_null() {
        return Zeroizing::new(Vec::new());
    }
    let out = std::slice::from_raw_parts_mut(blob.pbData, blob.cbData as usize);
    let copy = Zeroizing::new(out.to_vec());
    out.zeroize();

    // CRITICAL: Free the buffer allocated by Windows
    let _ = LocalFree(HLOCAL(blob.pbData as *mut _));
    blob.pbData = std::ptr::null_mut();
    blob.cbData = 0;
    copy
}

impl DataProtector for DpapiProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectError> {
        let description = to_wide(PROTECTED_DATA_DESCRIPTION);
        let input = input_blob(plaintext);
        let mut output = CRYPT_INTEGER_BLOB::default();

        // SAFETY: `input` points at `plaintext` and `description` for the
        // duration of the call; DPAPI only reads them. `output` is an out
        // parameter released by `take_output`.
        unsafe {
            CryptProtectData(
                &input,
                PCWSTR::from_raw(description.as_ptr()),
                None,
                None,
                None,
                CRYPTPROTECT_LOCAL_MACHINE | CRYPTPROTECT_UI_FORBIDDEN,
                &mut output,
            )
            .map_err(|e| ProtectError::Failed(format!("CryptProtectData failed: {:?}", e)))?;

            Ok(take_output(&mut output).to_vec())
        }
    }

    fn unprotect(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, ProtectError> {
        let input = input_blob(ciphertext);
        let mut output = CRYPT_INTEGER_BLOB::default();

        // SAFETY: As in `protect`; the description out parameter is not requested.
        unsafe {
            CryptUnprotectData(
                &input,
                None,
                None,
                None,
                None,
                CRYPTPROTECT_UI_FORBIDDEN,
                &mut output,
            )
            .map_err(|e| ProtectError::Failed(format!("CryptUnprotectData failed: {:?}", e)))?;

            Ok(take_output(&mut output))
        }
    }
}
