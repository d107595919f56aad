//! Logon environment of the LogonUI-hosted agent
//!
//! Inside LogonUI the process token is SYSTEM, so the locked user comes from
//! the Terminal Services record of the current session rather than from
//! `GetUserNameW`.

use crate::core::agent::LogonEnvironment;
use crate::models::Username;
use crate::utils::PayloadError;
use windows::core::{PSTR, PWSTR};
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Security::Authentication::Identity::{
    LsaConnectUntrusted, LsaDeregisterLogonProcess, LsaLookupAuthenticationPackage,
};
use windows::Win32::System::Kernel::STRING;
use windows::Win32::System::RemoteDesktop::{
    WTSFreeMemory, WTSQuerySessionInformationW, WTSUserName, WTS_CURRENT_SERVER_HANDLE,
};
use windows::Win32::System::SystemInformation::{ComputerNameNetBIOS, GetComputerNameExW};

/// `WTS_CURRENT_SESSION`: the session of the calling process
const CURRENT_SESSION: u32 = u32::MAX;

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsLogonEnvironment;

impl WindowsLogonEnvironment {
    pub fn new() -> Self {
        WindowsLogonEnvironment
    }
}

impl LogonEnvironment for WindowsLogonEnvironment {
    fn current_username(&self) -> Result<Username, String> {
        let mut buffer = PWSTR::null();
        let mut bytes: u32 = 0;

        // SAFETY: Out pointers are valid; the returned buffer is freed with
        // WTSFreeMemory after it has been copied.
        let name = unsafe {
            WTSQuerySessionInformationW(
                WTS_CURRENT_SERVER_HANDLE,
                CURRENT_SESSION,
                WTSUserName,
                &mut buffer,
                &mut bytes,
            )
            .map_err(|e| format!("WTSQuerySessionInformationW failed: {:?}", e))?;

            let name = if buffer.is_null() {
                String::new()
            } else {
                buffer.to_string().unwrap_or_default()
            };
            WTSFreeMemory(buffer.0 as *mut _);
            name
        };

        Username::new(name).map_err(|e| format!("No user in the current session: {}", e))
    }

    fn computer_name(&self) -> Result<String, String> {
        let mut buffer = [0u16; 64];
        let mut len = buffer.len() as u32;

        // SAFETY: `buffer` holds `len` UTF-16 units; on success `len` is the
        // number written without the terminator.
        unsafe {
            GetComputerNameExW(ComputerNameNetBIOS, PWSTR(buffer.as_mut_ptr()), &mut len)
                .map_err(|e| format!("GetComputerNameExW failed: {:?}", e))?;
        }

        String::from_utf16(&buffer[..len as usize])
            .map_err(|e| format!("Computer name is not valid UTF-16: {}", e))
    }

    /// Resolve `name` on a fresh untrusted LSA connection
    ///
    /// The id is only meaningful for this process, so it is never cached.
    fn lookup_auth_package(&self, name: &str) -> Result<u32, PayloadError> {
        let mut lsa = HANDLE::default();

        // SAFETY: `lsa` is a valid out pointer; the handle is deregistered below.
        let status = unsafe { LsaConnectUntrusted(&mut lsa) };
        if status.is_err() {
            return Err(PayloadError::AuthPackageUnavailable(format!(
                "LsaConnectUntrusted failed: {:#010x}",
                status.0
            )));
        }

        let mut package_name = name.as_bytes().to_vec();
        let package = STRING {
            Length: package_name.len() as u16,
            MaximumLength: package_name.len() as u16,
            Buffer: PSTR(package_name.as_mut_ptr()),
        };
        let mut package_id: u32 = 0;

        // SAFETY: `package` points into `package_name`, which outlives the call.
        let status = unsafe { LsaLookupAuthenticationPackage(lsa, &package, &mut package_id) };
        // SAFETY: `lsa` came from a successful LsaConnectUntrusted.
        unsafe {
            let _ = LsaDeregisterLogonProcess(lsa);
        }

        if status.is_err() {
            return Err(PayloadError::AuthPackageUnavailable(format!(
                "LsaLookupAuthenticationPackage({}) failed: {:#010x}",
                name, status.0
            )));
        }
        Ok(package_id)
    }
}
