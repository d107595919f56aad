//! Logon payload builder
//!
//! Packs `(username, password, domain)` into the self-relative form of
//! `KERB_INTERACTIVE_UNLOCK_LOGON` that LogonUI hands to LSA:
//!
//! ```text
//! +--------------------------------------------+
//! | MessageType (u32) | pad                    |
//! | LogonDomainName  UNICODE_STRING            |
//! | UserName         UNICODE_STRING            |
//! | Password         UNICODE_STRING            |
//! | LogonId          LUID (zero)               |
//! +--------------------------------------------+
//! | domain UTF-16 + NUL | user + NUL | pw + NUL |
//! +--------------------------------------------+
//! ```
//!
//! In the packed form each `UNICODE_STRING::Buffer` holds the byte offset of
//! its characters from the start of the buffer instead of a pointer.
//! `Length` counts bytes without the terminator and `MaximumLength` counts the
//! terminator too, which is what the OS expects.
//!
//! The header layout follows the native pointer width, so a payload is only
//! meaningful to an LSA of the same architecture as the building process.

use crate::constants::{
    AUTH_PACKAGE_NAME, KERB_INTERACTIVE_UNLOCK_LOGON, MAX_DOMAIN_CHARS, MAX_PASSWORD_CHARS,
    MAX_USERNAME_CHARS,
};
use crate::models::SecureString;
use crate::utils::PayloadError;
use zeroize::Zeroizing;

const PTR: usize = std::mem::size_of::<usize>();
const UNICODE_STRING_SIZE: usize = 2 * PTR;
const UNICODE_STRING_BUFFER_OFFSET: usize = PTR;
const DOMAIN_OFFSET: usize = align_up(4, PTR);
const USERNAME_OFFSET: usize = DOMAIN_OFFSET + UNICODE_STRING_SIZE;
const PASSWORD_OFFSET: usize = USERNAME_OFFSET + UNICODE_STRING_SIZE;
const LOGON_ID_OFFSET: usize = PASSWORD_OFFSET + UNICODE_STRING_SIZE;

/// Size of the fixed `KERB_INTERACTIVE_UNLOCK_LOGON` header
pub const HEADER_SIZE: usize = align_up(LOGON_ID_OFFSET + 8, PTR);

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// `Length`/`MaximumLength`/offset triple of one packed `UNICODE_STRING`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnicodeStringField {
    /// Bytes of character data, terminator excluded
    pub length: u16,
    /// Bytes reserved for the string, terminator included
    pub maximum_length: u16,
    /// Offset of the first character from the start of the buffer
    pub offset: usize,
}

impl UnicodeStringField {
    /// Length in UTF-16 code units, the native string-length unit.
    pub fn len_units(&self) -> usize {
        usize::from(self.length) / 2
    }
}

/// A packed `KERB_INTERACTIVE_UNLOCK_LOGON`
///
/// Holds a copy of the password; the buffer wipes itself on drop.
pub struct PackedLogon {
    bytes: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for PackedLogon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PackedLogon(*** {} bytes ***)", self.bytes.len())
    }
}

impl PackedLogon {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn message_type(&self) -> u32 {
        read_u32(&self.bytes, 0)
    }

    pub fn domain_field(&self) -> UnicodeStringField {
        read_field(&self.bytes, DOMAIN_OFFSET)
    }

    pub fn username_field(&self) -> UnicodeStringField {
        read_field(&self.bytes, USERNAME_OFFSET)
    }

    pub fn password_field(&self) -> UnicodeStringField {
        read_field(&self.bytes, PASSWORD_OFFSET)
    }

    /// Decode all three strings back out of the buffer
    pub fn unpack(&self) -> Option<UnpackedLogon> {
        unpack(&self.bytes)
    }

    fn into_bytes(self) -> Zeroizing<Vec<u8>> {
        self.bytes
    }
}

/// Strings recovered from a packed buffer
#[derive(Debug)]
pub struct UnpackedLogon {
    pub message_type: u32,
    pub domain: String,
    pub username: String,
    pub password: SecureString,
}

/// A packed logon plus the authentication package it is addressed to
pub struct LogonPayload {
    pub auth_package: u32,
    pub serialization: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for LogonPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogonPayload")
            .field("auth_package", &self.auth_package)
            .field("serialization", &format_args!("*** {} bytes ***", self.serialization.len()))
            .finish()
    }
}

/// Resolves an authentication package name to the id LSA routes on
///
/// The id is only valid for the current process' LSA connection, so it is
/// looked up for every payload and never cached.
pub trait AuthPackageLookup {
    fn lookup_auth_package(&self, name: &str) -> Result<u32, PayloadError>;
}

/// Pack the three strings, rejecting any that exceeds its field capacity
///
/// All capacities are checked before anything is allocated.
pub fn build(
    username: &str,
    password: &SecureString,
    domain: &str,
) -> Result<PackedLogon, PayloadError> {
    let domain_units = checked_units("domain", domain, MAX_DOMAIN_CHARS)?;
    let username_units = checked_units("username", username, MAX_USERNAME_CHARS)?;
    let password_units = checked_units("password", password.as_str(), MAX_PASSWORD_CHARS)?;

    let total = HEADER_SIZE
        + (domain_units + 1) * 2
        + (username_units + 1) * 2
        + (password_units + 1) * 2;
    let mut bytes = Zeroizing::new(vec![0u8; total]);

    write_u32(&mut bytes, 0, KERB_INTERACTIVE_UNLOCK_LOGON);

    let mut cursor = HEADER_SIZE;
    for (field_offset, text) in [
        (DOMAIN_OFFSET, domain),
        (USERNAME_OFFSET, username),
        (PASSWORD_OFFSET, password.as_str()),
    ] {
        cursor = write_string(&mut bytes, field_offset, cursor, text);
    }
    debug_assert_eq!(cursor, total);

    Ok(PackedLogon { bytes })
}

/// Pack the credential and resolve the package it is submitted to
///
/// Length checks run first, so an oversized field never reaches LSA.
pub fn build_for_submission(
    username: &str,
    password: &SecureString,
    domain: &str,
    lsa: &dyn AuthPackageLookup,
) -> Result<LogonPayload, PayloadError> {
    let packed = build(username, password, domain)?;
    let auth_package = lsa.lookup_auth_package(AUTH_PACKAGE_NAME)?;
    Ok(LogonPayload {
        auth_package,
        serialization: packed.into_bytes(),
    })
}

/// Decode a packed buffer, validating every offset against its length.
pub fn unpack(bytes: &[u8]) -> Option<UnpackedLogon> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }

    let read = |field_offset: usize| -> Option<Zeroizing<String>> {
        let field = read_field(bytes, field_offset);
        if field.length % 2 != 0 || field.maximum_length < field.length {
            return None;
        }
        let end = field.offset.checked_add(usize::from(field.length))?;
        if field.offset < HEADER_SIZE || end > bytes.len() {
            return None;
        }
        let mut wide: Vec<u16> = bytes[field.offset..end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let decoded = String::from_utf16(&wide).ok().map(Zeroizing::new);
        zeroize::Zeroize::zeroize(&mut wide);
        decoded
    };

    let domain = read(DOMAIN_OFFSET)?;
    let username = read(USERNAME_OFFSET)?;
    let password = read(PASSWORD_OFFSET)?;

    Some(UnpackedLogon {
        message_type: read_u32(bytes, 0),
        domain: domain.to_string(),
        username: username.to_string(),
        password: SecureString::new(password.as_str()),
    })
}

fn checked_units(field: &'static str, text: &str, max: usize) -> Result<usize, PayloadError> {
    let len = text.encode_utf16().count();
    if len > max {
        return Err(PayloadError::FieldTooLong { field, len, max });
    }
    Ok(len)
}

/// Copy `text` plus NUL at `cursor` and describe it at `field_offset`.
fn write_string(bytes: &mut [u8], field_offset: usize, cursor: usize, text: &str) -> usize {
    let mut end = cursor;
    for unit in text.encode_utf16() {
        bytes[end..end + 2].copy_from_slice(&unit.to_le_bytes());
        end += 2;
    }
    let length = (end - cursor) as u16;

    bytes[field_offset..field_offset + 2].copy_from_slice(&length.to_le_bytes());
    bytes[field_offset + 2..field_offset + 4].copy_from_slice(&(length + 2).to_le_bytes());
    let buffer_at = field_offset + UNICODE_STRING_BUFFER_OFFSET;
    bytes[buffer_at..buffer_at + PTR].copy_from_slice(&cursor.to_le_bytes());

    // Terminator is already zero
    end + 2
}

fn read_field(bytes: &[u8], field_offset: usize) -> UnicodeStringField {
    let length = u16::from_le_bytes([bytes[field_offset], bytes[field_offset + 1]]);
    let maximum_length = u16::from_le_bytes([bytes[field_offset + 2], bytes[field_offset + 3]]);
    let buffer_at = field_offset + UNICODE_STRING_BUFFER_OFFSET;
    let mut raw = [0u8; PTR];
    raw.copy_from_slice(&bytes[buffer_at..buffer_at + PTR]);
    UnicodeStringField {
        length,
        maximum_length,
        offset: usize::from_le_bytes(raw),
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FixedLookup {
        result: Result<u32, PayloadError>,
        calls: Cell<usize>,
    }

    impl AuthPackageLookup for FixedLookup {
        fn lookup_auth_package(&self, name: &str) -> Result<u32, PayloadError> {
            assert_eq!(name, AUTH_PACKAGE_NAME);
            self.calls.set(self.calls.get() + 1);
            self.result.clone()
        }
    }

    #[test]
    fn test_header_matches_native_layout() {
        if PTR == 8 {
            assert_eq!(HEADER_SIZE, 64);
            assert_eq!(DOMAIN_OFFSET, 8);
        } else {
            assert_eq!(HEADER_SIZE, 36);
            assert_eq!(DOMAIN_OFFSET, 4);
        }
    }

    #[test]
    fn test_build_reconstructs_all_fields() {
        let packed = build("bob", &SecureString::new("pw"), "HOST").unwrap();

        assert_eq!(packed.message_type(), KERB_INTERACTIVE_UNLOCK_LOGON);
        let user = packed.username_field();
        assert_eq!(user.len_units(), "bob".len());
        assert_eq!(user.length, 6);
        assert_eq!(user.maximum_length, 8);

        let unpacked = packed.unpack().unwrap();
        assert_eq!(unpacked.username, "bob");
        assert_eq!(unpacked.password.as_str(), "pw");
        assert_eq!(unpacked.domain, "HOST");
        assert_eq!(unpacked.message_type, KERB_INTERACTIVE_UNLOCK_LOGON);
    }

    #[test]
    fn test_strings_are_laid_out_after_header_with_terminators() {
        let packed = build("bob", &SecureString::new("pw"), "HOST").unwrap();
        let domain = packed.domain_field();
        let user = packed.username_field();
        let password = packed.password_field();

        assert_eq!(domain.offset, HEADER_SIZE);
        assert_eq!(user.offset, domain.offset + usize::from(domain.maximum_length));
        assert_eq!(password.offset, user.offset + usize::from(user.maximum_length));
        assert_eq!(
            packed.len(),
            password.offset + usize::from(password.maximum_length)
        );
        let bytes = packed.as_bytes();
        assert_eq!(&bytes[user.offset + 6..user.offset + 8], &[0, 0]);
    }

    #[test]
    fn test_lengths_count_utf16_units_not_bytes_of_utf8() {
        let packed = build("jürgen", &SecureString::new("\u{1F512}"), "HOST").unwrap();
        assert_eq!(packed.username_field().len_units(), 6);
        // Surrogate pair: two code units
        assert_eq!(packed.password_field().len_units(), 2);
        assert_eq!(packed.unpack().unwrap().username, "jürgen");
    }

    #[test]
    fn test_username_too_long_is_rejected() {
        let long = "u".repeat(MAX_USERNAME_CHARS + 1);
        let err = build(&long, &SecureString::new("pw"), "HOST").unwrap_err();
        assert_eq!(
            err,
            PayloadError::FieldTooLong {
                field: "username",
                len: MAX_USERNAME_CHARS + 1,
                max: MAX_USERNAME_CHARS,
            }
        );
    }

    #[test]
    fn test_field_at_capacity_is_accepted() {
        let name = "u".repeat(MAX_USERNAME_CHARS);
        let password = SecureString::new("p".repeat(MAX_PASSWORD_CHARS));
        let domain = "D".repeat(MAX_DOMAIN_CHARS);
        let packed = build(&name, &password, &domain).unwrap();
        assert_eq!(packed.username_field().len_units(), MAX_USERNAME_CHARS);
        assert_eq!(packed.unpack().unwrap().domain, domain);
    }

    #[test]
    fn test_password_and_domain_capacities_are_enforced() {
        let password = SecureString::new("p".repeat(MAX_PASSWORD_CHARS + 1));
        assert!(matches!(
            build("bob", &password, "HOST"),
            Err(PayloadError::FieldTooLong { field: "password", .. })
        ));

        let domain = "D".repeat(MAX_DOMAIN_CHARS + 1);
        assert!(matches!(
            build("bob", &SecureString::new("pw"), &domain),
            Err(PayloadError::FieldTooLong { field: "domain", .. })
        ));
    }

    #[test]
    fn test_empty_password_is_packed() {
        let packed = build("bob", &SecureString::new(""), "HOST").unwrap();
        assert_eq!(packed.password_field().length, 0);
        assert_eq!(packed.password_field().maximum_length, 2);
        assert_eq!(packed.unpack().unwrap().password.as_str(), "");
    }

    #[test]
    fn test_submission_resolves_package_after_length_checks() {
        let lookup = FixedLookup {
            result: Ok(2),
            calls: Cell::new(0),
        };
        let long = "u".repeat(MAX_USERNAME_CHARS + 1);
        assert!(build_for_submission(&long, &SecureString::new("pw"), "HOST", &lookup).is_err());
        assert_eq!(lookup.calls.get(), 0);

        let payload =
            build_for_submission("bob", &SecureString::new("pw"), "HOST", &lookup).unwrap();
        assert_eq!(payload.auth_package, 2);
        assert_eq!(lookup.calls.get(), 1);
        assert_eq!(unpack(&payload.serialization).unwrap().username, "bob");
    }

    #[test]
    fn test_missing_auth_package_is_surfaced() {
        let lookup = FixedLookup {
            result: Err(PayloadError::AuthPackageUnavailable("no LSA".to_string())),
            calls: Cell::new(0),
        };
        let err = build_for_submission("bob", &SecureString::new("pw"), "HOST", &lookup)
            .unwrap_err();
        assert!(matches!(err, PayloadError::AuthPackageUnavailable(_)));
    }

    #[test]
    fn test_unpack_rejects_out_of_bounds_offsets() {
        let packed = build("bob", &SecureString::new("pw"), "HOST").unwrap();
        let mut bytes = packed.as_bytes().to_vec();
        let buffer_at = USERNAME_OFFSET + UNICODE_STRING_BUFFER_OFFSET;
        bytes[buffer_at..buffer_at + PTR].copy_from_slice(&10_000usize.to_le_bytes());
        assert!(unpack(&bytes).is_none());
        assert!(unpack(&bytes[..HEADER_SIZE - 1]).is_none());
    }

    #[test]
    fn test_debug_output_hides_contents() {
        let packed = build("bob", &SecureString::new("hunter2"), "HOST").unwrap();
        assert!(!format!("{:?}", packed).contains("bob"));
    }
}
