//! Machine-bound data protection primitive
//!
//! On Windows this is DPAPI in machine scope: no key material is handled by
//! this crate and the ciphertext only decrypts on the machine that produced
//! it. The blob is self-describing, so nothing besides the ciphertext has to
//! be stored.

use crate::utils::ProtectError;
use zeroize::Zeroizing;

pub trait DataProtector: Send + Sync {
    /// Encrypt `plaintext` with the machine key.
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectError>;

    /// Decrypt a blob produced by [`DataProtector::protect`] on this machine.
    ///
    /// The returned buffer wipes itself on drop.
    fn unprotect(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, ProtectError>;
}
