//! In-memory doubles for the OS primitives
//!
//! Lets the whole monitor/agent protocol run in unit tests without a
//! registry, DPAPI, WTS or LSA.

use super::agent::LogonEnvironment;
use super::channel::UnlockChannel;
use super::protect::DataProtector;
use super::session::{SessionHost, SessionInfo};
use super::store::{ConfigStore, StoredValue};
use crate::models::Username;
use crate::utils::{PayloadError, ProtectError, SessionEnumerationError, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use zeroize::Zeroizing;

/// Registry stand-in shared between a "monitor" and an "agent"
#[derive(Default)]
pub struct MemoryConfigStore {
    values: Mutex<HashMap<String, StoredValue>>,
    failure: Mutex<Option<StoreError>>,
    fail_deletes: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `err`.
    pub fn fail_with(&self, err: StoreError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    /// Make only deletes fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn read_value(&self, name: &str) -> Result<StoredValue, StoreError> {
        self.check()?;
        self.values
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn write_value(&self, name: &str, value: &StoredValue) -> Result<(), StoreError> {
        self.check()?;
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn delete_value(&self, name: &str) -> Result<(), StoreError> {
        self.check()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Io("delete refused".to_string()));
        }
        self.values.lock().unwrap().remove(name);
        Ok(())
    }
}

const XOR_MAGIC: &[u8; 2] = b"XP";

/// Machine-bound stand-in for DPAPI
///
/// Blob layout: `"XP" | machine id | checksum | payload ^ key`. A blob made
/// with one machine id fails to decrypt under another.
pub struct XorProtector {
    machine: u8,
}

impl XorProtector {
    pub fn new(machine: u8) -> Self {
        Self { machine }
    }

    fn key(&self, index: usize) -> u8 {
        (self.machine.wrapping_mul(0x5B) ^ 0xA5).wrapping_add(index as u8) | 0x80
    }
}

impl DataProtector for XorProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectError> {
        let checksum = plaintext.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        let mut blob = Vec::with_capacity(plaintext.len() + 4);
        blob.extend_from_slice(XOR_MAGIC);
        blob.push(self.machine);
        blob.push(checksum);
        blob.extend(plaintext.iter().enumerate().map(|(i, b)| b ^ self.key(i)));
        Ok(blob)
    }

    fn unprotect(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, ProtectError> {
        if ciphertext.len() < 4 || &ciphertext[..2] != XOR_MAGIC {
            return Err(ProtectError::Failed("malformed blob".to_string()));
        }
        if ciphertext[2] != self.machine {
            return Err(ProtectError::Failed("key not valid on this machine".to_string()));
        }
        let plaintext = Zeroizing::new(
            ciphertext[4..]
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ self.key(i))
                .collect::<Vec<u8>>(),
        );
        let checksum = plaintext.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if checksum != ciphertext[3] {
            return Err(ProtectError::Failed("checksum mismatch".to_string()));
        }
        Ok(plaintext)
    }
}

/// Scriptable session host that records what the monitor asked of it
pub struct MockSessionHost {
    sessions: Mutex<Result<Vec<SessionInfo>, SessionEnumerationError>>,
    lock_result: Mutex<Result<(), String>>,
    enumerate_delay: Mutex<Duration>,
    lock_delay: Mutex<Duration>,
    observed_channel: Option<UnlockChannel>,
    armed_at_lock: Mutex<Vec<bool>>,
    enumerations: AtomicUsize,
    locks: AtomicUsize,
}

impl MockSessionHost {
    pub fn new(sessions: Vec<SessionInfo>) -> Self {
        Self {
            sessions: Mutex::new(Ok(sessions)),
            lock_result: Mutex::new(Ok(())),
            enumerate_delay: Mutex::new(Duration::ZERO),
            lock_delay: Mutex::new(Duration::ZERO),
            observed_channel: None,
            armed_at_lock: Mutex::new(Vec::new()),
            enumerations: AtomicUsize::new(0),
            locks: AtomicUsize::new(0),
        }
    }

    /// Record the channel state every time a lock is forced.
    pub fn observing(mut self, channel: UnlockChannel) -> Self {
        self.observed_channel = Some(channel);
        self
    }

    pub fn set_sessions(&self, sessions: Result<Vec<SessionInfo>, SessionEnumerationError>) {
        *self.sessions.lock().unwrap() = sessions;
    }

    pub fn set_lock_result(&self, result: Result<(), String>) {
        *self.lock_result.lock().unwrap() = result;
    }

    pub fn set_enumerate_delay(&self, delay: Duration) {
        *self.enumerate_delay.lock().unwrap() = delay;
    }

    pub fn set_lock_delay(&self, delay: Duration) {
        *self.lock_delay.lock().unwrap() = delay;
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn locks(&self) -> usize {
        self.locks.load(Ordering::SeqCst)
    }

    pub fn armed_at_lock(&self) -> Vec<bool> {
        self.armed_at_lock.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SessionHost for MockSessionHost {
    async fn enumerate_sessions(&self) -> Result<Vec<SessionInfo>, SessionEnumerationError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let delay = *self.enumerate_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.sessions.lock().unwrap().clone()
    }

    async fn lock_workstation(&self) -> Result<(), String> {
        self.locks.fetch_add(1, Ordering::SeqCst);
        if let Some(channel) = &self.observed_channel {
            self.armed_at_lock.lock().unwrap().push(channel.is_armed());
        }
        let delay = *self.lock_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.lock_result.lock().unwrap().clone()
    }
}

/// Logon environment with a fixed user, computer and package id
pub struct MockLogonEnvironment {
    pub username: Result<String, String>,
    pub computer_name: Result<String, String>,
    pub auth_package: Result<u32, PayloadError>,
    pub lookups: AtomicUsize,
}

impl MockLogonEnvironment {
    pub fn new(username: &str, computer_name: &str) -> Self {
        Self {
            username: Ok(username.to_string()),
            computer_name: Ok(computer_name.to_string()),
            auth_package: Ok(2),
            lookups: AtomicUsize::new(0),
        }
    }
}

impl LogonEnvironment for MockLogonEnvironment {
    fn current_username(&self) -> Result<Username, String> {
        let name = self.username.clone()?;
        Username::new(name).map_err(|e| e.to_string())
    }

    fn computer_name(&self) -> Result<String, String> {
        self.computer_name.clone()
    }

    fn lookup_auth_package(&self, _name: &str) -> Result<u32, PayloadError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.auth_package.clone()
    }
}
