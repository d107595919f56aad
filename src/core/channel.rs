//! Unlock request channel
//!
//! A persisted single-slot mailbox (`UnlockRequest` DWORD) through which the
//! session monitor asks the unlock agent to act. The monitor and the agent
//! live in unrelated processes with unrelated lifetimes, so the slot is
//! durable state rather than in-memory IPC.
//!
//! | value            | meaning |
//! |------------------|---------|
//! | absent or `0`    | CLEAR   |
//! | non-zero DWORD   | ARMED   |

use crate::constants::VALUE_UNLOCK_REQUEST;
use crate::core::store::{ConfigStore, StoredValue};
use crate::utils::{ChannelError, StoreError};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct UnlockChannel {
    store: Arc<dyn ConfigStore>,
}

impl UnlockChannel {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Set the slot to ARMED, overwriting whatever was there.
    pub fn arm(&self) -> Result<(), ChannelError> {
        self.store
            .write_value(VALUE_UNLOCK_REQUEST, &StoredValue::Dword(1))?;
        info!("Unlock request armed");
        Ok(())
    }

    /// Pure read of the slot
    ///
    /// Storage failures read as CLEAR: an unreadable request never authorizes
    /// an unlock.
    pub fn is_armed(&self) -> bool {
        match self.store.read_value(VALUE_UNLOCK_REQUEST) {
            Ok(StoredValue::Dword(value)) => value != 0,
            Ok(other) => {
                warn!("Ignoring unlock request with unexpected type: {:?}", other);
                false
            }
            Err(StoreError::NotFound) => false,
            Err(e) => {
                warn!("Failed to read unlock request: {}", e);
                false
            }
        }
    }

    /// Observe ARMED and transition to CLEAR
    ///
    /// Returns `true` at most once per [`UnlockChannel::arm`] from the point
    /// of view of a single caller. This is a read followed by a delete, not
    /// an atomic exchange: two agents that both read ARMED before either
    /// deletes will both see `true`. The registry offers no read-and-reset
    /// primitive, and a second unlock submission against an already unlocked
    /// session is harmless, so the window is accepted.
    ///
    /// If the delete fails the request is reported as not consumed, so a
    /// stale ARMED value can never be redeemed twice by the same caller.
    pub fn try_consume(&self) -> bool {
        if !self.is_armed() {
            return false;
        }

        match self.clear() {
            Ok(()) => {
                info!("Unlock request consumed");
                true
            }
            Err(e) => {
                warn!("Unlock request observed but could not be cleared: {}", e);
                false
            }
        }
    }

    /// Set the slot to CLEAR
    ///
    /// # Returns
    /// * `Ok(())` - Success (idempotent - succeeds when already clear)
    pub fn clear(&self) -> Result<(), ChannelError> {
        self.store.delete_value(VALUE_UNLOCK_REQUEST)?;
        debug!("Unlock request cleared");
        Ok(())
    }
}
