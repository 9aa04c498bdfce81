//! Gateway peer cache backed by key-value storage.
//!
//! The record and its validity flag are separate keys.  A write first
//! clears the flag, then stores the record, then sets the flag, so a power
//! loss in between leaves the cache invalid rather than half-written.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{MacAddr, PeerCache, StoragePort};
use crate::error::StorageError;

const NAMESPACE: &str = "iot_peer";
const KEY_RECORD: &str = "gateway";
const KEY_VALID: &str = "valid";
const VALID_MARKER: u8 = 0xA5;
const MAX_RECORD_SIZE: usize = 32;

/// Cached gateway identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub address: MacAddr,
    pub rssi: i8,
}

/// [`PeerCache`] over any [`StoragePort`].
pub struct StoredPeerCache<S: StoragePort> {
    storage: S,
}

impl<S: StoragePort> StoredPeerCache<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}

impl<S: StoragePort> PeerCache for StoredPeerCache<S> {
    fn get(&self) -> Option<PeerRecord> {
        if !self.is_valid() {
            return None;
        }
        let mut buf = [0u8; MAX_RECORD_SIZE];
        let len = match self.storage.read(NAMESPACE, KEY_RECORD, &mut buf) {
            Ok(len) => len,
            Err(e) => {
                warn!("PeerCache: read failed: {}", e);
                return None;
            }
        };
        match postcard::from_bytes(&buf[..len]) {
            Ok(rec) => Some(rec),
            Err(_) => {
                warn!("PeerCache: stored record corrupted");
                None
            }
        }
    }

    fn set(&mut self, record: &PeerRecord) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(record).map_err(|_| StorageError::Corrupted)?;
        self.storage.delete(NAMESPACE, KEY_VALID)?;
        self.storage.write(NAMESPACE, KEY_RECORD, &bytes)?;
        self.storage.write(NAMESPACE, KEY_VALID, &[VALID_MARKER])?;
        info!(
            "PeerCache: stored gateway {} (rssi {})",
            crate::app::report::MacDisplay(&record.address),
            record.rssi
        );
        Ok(())
    }

    fn is_valid(&self) -> bool {
        let mut flag = [0u8; 1];
        matches!(self.storage.read(NAMESPACE, KEY_VALID, &mut flag), Ok(1) if flag[0] == VALID_MARKER)
    }

    fn invalidate(&mut self) -> Result<(), StorageError> {
        self.storage.delete(NAMESPACE, KEY_VALID)
    }
}
