use std::collections::HashMap;

use parking_lot::RwLock;

use crate::compare::secure_eq_bytes;
use crate::error::DeviceAuthError;

/// In-memory `nodeId -> publicKey` pinning table. Reads are lock-free
/// acceptable (a read lock); writes (install/evict) serialize through the
/// same lock. The core ships only this in-memory map; durable persistence
/// across restarts is the caller's concern (wire a different backing
/// store in front of the same `check_or_pin` contract).
pub struct DeviceKeyRegistry {
    keys: RwLock<HashMap<String, Vec<u8>>>,
    max_keys: usize,
    allow_tofu: bool,
}

impl DeviceKeyRegistry {
    pub fn new(allow_tofu: bool, max_keys: usize) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            max_keys,
            allow_tofu,
        }
    }

    /// Pre-seeds a known key at startup (from configuration), bypassing
    /// the TOFU gate — these are trusted by configuration, not by
    /// first contact.
    pub fn seed(&self, node_id: impl Into<String>, public_key: Vec<u8>) {
        self.keys.write().insert(node_id.into(), public_key);
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// If a key is already pinned for `node_id`, it must match. Otherwise,
    /// if TOFU is allowed and the registry has room, pin `public_key` and
    /// accept.
    pub fn check_or_pin(
        &self,
        node_id: &str,
        public_key: &[u8],
    ) -> Result<(), DeviceAuthError> {
        if let Some(pinned) = self.keys.read().get(node_id) {
            return if secure_eq_bytes(pinned, public_key) {
                Ok(())
            } else {
                Err(DeviceAuthError::DeviceKeyMismatch)
            };
        }

        if !self.allow_tofu {
            return Err(DeviceAuthError::DeviceKeyUnknown);
        }

        let mut keys = self.keys.write();
        // Re-check under the write lock: another task may have pinned
        // concurrently between the read above and acquiring this lock.
        if let Some(pinned) = keys.get(node_id) {
            return if secure_eq_bytes(pinned, public_key) {
                Ok(())
            } else {
                Err(DeviceAuthError::DeviceKeyMismatch)
            };
        }
        if keys.len() >= self.max_keys {
            return Err(DeviceAuthError::RegistryFull);
        }
        keys.insert(node_id.to_string(), public_key.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tofu_pins_unknown_key() {
        let reg = DeviceKeyRegistry::new(true, 10);
        assert!(reg.check_or_pin("n1", b"key-a").is_ok());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn pinned_key_must_match() {
        let reg = DeviceKeyRegistry::new(true, 10);
        reg.check_or_pin("n1", b"key-a").unwrap();
        assert_eq!(
            reg.check_or_pin("n1", b"key-b"),
            Err(DeviceAuthError::DeviceKeyMismatch)
        );
    }

    #[test]
    fn pinned_key_matches_is_accepted_repeatedly() {
        let reg = DeviceKeyRegistry::new(true, 10);
        reg.check_or_pin("n1", b"key-a").unwrap();
        assert!(reg.check_or_pin("n1", b"key-a").is_ok());
    }

    #[test]
    fn tofu_disabled_rejects_unknown_key() {
        let reg = DeviceKeyRegistry::new(false, 10);
        assert_eq!(
            reg.check_or_pin("n1", b"key-a"),
            Err(DeviceAuthError::DeviceKeyUnknown)
        );
    }

    #[test]
    fn registry_full_rejects_new_node() {
        let reg = DeviceKeyRegistry::new(true, 1);
        reg.check_or_pin("n1", b"key-a").unwrap();
        assert_eq!(
            reg.check_or_pin("n2", b"key-b"),
            Err(DeviceAuthError::RegistryFull)
        );
    }

    #[test]
    fn seeded_key_is_enforced_without_tofu() {
        let reg = DeviceKeyRegistry::new(false, 10);
        reg.seed("n1", b"key-a".to_vec());
        assert!(reg.check_or_pin("n1", b"key-a").is_ok());
        assert_eq!(
            reg.check_or_pin("n1", b"key-b"),
            Err(DeviceAuthError::DeviceKeyMismatch)
        );
    }
}
