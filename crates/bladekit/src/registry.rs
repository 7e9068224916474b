//! Fixed table of enabled dynamic keys

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bus::Listener;
use crate::error::{BladeError, Result};
use crate::events::KeyEvent;
use crate::key::{DynamicKey, KeyIdentity, KEY_COUNT};
use crate::native::Driver;

/// Owns the key currently occupying each of the ten slots.
pub struct KeyRegistry {
    driver: Arc<dyn Driver>,
    slots: Mutex<[Option<Arc<DynamicKey>>; KEY_COUNT]>,
}

impl KeyRegistry {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            slots: Mutex::new(Default::default()),
        }
    }

    /// Enable a key, or return the one already in its slot.
    ///
    /// With `replace` false an occupied slot is returned as-is and nothing
    /// is uploaded. Otherwise the occupant is disabled and a new key is
    /// created with both images pushed to the device.
    pub fn enable(
        &self,
        identity: KeyIdentity,
        up_image: &Path,
        down_image: &Path,
        listener: Option<Listener<KeyEvent>>,
        replace: bool,
    ) -> Result<Arc<DynamicKey>> {
        let slot = identity.slot()?;
        let mut slots = self.slots.lock();

        if let Some(existing) = &slots[slot] {
            if !replace {
                tracing::info!("Dynamic key {} already enabled and replace is false", identity);
                return Ok(existing.clone());
            }
        }

        tracing::debug!("Resetting dynamic key {}", identity);
        if let Some(old) = slots[slot].take() {
            old.disable();
        }

        let key = DynamicKey::new(self.driver.clone(), identity, up_image, down_image).map_err(
            |err| match err {
                BladeError::Native(source) => {
                    tracing::error!("Failed to enable dynamic key {}: {}", identity, source.code.name());
                    BladeError::KeyEnable {
                        key: identity,
                        source,
                    }
                }
                other => other,
            },
        )?;

        if let Some(listener) = listener {
            key.add_listener(listener);
        }

        slots[slot] = Some(key.clone());
        tracing::info!("Enabled dynamic key {}", identity);
        Ok(key)
    }

    /// Disable the key in `identity`'s slot. An empty slot is a no-op.
    pub fn disable(&self, identity: KeyIdentity) -> Result<()> {
        let slot = identity.slot()?;
        if let Some(key) = self.slots.lock()[slot].take() {
            key.disable();
        }
        Ok(())
    }

    pub fn get(&self, identity: KeyIdentity) -> Result<Option<Arc<DynamicKey>>> {
        let slot = identity.slot()?;
        Ok(self.slots.lock()[slot].clone())
    }

    pub fn disable_all(&self) {
        let mut slots = self.slots.lock();
        for key in slots.iter_mut().filter_map(Option::take) {
            key.disable();
        }
    }

    /// Identities of every occupied slot, in slot order.
    pub fn enabled_keys(&self) -> Vec<KeyIdentity> {
        self.slots
            .lock()
            .iter()
            .flatten()
            .map(|key| key.identity())
            .collect()
    }
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("enabled", &self.enabled_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::ResultCode;
    use crate::sim::{DriverCall, SimulatedDriver};
    use std::path::PathBuf;

    fn registry() -> (Arc<SimulatedDriver>, KeyRegistry) {
        let driver = Arc::new(SimulatedDriver::new());
        let registry = KeyRegistry::new(driver.clone());
        (driver, registry)
    }

    #[test]
    fn test_enable_without_replace_returns_existing() {
        let (driver, registry) = registry();
        let first = registry
            .enable(KeyIdentity::Dk1, Path::new("a.png"), Path::new("a.png"), None, false)
            .unwrap();
        let uploads = driver.calls().len();

        let second = registry
            .enable(KeyIdentity::Dk1, Path::new("other.png"), Path::new(""), None, false)
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(driver.calls().len(), uploads);
        assert_eq!(second.up_image(), PathBuf::from("a.png"));
    }

    #[test]
    fn test_enable_with_replace_builds_new_key() {
        let (_, registry) = registry();
        let first = registry
            .enable(KeyIdentity::Dk3, Path::new("a.png"), Path::new(""), None, false)
            .unwrap();
        let second = registry
            .enable(KeyIdentity::Dk3, Path::new("b.png"), Path::new(""), None, true)
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        let current = registry.get(KeyIdentity::Dk3).unwrap().unwrap();
        assert!(Arc::ptr_eq(&current, &second));
    }

    #[test]
    fn test_enable_uploads_up_then_down() {
        let (driver, registry) = registry();
        registry
            .enable(KeyIdentity::Dk4, Path::new("up.png"), Path::new("down.png"), None, false)
            .unwrap();

        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::SetKeyImage(
                    KeyIdentity::Dk4,
                    crate::key::KeyState::Up,
                    PathBuf::from("up.png")
                ),
                DriverCall::SetKeyImage(
                    KeyIdentity::Dk4,
                    crate::key::KeyState::Down,
                    PathBuf::from("down.png")
                ),
            ]
        );
    }

    #[test]
    fn test_enable_native_failure_leaves_slot_empty() {
        let (driver, registry) = registry();
        driver.fail_once("RzSBSetImageDynamicKey", ResultCode::ImageInvalidSize);

        let err = registry
            .enable(KeyIdentity::Dk2, Path::new("huge.png"), Path::new(""), None, false)
            .expect_err("upload failure must surface");

        match err {
            BladeError::KeyEnable { key, source } => {
                assert_eq!(key, KeyIdentity::Dk2);
                assert_eq!(source.code, ResultCode::ImageInvalidSize);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(registry.get(KeyIdentity::Dk2).unwrap().is_none());
    }

    #[test]
    fn test_enable_empty_up_image_is_invalid_argument() {
        let (_, registry) = registry();
        let err = registry
            .enable(KeyIdentity::Dk2, Path::new(""), Path::new(""), None, false)
            .unwrap_err();
        assert!(matches!(err, BladeError::InvalidArgument { .. }));
    }

    #[test]
    fn test_sentinels_rejected() {
        let (_, registry) = registry();
        for identity in [KeyIdentity::None, KeyIdentity::Invalid] {
            assert!(registry
                .enable(identity, Path::new("a.png"), Path::new(""), None, false)
                .is_err());
            assert!(registry.disable(identity).is_err());
            assert!(registry.get(identity).is_err());
        }
    }

    #[test]
    fn test_disable_and_disable_all() {
        let (_, registry) = registry();
        for identity in [KeyIdentity::Dk1, KeyIdentity::Dk5, KeyIdentity::Dk10] {
            registry
                .enable(identity, Path::new("a.png"), Path::new(""), None, false)
                .unwrap();
        }
        assert_eq!(
            registry.enabled_keys(),
            vec![KeyIdentity::Dk1, KeyIdentity::Dk5, KeyIdentity::Dk10]
        );

        registry.disable(KeyIdentity::Dk5).unwrap();
        // Disabling an empty slot is fine
        registry.disable(KeyIdentity::Dk5).unwrap();
        assert!(registry.get(KeyIdentity::Dk5).unwrap().is_none());

        registry.disable_all();
        assert!(registry.enabled_keys().is_empty());
    }
}
