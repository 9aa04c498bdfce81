//! Configuration file source.
//!
//! Implements [`ConfigSource`]: mounts the `littlefs` data partition,
//! reads the JSON configuration and unmounts again, so the filesystem is
//! only held while a configuration rebuild is in progress.
//!
//! - **`target_os = "espidf"`**: `esp_vfs_littlefs_register` /
//!   `esp_vfs_littlefs_unregister` from the littlefs managed component.
//! - **`not(target_os = "espidf")`**: plain host file read.

use std::io::ErrorKind;
use std::path::PathBuf;

use log::{debug, error};

use crate::app::ports::ConfigSource;
use crate::config::CONFIG_PATH;
use crate::error::ConfigError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::{ESP_OK, littlefs};

#[cfg(target_os = "espidf")]
const BASE_PATH: &core::ffi::CStr = c"/littlefs";
#[cfg(target_os = "espidf")]
const PARTITION_LABEL: &core::ffi::CStr = c"littlefs";

pub struct LittleFsSource {
    path: PathBuf,
}

impl Default for LittleFsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LittleFsSource {
    /// Source reading [`CONFIG_PATH`].
    pub fn new() -> Self {
        Self::at(CONFIG_PATH)
    }

    /// Source reading another file, e.g. a fixture on the host.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(target_os = "espidf")]
    fn mount(&self) -> Result<(), ConfigError> {
        // SAFETY: every field not set below is valid when zeroed
        // (no explicit partition, no formatting, mount immediately).
        let mut conf: littlefs::esp_vfs_littlefs_conf_t = unsafe { core::mem::zeroed() };
        conf.base_path = BASE_PATH.as_ptr();
        conf.partition_label = PARTITION_LABEL.as_ptr();
        // SAFETY: `conf` and the static strings outlive the call.
        let ret = unsafe { littlefs::esp_vfs_littlefs_register(&conf) };
        if ret != ESP_OK {
            error!("Config: littlefs mount failed ({})", ret);
            return Err(ConfigError::MountFailed);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn mount(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn unmount(&self) {
        // SAFETY: the partition was registered by `mount`.
        let ret = unsafe { littlefs::esp_vfs_littlefs_unregister(PARTITION_LABEL.as_ptr()) };
        if ret != ESP_OK {
            log::warn!("Config: littlefs unmount failed ({})", ret);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn unmount(&self) {}
}

impl ConfigSource for LittleFsSource {
    fn read_config(&mut self) -> Result<Vec<u8>, ConfigError> {
        self.mount()?;
        let result = std::fs::read(&self.path).map_err(|e| {
            error!("Config: cannot read {}: {}", self.path.display(), e);
            if e.kind() == ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ReadFailed
            }
        });
        self.unmount();

        if let Ok(bytes) = &result {
            debug!("Config: read {} bytes from {}", bytes.len(), self.path.display());
        }
        result
    }
}
