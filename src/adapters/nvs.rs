//! NVS (Non-Volatile Storage) adapter.
//!
//! Persistent key-value storage for the terminal. Two namespaces are in
//! use: `haloterm` for the postcard-encoded [`SystemConfig`] blob, and
//! `cred` for the provisioning strings (`ssid`, `password`, `ws_url`).
//! A device counts as provisioned when `ssid` exists and is non-empty.
//!
//! - **`target_os = "espidf"`**: real ESP-IDF NVS calls; commits are atomic.
//! - **all other targets**: in-memory map for host-side tests.

use crate::config::SystemConfig;
use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "haloterm";
const CONFIG_KEY: &str = "syscfg";
const CRED_NAMESPACE: &str = "cred";

const MAX_BLOB_SIZE: usize = 2048;

/// Errors from storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    NotFound,
    Corrupted,
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Corrupted => write!(f, "stored blob corrupted"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

/// Persistent key-value storage port.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::sync::Mutex<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new adapter and initialise NVS flash. On first boot or
    /// after a version mismatch the partition is erased and re-initialised.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::sync::Mutex::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let kb = key.as_bytes();
        let kl = kb.len().min(15);
        buf[..kl].copy_from_slice(&kb[..kl]);
        buf
    }

    // ── System configuration blob ─────────────────────────────

    /// Load [`SystemConfig`], falling back to defaults when absent or
    /// unreadable. Corruption is absorbed — the server is the authority
    /// and a default config always boots.
    pub fn load_config(&self) -> SystemConfig {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => match postcard::from_bytes::<SystemConfig>(&buf[..len]) {
                Ok(cfg) => {
                    info!("NvsAdapter: config loaded ({} bytes)", len);
                    cfg
                }
                Err(_) => {
                    log::warn!("NvsAdapter: stored config corrupted, using defaults");
                    SystemConfig::default()
                }
            },
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                SystemConfig::default()
            }
            Err(e) => {
                log::warn!("NvsAdapter: config read error ({}), using defaults", e);
                SystemConfig::default()
            }
        }
    }

    /// Validate and persist [`SystemConfig`].
    pub fn save_config(&mut self, config: &SystemConfig) -> Result<(), StorageError> {
        validate_config(config).map_err(|msg| {
            log::warn!("NvsAdapter: config rejected — {}", msg);
            StorageError::Corrupted
        })?;
        let bytes = postcard::to_allocvec(config).map_err(|_| StorageError::IoError)?;
        self.write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }

    // ── Provisioning credentials ──────────────────────────────

    /// Read a credential string from the `cred` namespace.
    pub fn credential(&self, key: &str) -> Option<heapless::String<96>> {
        let mut buf = [0u8; 96];
        let len = self.read(CRED_NAMESPACE, key, &mut buf).ok()?;
        let s = core::str::from_utf8(&buf[..len]).ok()?;
        let mut out = heapless::String::new();
        out.push_str(s).ok()?;
        Some(out)
    }

    /// Store a credential string in the `cred` namespace.
    pub fn set_credential(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.write(CRED_NAMESPACE, key, value.as_bytes())
    }

    /// Erase all provisioning credentials (factory reset).
    pub fn erase_credentials(&mut self) -> Result<(), StorageError> {
        for key in ["ssid", "password", "ws_url"] {
            self.delete(CRED_NAMESPACE, key)?;
        }
        Ok(())
    }

    /// A device is provisioned when a non-empty `ssid` credential exists.
    pub fn is_provisioned(&self) -> bool {
        self.credential("ssid").is_some_and(|s| !s.is_empty())
    }
}

fn validate_config(cfg: &SystemConfig) -> Result<(), &'static str> {
    if cfg.screen_w <= 0 || cfg.screen_h <= 0 {
        return Err("screen dimensions must be positive");
    }
    if cfg.safe_padding < 0 || cfg.safe_padding * 2 >= cfg.screen_w.min(cfg.screen_h) {
        return Err("safe_padding must leave a visible root view");
    }
    if !(1_000..=600_000).contains(&cfg.screen_sleep_timeout_ms) {
        return Err("screen_sleep_timeout_ms must be 1000–600000");
    }
    if !(8_000..=48_000).contains(&cfg.sample_rate_hz) {
        return Err("sample_rate_hz must be 8000–48000");
    }
    if cfg.speaker_volume > 100 {
        return Err("speaker_volume must be 0–100");
    }
    if !(5..=3_600).contains(&cfg.telemetry_interval_secs) {
        return Err("telemetry_interval_secs must be 5–3600");
    }
    if !(1_000..=60_000).contains(&cfg.reconnect_delay_ms) {
        return Err("reconnect_delay_ms must be 1000–60000");
    }
    Ok(())
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.lock().unwrap().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key_buf = Self::key_buf(key);
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.lock().unwrap().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key_buf = Self::key_buf(key);
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.lock().unwrap().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key_buf = Self::key_buf(key);
                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.lock().unwrap().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key_buf = Self::key_buf(key);
                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(validate_config(&SystemConfig::default()).is_ok());
    }

    #[test]
    fn rejects_oversized_padding() {
        let cfg = SystemConfig {
            safe_padding: 300,
            ..Default::default()
        };
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn rejects_volume_over_100() {
        let cfg = SystemConfig {
            speaker_volume: 101,
            ..Default::default()
        };
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn config_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        let mut cfg = SystemConfig::default();
        cfg.telemetry_interval_secs = 60;
        nvs.save_config(&cfg).unwrap();
        assert_eq!(nvs.load_config().telemetry_interval_secs, 60);
    }

    #[test]
    fn storage_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("test_ns", "greeting", b"hello NVS").unwrap();
        assert!(nvs.exists("test_ns", "greeting"));

        let mut buf = [0u8; 64];
        let len = nvs.read("test_ns", "greeting", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello NVS");

        nvs.delete("test_ns", "greeting").unwrap();
        assert!(!nvs.exists("test_ns", "greeting"));
    }

    #[test]
    fn unprovisioned_without_ssid() {
        let nvs = NvsAdapter::new().unwrap();
        assert!(!nvs.is_provisioned());
    }

    #[test]
    fn empty_ssid_is_unprovisioned() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.set_credential("ssid", "").unwrap();
        assert!(!nvs.is_provisioned());
    }

    #[test]
    fn credential_round_trip_marks_provisioned() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.set_credential("ssid", "HomeNet").unwrap();
        nvs.set_credential("password", "secret123").unwrap();
        nvs.set_credential("ws_url", "ws://10.0.0.2:8080").unwrap();

        assert!(nvs.is_provisioned());
        assert_eq!(nvs.credential("ssid").unwrap().as_str(), "HomeNet");
        assert_eq!(
            nvs.credential("ws_url").unwrap().as_str(),
            "ws://10.0.0.2:8080"
        );
    }

    #[test]
    fn erase_credentials_unprovisions() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.set_credential("ssid", "HomeNet").unwrap();
        nvs.erase_credentials().unwrap();
        assert!(!nvs.is_provisioned());
        assert!(nvs.credential("ssid").is_none());
    }
}
