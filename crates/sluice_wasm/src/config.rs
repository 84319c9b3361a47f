//! Sandbox configuration.

use serde::{Deserialize, Serialize};
use sluice_core::{SluiceError, SluiceResult};
use std::path::Path;

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum linear memory in bytes
    pub max_memory: usize,
    /// Fuel budget per export invocation; `None` disables metering
    pub max_fuel: Option<u64>,
    /// Link WASI preview1 imports (needed for `random_get`)
    pub enable_wasi: bool,
    /// Start-up export returning 0 (or 1 if already initialized)
    pub init_export: Option<String>,
    /// Allocation export, `(u32) -> u32`
    pub malloc_export: String,
    /// Release export, `(u32) -> ()`
    pub free_export: String,
    /// Exported linear memory
    pub memory_export: String,
    /// Overwrite buffers with zeros before releasing them
    pub scrub_on_release: bool,
}

impl SandboxConfig {
    /// Create a new sandbox config for a libsodium-style module
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_memory: 16 * 1024 * 1024, // 16MB
            max_fuel: None,
            enable_wasi: true,
            init_export: Some("sodium_init".to_string()),
            malloc_export: "malloc".to_string(),
            free_export: "free".to_string(),
            memory_export: "memory".to_string(),
            scrub_on_release: false,
        }
    }

    /// Load a config from JSON; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns `Load` if the JSON is malformed
    pub fn from_json(json: &str) -> SluiceResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SluiceError::Load(format!("invalid sandbox config: {e}")))
    }

    /// Load a JSON config file
    ///
    /// # Errors
    ///
    /// Returns `Load` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> SluiceResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SluiceError::Load(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Set memory limit
    #[must_use]
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Set per-invocation fuel budget
    #[must_use]
    pub fn with_max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = Some(fuel);
        self
    }

    /// Enable/disable WASI
    #[must_use]
    pub fn with_wasi(mut self, enable: bool) -> Self {
        self.enable_wasi = enable;
        self
    }

    /// Set or clear the start-up export
    #[must_use]
    pub fn with_init_export(mut self, export: Option<&str>) -> Self {
        self.init_export = export.map(str::to_string);
        self
    }

    /// Set allocator export names
    #[must_use]
    pub fn with_allocator(mut self, malloc: &str, free: &str) -> Self {
        self.malloc_export = malloc.to_string();
        self.free_export = free.to_string();
        self
    }

    /// Enable/disable scrubbing of released buffers
    #[must_use]
    pub fn with_scrub_on_release(mut self, scrub: bool) -> Self {
        self.scrub_on_release = scrub;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = SandboxConfig::new();
        assert_eq!(config.max_memory, 16 * 1024 * 1024);
        assert_eq!(config.init_export.as_deref(), Some("sodium_init"));
        assert!(config.max_fuel.is_none());
    }

    #[test]
    fn test_config_builders() {
        let config = SandboxConfig::new()
            .with_max_fuel(1_000_000)
            .with_wasi(false)
            .with_init_export(None)
            .with_allocator("_malloc", "_free")
            .with_scrub_on_release(true);
        assert_eq!(config.max_fuel, Some(1_000_000));
        assert!(!config.enable_wasi);
        assert!(config.init_export.is_none());
        assert_eq!(config.malloc_export, "_malloc");
        assert_eq!(config.free_export, "_free");
        assert!(config.scrub_on_release);
    }

    #[test]
    fn test_config_partial_json() {
        let config =
            SandboxConfig::from_json(r#"{ "max_fuel": 5000, "scrub_on_release": true }"#).unwrap();
        assert_eq!(config.max_fuel, Some(5000));
        assert!(config.scrub_on_release);
        assert_eq!(config.malloc_export, "malloc");
    }

    #[test]
    fn test_config_bad_json() {
        let err = SandboxConfig::from_json("{ max_fuel: }").unwrap_err();
        assert_eq!(err.kind(), "LoadError");
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandbox.json");
        std::fs::write(&path, r#"{ "enable_wasi": false }"#).unwrap();
        let config = SandboxConfig::from_file(&path).unwrap();
        assert!(!config.enable_wasi);
    }
}
