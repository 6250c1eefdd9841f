//! Configuration file management for taskforge.
//!
//! Provides a TOML-based config file at `~/.config/taskforge/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use taskforge_core::{GatewayConfig, RetryPolicy};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub provider: ProviderSection,
    #[serde(default, skip_serializing_if = "RetrySection::is_empty")]
    pub retry: RetrySection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderSection {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-attempt deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl RetrySection {
    fn is_empty(&self) -> bool {
        self.max_attempts.is_none() && self.base_delay_ms.is_none() && self.max_delay_ms.is_none()
    }

    fn apply(&self, mut policy: RetryPolicy) -> RetryPolicy {
        if let Some(n) = self.max_attempts {
            policy = policy.with_max_attempts(n);
        }
        if let Some(ms) = self.base_delay_ms {
            policy = policy.with_base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = self.max_delay_ms {
            policy = policy.with_max_delay(Duration::from_millis(ms));
        }
        policy
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the taskforge config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/taskforge` or
/// `~/.config/taskforge`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("taskforge");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("taskforge")
}

/// Return the path to the taskforge config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// `sk-a...wxyz` style rendering for display. Short keys are fully masked.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// API key from `TASKFORGE_API_KEY`, then `ANTHROPIC_API_KEY`.
pub fn api_key_from_env() -> Option<String> {
    ["TASKFORGE_API_KEY", "ANTHROPIC_API_KEY"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|key| !key.trim().is_empty())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct TaskforgeConfig {
    pub gateway: GatewayConfig,
}

impl TaskforgeConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - API key: `TASKFORGE_API_KEY` env > `ANTHROPIC_API_KEY` env > `provider.api_key` > error
    /// - Model: `cli_model` > `TASKFORGE_MODEL` env > `provider.model` > `GatewayConfig::DEFAULT_MODEL`
    /// - Base URL: `TASKFORGE_BASE_URL` env > `provider.base_url` > `GatewayConfig::DEFAULT_BASE_URL`
    /// - Timeout and retry: config file > defaults
    pub fn resolve(cli_model: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();
        let provider = file_config.as_ref().map(|c| &c.provider);

        let api_key = if let Some(key) = api_key_from_env() {
            key
        } else if let Some(p) = provider {
            p.api_key.clone()
        } else {
            bail!(
                "API key not found; set TASKFORGE_API_KEY or run `taskforge init --api-key <KEY>` to create a config file"
            );
        };

        let model = if let Some(m) = cli_model {
            m.to_string()
        } else if let Ok(m) = std::env::var("TASKFORGE_MODEL") {
            m
        } else if let Some(m) = provider.and_then(|p| p.model.clone()) {
            m
        } else {
            GatewayConfig::DEFAULT_MODEL.to_string()
        };

        let base_url = std::env::var("TASKFORGE_BASE_URL")
            .ok()
            .or_else(|| provider.and_then(|p| p.base_url.clone()))
            .unwrap_or_else(|| GatewayConfig::DEFAULT_BASE_URL.to_string());

        let mut gateway = GatewayConfig::new(api_key)
            .with_model(model)
            .with_base_url(base_url);
        if let Some(secs) = provider.and_then(|p| p.timeout_secs) {
            gateway = gateway.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(cfg) = &file_config {
            let retry = cfg.retry.apply(gateway.retry);
            gateway = gateway.with_retry(retry);
        }

        gateway
            .validate()
            .context("invalid provider configuration")?;

        Ok(Self { gateway })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    const ENV_VARS: [&str; 5] = [
        "TASKFORGE_API_KEY",
        "ANTHROPIC_API_KEY",
        "TASKFORGE_MODEL",
        "TASKFORGE_BASE_URL",
        "XDG_CONFIG_HOME",
    ];

    /// Clear provider env vars and point the config dir at a fresh temp dir.
    fn isolated_env() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        for var in ENV_VARS {
            unsafe { std::env::remove_var(var) };
        }
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };
        tmp
    }

    fn restore_env() {
        for var in ENV_VARS {
            unsafe { std::env::remove_var(var) };
        }
    }

    fn sample_file() -> ConfigFile {
        ConfigFile {
            provider: ProviderSection {
                api_key: "sk-file-key-0123456789".to_string(),
                model: Some("file-model".to_string()),
                base_url: Some("http://file.example".to_string()),
                timeout_secs: Some(30),
            },
            retry: RetrySection {
                max_attempts: Some(5),
                base_delay_ms: None,
                max_delay_ms: None,
            },
        }
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let _lock = lock_env();
        let _tmp = isolated_env();

        save_config(&sample_file()).unwrap();
        let loaded = load_config().unwrap();

        assert_eq!(loaded.provider.api_key, "sk-file-key-0123456789");
        assert_eq!(loaded.provider.model.as_deref(), Some("file-model"));
        assert_eq!(loaded.retry.max_attempts, Some(5));
        restore_env();
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let _lock = lock_env();
        let _tmp = isolated_env();

        save_config(&sample_file()).unwrap();
        let meta = std::fs::metadata(config_path()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        restore_env();
    }

    #[test]
    fn empty_retry_section_is_omitted() {
        let mut file = sample_file();
        file.retry = RetrySection::default();
        let text = toml::to_string_pretty(&file).unwrap();
        assert!(!text.contains("[retry]"));
        let back: ConfigFile = toml::from_str(&text).unwrap();
        assert!(back.retry.is_empty());
    }

    #[test]
    fn resolve_uses_config_file() {
        let _lock = lock_env();
        let _tmp = isolated_env();
        save_config(&sample_file()).unwrap();

        let config = TaskforgeConfig::resolve(None).unwrap();
        assert_eq!(config.gateway.api_key, "sk-file-key-0123456789");
        assert_eq!(config.gateway.model, "file-model");
        assert_eq!(config.gateway.base_url, "http://file.example");
        assert_eq!(config.gateway.request_timeout, Duration::from_secs(30));
        assert_eq!(config.gateway.retry.max_attempts, 5);
        restore_env();
    }

    #[test]
    fn resolve_env_overrides_config_file() {
        let _lock = lock_env();
        let _tmp = isolated_env();
        save_config(&sample_file()).unwrap();
        unsafe { std::env::set_var("TASKFORGE_API_KEY", "sk-env") };
        unsafe { std::env::set_var("TASKFORGE_MODEL", "env-model") };
        unsafe { std::env::set_var("TASKFORGE_BASE_URL", "http://env.example") };

        let config = TaskforgeConfig::resolve(None).unwrap();
        assert_eq!(config.gateway.api_key, "sk-env");
        assert_eq!(config.gateway.model, "env-model");
        assert_eq!(config.gateway.base_url, "http://env.example");
        restore_env();
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();
        let _tmp = isolated_env();
        save_config(&sample_file()).unwrap();
        unsafe { std::env::set_var("TASKFORGE_MODEL", "env-model") };

        let config = TaskforgeConfig::resolve(Some("cli-model")).unwrap();
        assert_eq!(config.gateway.model, "cli-model");
        restore_env();
    }

    #[test]
    fn resolve_falls_back_to_anthropic_key_and_defaults() {
        let _lock = lock_env();
        let _tmp = isolated_env();
        unsafe { std::env::set_var("ANTHROPIC_API_KEY", "sk-anthropic") };

        let config = TaskforgeConfig::resolve(None).unwrap();
        assert_eq!(config.gateway.api_key, "sk-anthropic");
        assert_eq!(config.gateway.model, GatewayConfig::DEFAULT_MODEL);
        assert_eq!(config.gateway.base_url, GatewayConfig::DEFAULT_BASE_URL);
        restore_env();
    }

    #[test]
    fn resolve_errors_when_no_api_key() {
        let _lock = lock_env();
        let _tmp = isolated_env();

        let result = TaskforgeConfig::resolve(None);
        restore_env();

        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("API key not found"), "unexpected error: {msg}");
    }

    #[test]
    fn resolve_rejects_out_of_range_values() {
        let _lock = lock_env();
        let _tmp = isolated_env();
        let mut file = sample_file();
        file.retry.max_attempts = Some(0);
        save_config(&file).unwrap();

        let result = TaskforgeConfig::resolve(None);
        restore_env();

        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("max_attempts"), "unexpected error: {msg}");
    }

    #[test]
    fn mask_secret_hides_the_middle() {
        assert_eq!(mask_secret("sk-ant-0123456789abcd"), "sk-a...abcd");
        assert_eq!(mask_secret("short"), "*****");
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("taskforge/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
