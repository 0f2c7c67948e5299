//! Configuration types shared across crates.

use crate::tenant::TenantRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Deployment environment name, reported by `/v1/status`.
    #[serde(default = "default_service_env")]
    pub service_env: String,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Skip the advisory write-lock check before patch, delete and gtag updates.
    #[serde(default)]
    pub skip_write_lock_check_on_mutable_operations: bool,
    /// Default `enforce_key` flag for newly created subprojects.
    #[serde(default)]
    pub enforce_key: bool,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_service_env() -> String {
    "dev".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            service_env: default_service_env(),
            metrics_enabled: default_metrics_enabled(),
            skip_write_lock_check_on_mutable_operations: false,
            enforce_key: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bind.trim().is_empty() {
            return Err("server.bind cannot be empty".to_string());
        }
        if self.max_body_bytes == 0 {
            return Err("server.max_body_bytes must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Journal (metadata store) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JournalConfig {
    /// In-process store. Contents are lost on restart.
    Memory,
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

fn default_max_connections() -> u32 {
    5
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/journal.db"),
            max_connections: default_max_connections(),
        }
    }
}

impl JournalConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            JournalConfig::Memory => Ok(()),
            JournalConfig::Sqlite {
                max_connections, ..
            } => {
                if *max_connections == 0 {
                    Err("journal.max_connections must be greater than 0".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Signed URL settings for blob storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UrlSigningConfig {
    /// HMAC-style secret mixed into every signature.
    /// When unset, a random secret is generated per process.
    #[serde(default)]
    pub secret: Option<String>,
    /// Base URL that signed object URLs are rooted at.
    #[serde(default = "default_signed_url_base")]
    pub base_url: String,
    /// Lifetime of an issued URL in seconds.
    #[serde(default = "default_signed_url_expiry_secs")]
    pub expiry_secs: u64,
}

fn default_signed_url_base() -> String {
    "http://127.0.0.1:8080/blob".to_string()
}

fn default_signed_url_expiry_secs() -> u64 {
    3600
}

impl Default for UrlSigningConfig {
    fn default() -> Self {
        Self {
            secret: None,
            base_url: default_signed_url_base(),
            expiry_secs: default_signed_url_expiry_secs(),
        }
    }
}

impl UrlSigningConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }
}

/// Blob storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process storage.
    Memory {
        #[serde(default)]
        signing: UrlSigningConfig,
    },
    /// Local filesystem storage, one directory per bucket.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
        #[serde(default)]
        signing: UrlSigningConfig,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
            signing: UrlSigningConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn signing(&self) -> &UrlSigningConfig {
        match self {
            StorageConfig::Memory { signing } | StorageConfig::Filesystem { signing, .. } => {
                signing
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let signing = self.signing();
        if signing.expiry_secs == 0 {
            return Err("storage.signing.expiry_secs must be greater than 0".to_string());
        }
        if let Some(secret) = &signing.secret
            && secret.len() < 16
        {
            return Err("storage.signing.secret must be at least 16 characters".to_string());
        }
        Ok(())
    }
}

/// Distributed cache configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheConfig {
    /// In-process cache. Only coordinates a single instance.
    #[default]
    Memory,
    /// Shared Redis instance.
    Redis {
        /// Connection URL (e.g., "redis://127.0.0.1:6379/0").
        url: String,
    },
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            CacheConfig::Memory => Ok(()),
            CacheConfig::Redis { url } => {
                if url.starts_with("redis://") || url.starts_with("rediss://") {
                    Ok(())
                } else {
                    Err(format!("cache.url must be a redis:// or rediss:// url, got '{url}'"))
                }
            }
        }
    }
}

/// Locker timing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockerConfig {
    /// Lifetime of a write lock in seconds.
    #[serde(default = "default_write_lock_ttl_secs")]
    pub write_lock_ttl_secs: u64,
    /// Lifetime of a reader list in seconds, refreshed on every reader join.
    #[serde(default = "default_read_lock_ttl_secs")]
    pub read_lock_ttl_secs: u64,
    /// Lifetime of the per-key mutex in milliseconds.
    #[serde(default = "default_mutex_ttl_ms")]
    pub mutex_ttl_ms: u64,
    /// Attempts made to take the mutex before giving up.
    #[serde(default = "default_mutex_retry_count")]
    pub mutex_retry_count: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_mutex_retry_delay_ms")]
    pub mutex_retry_delay_ms: u64,
    /// Maximum random jitter added to each delay in milliseconds.
    #[serde(default = "default_mutex_retry_jitter_ms")]
    pub mutex_retry_jitter_ms: u64,
}

fn default_write_lock_ttl_secs() -> u64 {
    86400 // 24 hours
}

fn default_read_lock_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_mutex_ttl_ms() -> u64 {
    5000
}

fn default_mutex_retry_count() -> u32 {
    10
}

fn default_mutex_retry_delay_ms() -> u64 {
    200
}

fn default_mutex_retry_jitter_ms() -> u64 {
    200
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            write_lock_ttl_secs: default_write_lock_ttl_secs(),
            read_lock_ttl_secs: default_read_lock_ttl_secs(),
            mutex_ttl_ms: default_mutex_ttl_ms(),
            mutex_retry_count: default_mutex_retry_count(),
            mutex_retry_delay_ms: default_mutex_retry_delay_ms(),
            mutex_retry_jitter_ms: default_mutex_retry_jitter_ms(),
        }
    }
}

impl LockerConfig {
    pub fn write_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.write_lock_ttl_secs)
    }

    pub fn read_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.read_lock_ttl_secs)
    }

    pub fn mutex_ttl(&self) -> Duration {
        Duration::from_millis(self.mutex_ttl_ms)
    }

    pub fn mutex_retry_delay(&self) -> Duration {
        Duration::from_millis(self.mutex_retry_delay_ms)
    }

    pub fn mutex_retry_jitter(&self) -> Duration {
        Duration::from_millis(self.mutex_retry_jitter_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.write_lock_ttl_secs == 0 || self.read_lock_ttl_secs == 0 {
            return Err("locker lock ttls must be greater than 0".to_string());
        }
        if self.mutex_ttl_ms == 0 {
            return Err("locker.mutex_ttl_ms must be greater than 0".to_string());
        }
        if self.mutex_retry_count == 0 {
            return Err("locker.mutex_retry_count must be at least 1".to_string());
        }
        Ok(())
    }
}

/// A user that can authenticate with a bearer token.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserConfig {
    /// User identity (usually an email address).
    pub email: String,
    /// SHA256 hex of the bearer token.
    /// Generate with: `echo -n "your-secret-token" | sha256sum`
    pub token_hash: String,
}

/// A statically configured entitlement group.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group email (e.g., "data.sdms.tenant-a.sub-b.admin@contoso.com").
    pub email: String,
    /// Member user emails.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Authentication and authorization configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// When false, every request runs as an anonymous, fully authorized user.
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    /// Members returned per entitlement page.
    #[serde(default = "default_member_page_size")]
    pub member_page_size: usize,
}

fn default_auth_enabled() -> bool {
    true
}

fn default_member_page_size() -> usize {
    100
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            users: Vec::new(),
            groups: Vec::new(),
            member_page_size: default_member_page_size(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.member_page_size == 0 {
            return Err("auth.member_page_size must be greater than 0".to_string());
        }
        for user in &self.users {
            if user.token_hash.len() != 64
                || !user.token_hash.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(format!(
                    "auth.users[{}].token_hash must be 64 hex characters (SHA256)",
                    user.email
                ));
            }
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub locker: LockerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Tenants registered at startup if missing.
    #[serde(default)]
    pub tenants: Vec<TenantRecord>,
}

impl AppConfig {
    /// Create a test configuration with in-memory backends.
    ///
    /// **For testing only.** Authorization is disabled.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            journal: JournalConfig::Memory,
            storage: StorageConfig::Memory {
                signing: UrlSigningConfig {
                    secret: Some("test-signing-secret".to_string()),
                    ..UrlSigningConfig::default()
                },
            },
            cache: CacheConfig::Memory,
            locker: LockerConfig::default(),
            auth: AuthConfig {
                enabled: false,
                ..AuthConfig::default()
            },
            tenants: Vec::new(),
        }
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.journal.validate()?;
        self.storage.validate()?;
        self.cache.validate()?;
        self.locker.validate()?;
        self.auth.validate()?;
        for tenant in &self.tenants {
            tenant.validate().map_err(|e| format!("tenants: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults_lock_check_enabled() {
        let config = ServerConfig::default();
        assert!(
            !config.skip_write_lock_check_on_mutable_operations,
            "advisory write-lock check should run unless explicitly skipped"
        );
    }

    #[test]
    fn test_locker_config_defaults() {
        let config = LockerConfig::default();
        assert_eq!(config.write_lock_ttl(), Duration::from_secs(24 * 3600));
        assert_eq!(config.read_lock_ttl(), Duration::from_secs(3600));
        assert_eq!(config.mutex_ttl(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_locker_config_rejects_zero_retries() {
        let config = LockerConfig {
            mutex_retry_count: 0,
            ..LockerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_config_redis_requires_scheme() {
        let json = r#"{"type":"redis","url":"localhost:6379"}"#;
        let config: CacheConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());

        let json = r#"{"type":"redis","url":"redis://localhost:6379/0"}"#;
        let config: CacheConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_config_signing_defaults() {
        let json = r#"{"type":"filesystem","path":"/tmp/blobs"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        assert!(config.signing().secret.is_none());
        assert_eq!(config.signing().expiry_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_config_rejects_short_secret() {
        let config = StorageConfig::Memory {
            signing: UrlSigningConfig {
                secret: Some("short".to_string()),
                ..UrlSigningConfig::default()
            },
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_config_rejects_bad_token_hash() {
        let config = AuthConfig {
            users: vec![UserConfig {
                email: "a@b.c".to_string(),
                token_hash: "not-a-hash".to_string(),
            }],
            ..AuthConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_config_deserialize_empty() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert!(config.auth.enabled);
        assert!(matches!(config.cache, CacheConfig::Memory));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_for_testing_is_valid() {
        let config = AppConfig::for_testing();
        assert!(!config.auth.enabled);
        assert!(config.validate().is_ok());
    }
}
