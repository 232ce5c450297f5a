use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub keychain: KeychainConfig,
    pub uploads: UploadConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub max_request_size_bytes: usize,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeychainConfig {
    /// Directory (relative to the key storage root) holding the private keys
    pub path: String,
    /// Only files ending with this suffix are loaded
    pub file_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub storage_root: String,
    pub destination_dir: String,
    pub max_upload_bytes: usize,
    pub chunk_size: usize,
    pub aes_key_bits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub access_token_minutes: i64,
    pub refresh_token_hours: i64,
    pub bcrypt_cost: u32,
    pub totp_issuer: String,
    pub totp_leeway_steps: u8,
    pub backup_code_count: usize,
    pub backup_code_length: usize,
    pub password_policy: PasswordPolicy,
}

/// Strength rules applied at registration time only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_symbol: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_symbol: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Ok(v) = env::var("API_PORT").or_else(|_| env::var("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_ENABLE_CORS") {
            self.api.enable_cors = v.parse().unwrap_or(self.api.enable_cors);
        }
        if let Ok(v) = env::var("API_CORS_ORIGINS") {
            self.api.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Keychain overrides
        if let Ok(v) = env::var("KEYCHAIN_PATH") {
            self.keychain.path = v;
        }
        if let Ok(v) = env::var("KEYCHAIN_FILE_SUFFIX") {
            self.keychain.file_suffix = v;
        }

        // Upload overrides
        if let Ok(v) = env::var("UPLOADS_STORAGE_ROOT") {
            self.uploads.storage_root = v;
        }
        if let Ok(v) = env::var("UPLOADS_DESTINATION_DIR") {
            self.uploads.destination_dir = v;
        }
        if let Ok(v) = env::var("UPLOADS_MAX_BYTES") {
            self.uploads.max_upload_bytes = v.parse().unwrap_or(self.uploads.max_upload_bytes);
        }
        if let Ok(v) = env::var("UPLOADS_CHUNK_SIZE") {
            self.uploads.chunk_size = v.parse().unwrap_or(self.uploads.chunk_size);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_ACCESS_TOKEN_MINUTES") {
            self.security.access_token_minutes = v.parse().unwrap_or(self.security.access_token_minutes);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_TOKEN_HOURS") {
            self.security.refresh_token_hours = v.parse().unwrap_or(self.security.refresh_token_hours);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_TOTP_ISSUER") {
            self.security.totp_issuer = v;
        }
        if let Ok(v) = env::var("SECURITY_TOTP_LEEWAY_STEPS") {
            self.security.totp_leeway_steps = v.parse().unwrap_or(self.security.totp_leeway_steps);
        }
        if let Ok(v) = env::var("SECURITY_PASSWORD_MIN_LENGTH") {
            self.security.password_policy.min_length =
                v.parse().unwrap_or(self.security.password_policy.min_length);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                port: 8000,
                max_request_size_bytes: 25 * 1024 * 1024, // 25MB
                enable_cors: true,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            keychain: KeychainConfig {
                path: "keys".to_string(),
                file_suffix: ".pem".to_string(),
            },
            uploads: UploadConfig {
                storage_root: "./var".to_string(),
                destination_dir: "documents".to_string(),
                max_upload_bytes: 20 * 1024 * 1024,
                chunk_size: 512,
                aes_key_bits: 256,
            },
            security: SecurityConfig {
                access_token_minutes: 60 * 24,
                refresh_token_hours: 24 * 7,
                bcrypt_cost: 12,
                totp_issuer: "Casework (dev)".to_string(),
                totp_leeway_steps: 1,
                backup_code_count: 10,
                backup_code_length: 8,
                password_policy: PasswordPolicy::default(),
            },
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.api.cors_origins = vec!["https://staging.example.com".to_string()];
        config.database.max_connections = 20;
        config.database.connection_timeout = 10;
        config.security.access_token_minutes = 60;
        config.security.refresh_token_hours = 24;
        config.security.totp_issuer = "Casework (staging)".to_string();
        config
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                port: 8000,
                max_request_size_bytes: 25 * 1024 * 1024,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            keychain: KeychainConfig {
                path: "keys".to_string(),
                file_suffix: ".pem".to_string(),
            },
            uploads: UploadConfig {
                storage_root: "/var/lib/casework".to_string(),
                destination_dir: "documents".to_string(),
                max_upload_bytes: 20 * 1024 * 1024,
                chunk_size: 512,
                aes_key_bits: 256,
            },
            security: SecurityConfig {
                access_token_minutes: 15,
                refresh_token_hours: 24,
                bcrypt_cost: 12,
                totp_issuer: "Casework".to_string(),
                totp_leeway_steps: 0,
                backup_code_count: 10,
                backup_code_length: 8,
                password_policy: PasswordPolicy {
                    min_length: 12,
                    require_symbol: true,
                    ..PasswordPolicy::default()
                },
            },
        }
    }

    /// Cheap settings for tests: low bcrypt cost, small uploads
    pub fn testing() -> Self {
        let mut config = Self::development();
        config.security.bcrypt_cost = 4;
        config.security.totp_issuer = "Casework".to_string();
        config.uploads.max_upload_bytes = 64 * 1024;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.security.bcrypt_cost, 12);
        assert_eq!(config.uploads.chunk_size, 512);
        assert_eq!(config.uploads.aes_key_bits, 256);
        assert_eq!(config.keychain.file_suffix, ".pem");
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.security.totp_leeway_steps, 0);
        assert!(config.security.password_policy.require_symbol);
        assert!(config.security.access_token_minutes < AppConfig::development().security.access_token_minutes);
    }

    #[test]
    fn test_staging_inherits_development_limits() {
        let config = AppConfig::staging();
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.uploads.max_upload_bytes, AppConfig::development().uploads.max_upload_bytes);
    }
}
