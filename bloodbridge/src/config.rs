//! Core configuration.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides: variables prefixed with `BLOODBRIDGE_` override YAML values,
//! with double underscores for nesting (`BLOODBRIDGE_PASSWORD__MIN_LENGTH=10`
//! sets `password.min_length`). All fields have defaults, so an empty file is
//! a valid configuration.
//!
//! The 56-day donation cooldown is deliberately *not* configurable: it is a
//! domain constant owned by [`crate::eligibility`].

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the trust core.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Issuer name embedded in TOTP provisioning URIs and mail templates.
    pub issuer: String,
    /// Base URL used to build password-reset links (e.g. "https://bloodbridge.example.com").
    pub base_url: String,
    pub password: PasswordConfig,
    pub reset: ResetConfig,
    pub totp: TotpConfig,
    pub challenge: ChallengeConfig,
    pub email: EmailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            issuer: "BloodBridge".to_string(),
            base_url: "http://localhost:3000".to_string(),
            password: PasswordConfig::default(),
            reset: ResetConfig::default(),
            totp: TotpConfig::default(),
            challenge: ChallengeConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file merged with `BLOODBRIDGE_`-prefixed
    /// environment variables (environment wins).
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("BLOODBRIDGE_").split("__"))
            .extract()
    }
}

/// Password policy and Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum credential length; the strength policy also requires an
    /// uppercase letter, a lowercase letter, a digit and a special character.
    pub min_length: usize,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

impl Default for PasswordConfig {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            min_length: 8,
            argon2_memory_kib: 19456, // 19 MB
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl PasswordConfig {
    pub fn argon2_params(&self) -> crate::auth::password::Argon2Params {
        crate::auth::password::Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

/// Reset-token lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetConfig {
    /// How long an issued token stays valid.
    #[serde(with = "humantime_serde")]
    pub token_validity: Duration,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            token_validity: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// TOTP parameters. Defaults match standard authenticator apps.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TotpConfig {
    pub digits: u32,
    #[serde(with = "humantime_serde")]
    pub step: Duration,
    /// Accepted drift in steps on either side of the current one.
    pub skew: i64,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            digits: 6,
            step: Duration::from_secs(30),
            skew: 1,
        }
    }
}

/// Second-factor login challenge settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChallengeConfig {
    /// How long a login may sit between the password factor and the code.
    #[serde(with = "humantime_serde")]
    pub validity: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            validity: Duration::from_secs(5 * 60),
        }
    }
}

/// Outbound mail settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    pub transport: EmailTransportConfig,
    pub from_email: String,
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::File {
                path: "./emails".to_string(),
            },
            from_email: "no-reply@bloodbridge.example.com".to_string(),
            from_name: "BloodBridge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    /// Writes messages to a directory instead of sending them. For
    /// development and tests.
    File { path: String },
}
