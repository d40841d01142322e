use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::transfer::{OrchestratorConfig, WorkerConfig};

/// Overrides `auth.jwt_secret` when set
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// PostgreSQL ledger + journal. In-memory backend when absent.
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// Accounts opened at startup (registration is external)
    #[serde(default)]
    pub seed_accounts: Vec<SeedAccount>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum fractional digits in an amount
    pub max_scale: u32,
    pub credit_timeout_ms: u64,
    pub refund_attempts: u32,
    pub refund_backoff_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_scale: 2,
            credit_timeout_ms: 5_000,
            refund_attempts: 3,
            refund_backoff_ms: 200,
        }
    }
}

impl TransferConfig {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_scale: self.max_scale,
            credit_timeout: Duration::from_millis(self.credit_timeout_ms),
            refund_attempts: self.refund_attempts,
            refund_backoff: Duration::from_millis(self.refund_backoff_ms),
        }
    }

    /// Longest a live request can hold a record in a non-terminal state
    fn max_in_flight(&self) -> Duration {
        Duration::from_millis(
            self.credit_timeout_ms + self.refund_attempts as u64 * self.refund_backoff_ms,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub batch_size: usize,
    pub alert_after_retries: i32,
    /// In-memory backend only: settled transfers and their ledger op keys
    /// are dropped after this long. A cid can be reused once pruned.
    pub retain_settled_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 30,
            stale_threshold_secs: 60,
            batch_size: 100,
            alert_after_retries: 10,
            retain_settled_secs: 86_400,
        }
    }
}

impl RecoveryConfig {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            stale_threshold: Duration::from_secs(self.stale_threshold_secs),
            batch_size: self.batch_size,
            alert_after_retries: self.alert_after_retries,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SeedAccount {
    pub id: String,
    pub name: String,
    pub balance: rust_decimal::Decimal,
}

impl AppConfig {
    /// Load `config/{env}.yaml`, apply env overrides, validate
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;

        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            config.auth.jwt_secret = secret;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config yaml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            bail!("auth.jwt_secret is empty (set it or {})", JWT_SECRET_ENV);
        }
        if self.transfer.refund_attempts == 0 {
            bail!("transfer.refund_attempts must be at least 1");
        }
        if self.transfer.max_scale > crate::money::MAX_DECIMAL_SCALE {
            bail!(
                "transfer.max_scale must be at most {}",
                crate::money::MAX_DECIMAL_SCALE
            );
        }
        // The worker must never pick up a record a live request still owns
        let stale = Duration::from_secs(self.recovery.stale_threshold_secs);
        if self.recovery.enabled && stale <= self.transfer.max_in_flight() {
            bail!(
                "recovery.stale_threshold_secs ({}s) must exceed credit timeout plus refund backoff ({}ms)",
                self.recovery.stale_threshold_secs,
                self.transfer.max_in_flight().as_millis()
            );
        }
        for seed in &self.seed_accounts {
            if seed.id.trim().is_empty() || seed.balance.is_sign_negative() {
                bail!("invalid seed account {:?}", seed.id);
            }
        }
        Ok(())
    }
}
