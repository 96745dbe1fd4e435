//! Runtime configuration.
//!
//! Sources, later ones winning:
//! 1. serde defaults
//! 2. `billdesk.toml` in the working directory (optional)
//! 3. `BILLDESK__*` environment variables, after loading `.env` if present
//!
//! e.g. `BILLDESK__BIND_ADDR=127.0.0.1:3000`, `BILLDESK__LOG_FORMAT=pretty`.

use chrono::{Days, NaiveDate};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use billdesk_observability::LogFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Days after today suggested as the due date of a new invoice.
    #[serde(default = "default_due_days")]
    pub default_due_days: u32,
    #[serde(default = "default_checkout_base_url")]
    pub checkout_base_url: String,
    #[serde(default = "default_document_base_url")]
    pub document_base_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_due_days() -> u32 {
    30
}

fn default_checkout_base_url() -> String {
    "https://checkout.example.com/pay".to_string()
}

fn default_document_base_url() -> String {
    "https://files.example.com/invoices".to_string()
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            log_format: LogFormat::default(),
            default_due_days: default_due_days(),
            checkout_base_url: default_checkout_base_url(),
            document_base_url: default_document_base_url(),
        }
    }
}

impl BillingConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("billdesk").required(false))
            .add_source(Environment::with_prefix("BILLDESK").separator("__"))
            .build()?;

        config.try_deserialize::<Self>()?.validated()
    }

    /// Parse a TOML document on top of the defaults (no environment lookup).
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        config.try_deserialize::<Self>()?.validated()
    }

    pub fn suggested_due_date(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_add_days(Days::new(self.default_due_days.into()))
            .unwrap_or(NaiveDate::MAX)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_addr must not be empty".to_string()));
        }
        for (name, url) in [
            ("checkout_base_url", &self.checkout_base_url),
            ("document_base_url", &self.document_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!("{name} must be an http(s) URL")));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = BillingConfig::from_toml("").unwrap();
        assert_eq!(config, BillingConfig::default());
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_due_days, 30);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = BillingConfig::from_toml(
            r#"
            bind_addr = "127.0.0.1:3000"
            log_format = "pretty"
            default_due_days = 14
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.default_due_days, 14);
        assert_eq!(config.checkout_base_url, "https://checkout.example.com/pay");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(BillingConfig::from_toml("log_format = \"xml\"").is_err());
        assert!(matches!(
            BillingConfig::from_toml("document_base_url = \"files/invoices\""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn suggests_due_date_from_today() {
        let config = BillingConfig::default();
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(config.suggested_due_date(today), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }
}
