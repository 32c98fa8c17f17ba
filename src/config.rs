//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Rate limit: requests per minute per API key
    pub rate_limit_per_minute: i32,

    /// Timeout for outbound provider calls, in seconds
    pub http_timeout_secs: u64,

    /// Auth provider base URL (GoTrue-compatible admin API)
    pub auth_provider_url: String,

    /// Service-role key for the auth provider admin API
    pub auth_provider_service_key: String,

    /// Payment provider base URL
    pub payment_api_url: String,

    /// Payment provider secret key; `None` disables the integration
    pub payment_api_key: Option<String>,

    /// SMTP relay; `None` means emails are logged instead of sent
    pub smtp: Option<SmtpConfig>,

    /// Sender mailbox for transactional emails
    pub email_from: String,

    /// Login URL included in welcome emails
    pub app_login_url: String,

    /// Routing number stamped on every new account
    pub bank_routing_number: String,

    /// Six-digit issuer prefix for generated card numbers
    pub card_bin: String,

    /// Card validity in years from issuance
    pub card_validity_years: u32,

    /// Interval between maintenance job runs, in seconds
    pub job_interval_secs: u64,
}

/// SMTP relay settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };
        let or_default =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let database_url = required("DATABASE_URL")?;
        let database_max_connections =
            parse_var(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let host = or_default("HOST", "127.0.0.1");
        let port = parse_var(&lookup, "PORT", 3000)?;
        let environment = or_default("ENVIRONMENT", "development");
        let rate_limit_per_minute = parse_var(&lookup, "RATE_LIMIT_PER_MINUTE", 100)?;
        let http_timeout_secs = parse_var(&lookup, "HTTP_TIMEOUT_SECS", 10)?;

        let auth_provider_url = required("AUTH_PROVIDER_URL")?;
        let auth_provider_service_key = required("AUTH_PROVIDER_SERVICE_KEY")?;

        let payment_api_url = or_default("PAYMENT_API_URL", "https://api.stripe.com");
        let payment_api_key = lookup("PAYMENT_API_KEY").filter(|v| !v.is_empty());

        let smtp = match lookup("SMTP_HOST").filter(|v| !v.is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_var(&lookup, "SMTP_PORT", 587)?,
                username: lookup("SMTP_USERNAME").filter(|v| !v.is_empty()),
                password: lookup("SMTP_PASSWORD").filter(|v| !v.is_empty()),
            }),
            None => None,
        };

        let email_from = or_default("EMAIL_FROM", "Digital Bank <no-reply@bank.local>");
        let app_login_url = or_default("APP_LOGIN_URL", "http://localhost:5173/login");
        let bank_routing_number = or_default("BANK_ROUTING_NUMBER", "021000021");

        let card_bin = or_default("CARD_BIN", "400000");
        if card_bin.len() != 6 || !card_bin.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue("CARD_BIN"));
        }

        let card_validity_years = parse_var(&lookup, "CARD_VALIDITY_YEARS", 4)?;
        if card_validity_years == 0 {
            return Err(ConfigError::InvalidValue("CARD_VALIDITY_YEARS"));
        }

        let job_interval_secs = parse_var(&lookup, "JOB_INTERVAL_SECS", 60)?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            rate_limit_per_minute,
            http_timeout_secs,
            auth_provider_url,
            auth_provider_service_key,
            payment_api_url,
            payment_api_key,
            smtp,
            email_from,
            app_login_url,
            bank_routing_number,
            card_bin,
            card_validity_years,
            job_interval_secs,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/bank"),
            ("AUTH_PROVIDER_URL", "https://auth.example.test"),
            ("AUTH_PROVIDER_SERVICE_KEY", "service-key"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_vars()).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.rate_limit_per_minute, 100);
        assert_eq!(config.card_bin, "400000");
        assert_eq!(config.card_validity_years, 4);
        assert!(config.smtp.is_none());
        assert!(config.payment_api_key.is_none());
        assert!(!config.is_production());
    }

    #[test]
    fn test_missing_auth_provider_rejected() {
        let mut vars = base_vars();
        vars.remove("AUTH_PROVIDER_SERVICE_KEY");

        assert!(matches!(
            load(&vars),
            Err(ConfigError::MissingEnv("AUTH_PROVIDER_SERVICE_KEY"))
        ));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut vars = base_vars();
        vars.insert("PORT", "not-a-port");

        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue("PORT"))));
    }

    #[test]
    fn test_invalid_card_bin_rejected() {
        let mut vars = base_vars();
        vars.insert("CARD_BIN", "40AB00");

        assert!(matches!(load(&vars), Err(ConfigError::InvalidValue("CARD_BIN"))));
    }

    #[test]
    fn test_smtp_section() {
        let mut vars = base_vars();
        vars.insert("SMTP_HOST", "smtp.example.test");
        vars.insert("SMTP_PORT", "2525");
        vars.insert("SMTP_USERNAME", "mailer");

        let smtp = load(&vars).unwrap().smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.test");
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.username.as_deref(), Some("mailer"));
        assert!(smtp.password.is_none());
    }
}
