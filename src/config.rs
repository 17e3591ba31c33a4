//! Runtime settings
//!
//! Settings come from an optional YAML file and are then overridden by the
//! process environment, which is how the function runtime configures the
//! custom resource.

use crate::error::{Error, Result};
use crate::http::{HttpClientConfig, RateLimiterConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// The only identity provider currently supported
pub const AUTH0_PROVIDER: &str = "auth0";

/// Automatic rotation schedule for managed m2m secrets
pub const ROTATION_DAYS: i64 = 30;

// ============================================================================
// Settings
// ============================================================================

/// Complete runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Deployment environment name (`ENVIRON`), used in secret paths
    pub environ: String,

    /// Identity provider selector (`PROVIDER`)
    pub provider: String,

    /// KMS key used to encrypt managed secrets (`KMS_KEY_ID`)
    pub kms_key_id: Option<String>,

    /// Rotation function ARN attached to managed secrets (`ROTATION`)
    pub rotation: Option<String>,

    /// Log level name (`LOGGING_LEVEL`)
    pub logging_level: String,

    /// Prefix of the management credential secrets (`MANAGEMENT_SECRET_PREFIX`)
    pub management_secret_prefix: String,

    /// Delay before inspecting stack events after a create (`POLL_INTERVAL_SECONDS`)
    pub poll_interval_seconds: u64,

    /// Number of stack event inspections after a create (`POLL_ATTEMPTS`)
    pub poll_attempts: u32,

    /// Delay between resource server list pages (`PAGE_DELAY_MS`)
    pub page_delay_ms: u64,

    /// Management API client tuning
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environ: String::new(),
            provider: AUTH0_PROVIDER.to_string(),
            kms_key_id: None,
            rotation: None,
            logging_level: "INFO".to_string(),
            management_secret_prefix: String::new(),
            poll_interval_seconds: 120,
            poll_attempts: 1,
            page_delay_ms: 1000,
            http: HttpSettings::default(),
        }
    }
}

/// Management API client tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Maximum number of retries on 429/5xx/timeouts
    pub max_retries: u32,

    /// Requests per second against the management API
    pub requests_per_second: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retries: 3,
            requests_per_second: 10,
        }
    }
}

impl HttpSettings {
    /// HTTP client configuration for a management API base URL
    pub fn client_config(&self, base_url: &str) -> HttpClientConfig {
        HttpClientConfig::builder()
            .base_url(base_url)
            .timeout(Duration::from_secs(self.timeout_seconds))
            .max_retries(self.max_retries)
            .rate_limit(RateLimiterConfig::per_second(self.requests_per_second))
            .build()
    }
}

impl Settings {
    /// Load settings from an optional YAML file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Override values from a variable lookup (the environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ENVIRON") {
            self.environ = value;
        }
        if let Some(value) = lookup("PROVIDER") {
            self.provider = value;
        }
        if let Some(value) = lookup("KMS_KEY_ID") {
            self.kms_key_id = Some(value);
        }
        if let Some(value) = lookup("ROTATION") {
            self.rotation = Some(value);
        }
        if let Some(value) = lookup("LOGGING_LEVEL") {
            self.logging_level = value;
        }
        if let Some(value) = lookup("MANAGEMENT_SECRET_PREFIX") {
            self.management_secret_prefix = value;
        }
        if let Some(value) = lookup("POLL_INTERVAL_SECONDS") {
            self.poll_interval_seconds = parse_number("POLL_INTERVAL_SECONDS", &value)?;
        }
        if let Some(value) = lookup("POLL_ATTEMPTS") {
            self.poll_attempts = parse_number("POLL_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("PAGE_DELAY_MS") {
            self.page_delay_ms = parse_number("PAGE_DELAY_MS", &value)?;
        }
        Ok(())
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> Result<()> {
        if !self.provider.eq_ignore_ascii_case(AUTH0_PROVIDER) {
            return Err(Error::config(format!(
                "unsupported identity provider '{}'",
                self.provider
            )));
        }
        Ok(())
    }

    /// `tracing` filter directive for the configured level
    pub fn log_directive(&self, verbose: bool) -> &'static str {
        if verbose {
            return "debug";
        }
        match self.logging_level.to_uppercase().as_str() {
            "DEBUG" => "debug",
            "WARNING" | "WARN" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
    }

    /// Delay between stack event inspections
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Delay between resource server list pages
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Secret holding the management API credentials for a tenant
    /// (`dev-acme.eu.auth0.com` resolves to `.../tenant/dev-acme`)
    pub fn management_secret_id(&self, tenant: &str) -> String {
        let tenant_name = tenant.split('.').next().unwrap_or(tenant);
        format!(
            "{}{}/{}/tenant/{tenant_name}",
            self.management_secret_prefix, self.environ, AUTH0_PROVIDER
        )
    }

    /// Parameter holding the client secret of a non-m2m application
    pub fn client_secret_parameter(&self, client_id: &str) -> String {
        format!("/{}/auth0/{client_id}/client_secret", self.environ)
    }

    /// Managed secret name for an m2m application
    pub fn m2m_secret_name(&self, normalized_name: &str) -> String {
        format!("/{}/auth0/{normalized_name}", self.environ)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key} must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.provider, "auth0");
        assert_eq!(settings.poll_interval_seconds, 120);
        assert_eq!(settings.poll_attempts, 1);
        assert_eq!(settings.page_delay(), Duration::from_secs(1));
        assert_eq!(settings.http.max_retries, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup_from(&[
                ("ENVIRON", "qa"),
                ("KMS_KEY_ID", "baz_key"),
                ("ROTATION", "arn:aws:qux"),
                ("POLL_INTERVAL_SECONDS", "5"),
                ("PAGE_DELAY_MS", "0"),
            ]))
            .unwrap();

        assert_eq!(settings.environ, "qa");
        assert_eq!(settings.kms_key_id.as_deref(), Some("baz_key"));
        assert_eq!(settings.rotation.as_deref(), Some("arn:aws:qux"));
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
        assert_eq!(settings.page_delay_ms, 0);
    }

    #[test]
    fn test_invalid_number_override() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(lookup_from(&[("POLL_ATTEMPTS", "often")]))
            .unwrap_err();
        assert!(err.to_string().contains("POLL_ATTEMPTS"));
    }

    #[test]
    fn test_yaml_then_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "environ: dev\nmanagement_secret_prefix: 'arn:aws:secretsmanager:us-east-1:123:secret:'\nhttp:\n  max_retries: 7"
        )
        .unwrap();

        let mut settings =
            Settings::from_yaml(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(settings.environ, "dev");
        assert_eq!(settings.http.max_retries, 7);
        assert_eq!(settings.http.timeout_seconds, 30);

        settings
            .apply_overrides(lookup_from(&[("ENVIRON", "prod")]))
            .unwrap();
        assert_eq!(settings.environ, "prod");
        assert_eq!(
            settings.management_secret_id("acme-prod.eu.auth0.com"),
            "arn:aws:secretsmanager:us-east-1:123:secret:prod/auth0/tenant/acme-prod"
        );
    }

    #[test]
    fn test_unsupported_provider() {
        let settings = Settings {
            provider: "okta".to_string(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_log_directive() {
        let mut settings = Settings::default();
        assert_eq!(settings.log_directive(false), "info");
        assert_eq!(settings.log_directive(true), "debug");

        settings.logging_level = "WARNING".to_string();
        assert_eq!(settings.log_directive(false), "warn");
        settings.logging_level = "critical".to_string();
        assert_eq!(settings.log_directive(false), "error");
        settings.logging_level = "chatty".to_string();
        assert_eq!(settings.log_directive(false), "info");
    }

    #[test]
    fn test_resource_paths() {
        let settings = Settings {
            environ: "qa".to_string(),
            ..Settings::default()
        };
        assert_eq!(
            settings.client_secret_parameter("foo"),
            "/qa/auth0/foo/client_secret"
        );
        assert_eq!(settings.m2m_secret_name("crunittest"), "/qa/auth0/crunittest");
    }
}
