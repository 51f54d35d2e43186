//! Function configuration.
//!
//! Values come from the builder or, with [`GobletConfig::from_env`], from the
//! environment variables the Cloud Functions host sets:
//!
//! - `FUNCTION_NAME`, `K_SERVICE`, `FUNCTION_TARGET`: function name (first one set wins)
//! - `FUNCTION_REGION`: deployment region
//! - `GOBLET_STACKDRIVER`: structured Cloud Logging output
//! - `PORT`: port to listen on

use crate::constants::{defaults, env_vars};
use bon::Builder;
use std::env;

/// Configuration of a deployed function.
///
/// ```rust
/// use goblet_core::GobletConfig;
///
/// let config = GobletConfig::builder()
///     .function_name("orders")
///     .region("europe-west1")
///     .stackdriver(true)
///     .build();
/// assert_eq!(config.port, 8080);
/// ```
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct GobletConfig {
    #[builder(into, default = defaults::FUNCTION_NAME.to_string())]
    pub function_name: String,

    #[builder(into, default = defaults::REGION.to_string())]
    pub region: String,

    /// Emit logs as Cloud Logging structured JSON.
    ///
    /// Default: `false`
    #[builder(default = false)]
    pub stackdriver: bool,

    #[builder(default = defaults::PORT)]
    pub port: u16,
}

impl Default for GobletConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GobletConfig {
    /// The deployed function name: the first non-empty of `FUNCTION_NAME`,
    /// `K_SERVICE` and `FUNCTION_TARGET`.
    pub fn function_name_from_env() -> Option<String> {
        [
            env_vars::FUNCTION_NAME,
            env_vars::K_SERVICE,
            env_vars::FUNCTION_TARGET,
        ]
        .into_iter()
        .find_map(|name| env::var(name).ok().filter(|value| !value.is_empty()))
    }

    /// Build the configuration from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let function_name =
            Self::function_name_from_env().unwrap_or_else(|| defaults::FUNCTION_NAME.to_string());

        let region = env::var(env_vars::FUNCTION_REGION)
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| defaults::REGION.to_string());

        let stackdriver = env::var(env_vars::STACKDRIVER)
            .map(|value| matches!(value.to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let port = match env::var(env_vars::PORT) {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %value, "invalid PORT, using default");
                defaults::PORT
            }),
            Err(_) => defaults::PORT,
        };

        Self {
            function_name,
            region,
            stackdriver,
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_env() {
        for name in [
            env_vars::FUNCTION_NAME,
            env_vars::K_SERVICE,
            env_vars::FUNCTION_TARGET,
            env_vars::FUNCTION_REGION,
            env_vars::STACKDRIVER,
            env_vars::PORT,
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn test_defaults() {
        let config = GobletConfig::default();
        assert_eq!(config.function_name, "goblet");
        assert_eq!(config.region, "us-east4");
        assert!(!config.stackdriver);
        assert_eq!(config.port, 8080);
    }

    #[test]
    #[serial]
    fn test_from_empty_env() {
        cleanup_env();
        assert_eq!(GobletConfig::from_env(), GobletConfig::default());
    }

    #[test]
    #[serial]
    fn test_function_name_precedence() {
        cleanup_env();
        env::set_var(env_vars::FUNCTION_TARGET, "entrypoint");
        assert_eq!(GobletConfig::function_name_from_env().as_deref(), Some("entrypoint"));

        env::set_var(env_vars::K_SERVICE, "orders-service");
        assert_eq!(GobletConfig::function_name_from_env().as_deref(), Some("orders-service"));

        env::set_var(env_vars::FUNCTION_NAME, "orders");
        assert_eq!(GobletConfig::function_name_from_env().as_deref(), Some("orders"));
        assert_eq!(GobletConfig::from_env().function_name, "orders");

        env::set_var(env_vars::FUNCTION_NAME, "");
        assert_eq!(GobletConfig::function_name_from_env().as_deref(), Some("orders-service"));

        cleanup_env();
    }

    #[test]
    #[serial]
    fn test_from_env() {
        cleanup_env();
        env::set_var(env_vars::K_SERVICE, "orders");
        env::set_var(env_vars::FUNCTION_TARGET, "entrypoint");
        env::set_var(env_vars::FUNCTION_REGION, "europe-west1");
        env::set_var(env_vars::STACKDRIVER, "TRUE");
        env::set_var(env_vars::PORT, "9090");

        let config = GobletConfig::from_env();
        assert_eq!(config.function_name, "orders");
        assert_eq!(config.region, "europe-west1");
        assert!(config.stackdriver);
        assert_eq!(config.port, 9090);

        cleanup_env();
    }

    #[test]
    #[serial]
    fn test_invalid_port_falls_back() {
        cleanup_env();
        env::set_var(env_vars::PORT, "not-a-port");
        assert_eq!(GobletConfig::from_env().port, 8080);
        cleanup_env();
    }
}
