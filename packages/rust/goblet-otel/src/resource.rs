//! Resource detection for Google Cloud Functions.
//!
//! | Attribute | Source |
//! |---|---|
//! | `cloud.provider` | always `gcp` |
//! | `cloud.platform` | always `gcp_cloud_functions` |
//! | `cloud.region` | `FUNCTION_REGION` |
//! | `faas.name` | `FUNCTION_NAME`, else `K_SERVICE`, else `FUNCTION_TARGET` |
//! | `faas.version` | `K_REVISION` |
//! | `service.name` | `OTEL_SERVICE_NAME`, else the function name |
//!
//! Pairs from `OTEL_RESOURCE_ATTRIBUTES` (`key=value,key2=value2`, values
//! URL-decoded) are added last and override the detected values.

use crate::constants::{env_vars, resource_attributes as attrs};
use goblet::GobletConfig;
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use std::env;
use urlencoding::decode;

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_resource_attributes(raw: &str) -> Vec<KeyValue> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(key, value)| {
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                return None;
            }
            decode(value)
                .ok()
                .map(|decoded| KeyValue::new(key.to_string(), decoded.into_owned()))
        })
        .collect()
}

/// Builds the resource describing the running function.
///
/// Called by [`init_telemetry`](crate::init_telemetry) unless
/// [`TelemetryConfig::resource`](crate::TelemetryConfig) is set.
pub fn get_gcp_resource() -> Resource {
    let mut attributes = vec![
        KeyValue::new(attrs::CLOUD_PROVIDER, attrs::PROVIDER_GCP),
        KeyValue::new(attrs::CLOUD_PLATFORM, attrs::PLATFORM_CLOUD_FUNCTIONS),
    ];

    if let Some(region) = non_empty_var(env_vars::FUNCTION_REGION) {
        attributes.push(KeyValue::new(attrs::CLOUD_REGION, region));
    }

    let function_name = GobletConfig::function_name_from_env();
    if let Some(name) = &function_name {
        attributes.push(KeyValue::new(attrs::FAAS_NAME, name.clone()));
    }

    if let Some(revision) = non_empty_var(env_vars::K_REVISION) {
        attributes.push(KeyValue::new(attrs::FAAS_VERSION, revision));
    }

    if let Some(service_name) = non_empty_var(env_vars::SERVICE_NAME).or(function_name) {
        attributes.push(KeyValue::new(attrs::SERVICE_NAME, service_name));
    }

    if let Some(raw) = non_empty_var(env_vars::RESOURCE_ATTRIBUTES) {
        attributes.extend(parse_resource_attributes(&raw));
    }

    Resource::builder().with_attributes(attributes).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Value;
    use serial_test::serial;

    fn attribute(resource: &Resource, key: &str) -> Option<Value> {
        resource
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v.clone())
    }

    fn string(value: &str) -> Option<Value> {
        Some(Value::String(value.to_string().into()))
    }

    fn cleanup_env() {
        for name in [
            env_vars::FUNCTION_REGION,
            env_vars::K_SERVICE,
            env_vars::K_REVISION,
            env_vars::FUNCTION_NAME,
            env_vars::FUNCTION_TARGET,
            env_vars::SERVICE_NAME,
            env_vars::RESOURCE_ATTRIBUTES,
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_gcp_resource_from_environment() {
        cleanup_env();
        env::set_var("FUNCTION_REGION", "europe-west1");
        env::set_var("K_SERVICE", "orders");
        env::set_var("K_REVISION", "orders-00007-abc");

        let resource = get_gcp_resource();
        assert_eq!(attribute(&resource, "cloud.provider"), string("gcp"));
        assert_eq!(
            attribute(&resource, "cloud.platform"),
            string("gcp_cloud_functions")
        );
        assert_eq!(attribute(&resource, "cloud.region"), string("europe-west1"));
        assert_eq!(attribute(&resource, "faas.name"), string("orders"));
        assert_eq!(attribute(&resource, "faas.version"), string("orders-00007-abc"));
        assert_eq!(attribute(&resource, "service.name"), string("orders"));

        cleanup_env();
    }

    #[test]
    #[serial]
    fn test_gcp_resource_function_name_matches_config() {
        cleanup_env();
        env::set_var(env_vars::FUNCTION_NAME, "orders");
        env::set_var(env_vars::K_SERVICE, "orders-service");

        let resource = get_gcp_resource();
        assert_eq!(attribute(&resource, "faas.name"), string("orders"));
        assert_eq!(attribute(&resource, "service.name"), string("orders"));
        assert_eq!(GobletConfig::from_env().function_name, "orders");

        cleanup_env();
    }

    #[test]
    #[serial]
    fn test_gcp_resource_service_name_override() {
        cleanup_env();
        env::set_var("FUNCTION_TARGET", "main");
        env::set_var("OTEL_SERVICE_NAME", "checkout");

        let resource = get_gcp_resource();
        assert_eq!(attribute(&resource, "faas.name"), string("main"));
        assert_eq!(attribute(&resource, "service.name"), string("checkout"));

        cleanup_env();
    }

    #[test]
    #[serial]
    fn test_gcp_resource_with_encoded_attributes() {
        cleanup_env();
        env::set_var(
            "OTEL_RESOURCE_ATTRIBUTES",
            "custom.attr=hello%20world,tag=value%3Dtest",
        );

        let resource = get_gcp_resource();
        assert_eq!(attribute(&resource, "custom.attr"), string("hello world"));
        assert_eq!(attribute(&resource, "tag"), string("value=test"));

        cleanup_env();
    }

    #[test]
    #[serial]
    fn test_gcp_resource_with_empty_environment() {
        cleanup_env();

        let resource = get_gcp_resource();
        assert_eq!(attribute(&resource, "cloud.provider"), string("gcp"));
        assert!(attribute(&resource, "cloud.region").is_none());
        assert!(attribute(&resource, "faas.name").is_none());
        assert!(attribute(&resource, "faas.version").is_none());

        cleanup_env();
    }
}
