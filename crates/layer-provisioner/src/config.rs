//! Provisioner configuration, read once at start.
//!
//! Required values come from `BUILD_PROJECT_NAME`, `ARTIFACT_BUCKET`,
//! `CONFIG_PARAMETER_NAME` and `ENVIRONMENT_NAME`. Timing and packaging
//! knobs are optional and default to the values the pipeline has always
//! used (5s polls, 3 fetch attempts 2s apart).

use std::time::Duration;

use crate::domain::{ProvisionError, ResourceProperties, Result};
use crate::packager::ArchiveFormat;
use crate::polling::{PollPolicy, RetryPolicy};

/// Suffix of the published layer name, after the environment name.
pub const LAYER_SUFFIX: &str = "swetest-layer";

pub const DEFAULT_SOURCE_KEY: &str = "swetest-layer/source.zip";
pub const DEFAULT_OUTPUT_PREFIX: &str = "build/";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_MAX_POLL_ERRORS: u32 = 3;
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
pub const DEFAULT_FETCH_BACKOFF_SECS: u64 = 2;
/// Fourteen minutes, leaving headroom under a fifteen minute host limit.
pub const DEFAULT_INVOCATION_BUDGET_SECS: u64 = 840;
/// Upper bound for every configured duration: one day.
pub const MAX_DURATION_SECS: u64 = 86_400;
pub const DEFAULT_RUNTIMES: &str = "nodejs18.x,nodejs20.x";
pub const DEFAULT_ARCHITECTURES: &str = "x86_64";

/// Provisioner configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerConfig {
    /// Pre-existing build project to run
    pub build_project_name: String,
    /// Bucket holding build sources and outputs
    pub artifact_bucket: String,
    /// Configuration record that receives the layer version ARN
    pub config_parameter_name: String,
    /// Deployment name, namespaces the layer
    pub environment_name: String,
    /// Key the build project reads its source archive from
    pub source_key: String,
    /// Prefix the build project writes its outputs under
    pub output_prefix: String,
    pub poll_interval: Duration,
    pub max_poll_errors: u32,
    pub fetch_attempts: u32,
    pub fetch_backoff: Duration,
    /// Wall-clock budget for one invocation
    pub invocation_budget: Duration,
    pub archive_format: ArchiveFormat,
    pub compatible_runtimes: Vec<String>,
    pub compatible_architectures: Vec<String>,
}

impl ProvisionerConfig {
    /// Config with the required values and every default.
    pub fn new(
        build_project_name: &str,
        artifact_bucket: &str,
        config_parameter_name: &str,
        environment_name: &str,
    ) -> Self {
        ProvisionerConfig {
            build_project_name: build_project_name.to_string(),
            artifact_bucket: artifact_bucket.to_string(),
            config_parameter_name: config_parameter_name.to_string(),
            environment_name: environment_name.to_string(),
            source_key: DEFAULT_SOURCE_KEY.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_poll_errors: DEFAULT_MAX_POLL_ERRORS,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            fetch_backoff: Duration::from_secs(DEFAULT_FETCH_BACKOFF_SECS),
            invocation_budget: Duration::from_secs(DEFAULT_INVOCATION_BUDGET_SECS),
            archive_format: ArchiveFormat::Zip,
            compatible_runtimes: split_list(DEFAULT_RUNTIMES),
            compatible_architectures: split_list(DEFAULT_ARCHITECTURES),
        }
    }

    /// Create a new config from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Environment variables, with non-empty event properties taking precedence.
    pub fn from_env_and_properties(properties: &ResourceProperties) -> Result<Self> {
        Self::from_lookup_and_properties(|key| std::env::var(key).ok(), properties)
    }

    /// `lookup` values, with non-empty event properties taking precedence per field.
    pub fn from_lookup_and_properties<F>(lookup: F, properties: &ResourceProperties) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup(|key| {
            property_for(properties, key)
                .map(str::to_string)
                .or_else(|| lookup(key))
        })
    }

    /// Create a config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            value(key).ok_or_else(|| {
                ProvisionError::Config(format!("environment variable {key} is not set"))
            })
        };

        let mut config = ProvisionerConfig::new(
            &required("BUILD_PROJECT_NAME")?,
            &required("ARTIFACT_BUCKET")?,
            &required("CONFIG_PARAMETER_NAME")?,
            &required("ENVIRONMENT_NAME")?,
        );

        if let Some(key) = value("SOURCE_KEY") {
            config.source_key = key;
        }
        if let Some(prefix) = value("OUTPUT_PREFIX") {
            config.output_prefix = prefix;
        }
        if let Some(secs) = value("POLL_INTERVAL_SECS") {
            config.poll_interval = parse_secs("POLL_INTERVAL_SECS", &secs, 1)?;
        }
        if let Some(count) = value("MAX_POLL_ERRORS") {
            config.max_poll_errors = parse_number("MAX_POLL_ERRORS", &count)?;
        }
        if let Some(count) = value("FETCH_ATTEMPTS") {
            config.fetch_attempts = parse_number("FETCH_ATTEMPTS", &count)?;
        }
        if let Some(secs) = value("FETCH_BACKOFF_SECS") {
            config.fetch_backoff = parse_secs("FETCH_BACKOFF_SECS", &secs, 0)?;
        }
        if let Some(secs) = value("INVOCATION_BUDGET_SECS") {
            config.invocation_budget = parse_secs("INVOCATION_BUDGET_SECS", &secs, 1)?;
        }
        if let Some(format) = value("ARCHIVE_FORMAT") {
            config.archive_format = format.parse()?;
        }
        if let Some(runtimes) = value("COMPATIBLE_RUNTIMES") {
            config.compatible_runtimes = split_list(&runtimes);
        }
        if let Some(architectures) = value("COMPATIBLE_ARCHITECTURES") {
            config.compatible_architectures = split_list(&architectures);
        }

        Ok(config)
    }

    /// Apply the non-empty fields of an event's resource properties.
    pub fn with_overrides(mut self, properties: &ResourceProperties) -> Self {
        let pick = |candidate: &Option<String>| candidate.clone().filter(|v| !v.trim().is_empty());
        if let Some(project) = pick(&properties.build_project_name) {
            self.build_project_name = project;
        }
        if let Some(bucket) = pick(&properties.artifact_bucket) {
            self.artifact_bucket = bucket;
        }
        if let Some(name) = pick(&properties.config_parameter_name) {
            self.config_parameter_name = name;
        }
        if let Some(environment) = pick(&properties.environment_name) {
            self.environment_name = environment;
        }
        self
    }

    /// Registry name of the layer, e.g. `dev-swetest-layer`.
    pub fn layer_name(&self) -> String {
        format!("{}-{}", self.environment_name, LAYER_SUFFIX)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            max_consecutive_errors: self.max_poll_errors,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.fetch_attempts,
            backoff: self.fetch_backoff,
        }
    }
}

/// Resource property standing in for environment variable `key`, if any.
fn property_for<'a>(properties: &'a ResourceProperties, key: &str) -> Option<&'a str> {
    let value = match key {
        "BUILD_PROJECT_NAME" => &properties.build_project_name,
        "ARTIFACT_BUCKET" => &properties.artifact_bucket,
        "CONFIG_PARAMETER_NAME" => &properties.config_parameter_name,
        "ENVIRONMENT_NAME" => &properties.environment_name,
        _ => return None,
    };
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| ProvisionError::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

/// Whole seconds within `min..=MAX_DURATION_SECS`.
fn parse_secs(key: &str, raw: &str, min: u64) -> Result<Duration> {
    let secs: u64 = parse_number(key, raw)?;
    if !(min..=MAX_DURATION_SECS).contains(&secs) {
        return Err(ProvisionError::Config(format!(
            "{key} must be between {min} and {MAX_DURATION_SECS} seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("BUILD_PROJECT_NAME", "p"),
        ("ARTIFACT_BUCKET", "b"),
        ("CONFIG_PARAMETER_NAME", "/ns/layer-arn"),
        ("ENVIRONMENT_NAME", "dev"),
    ];

    #[test]
    fn test_defaults_keep_legacy_timings() {
        let config = ProvisionerConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.fetch_attempts, 3);
        assert_eq!(config.fetch_backoff, Duration::from_secs(2));
        assert_eq!(config.archive_format, ArchiveFormat::Zip);
        assert_eq!(config.compatible_runtimes, vec!["nodejs18.x", "nodejs20.x"]);
        assert_eq!(config.layer_name(), "dev-swetest-layer");
    }

    #[test]
    fn test_missing_required_variable_is_named() {
        let err = ProvisionerConfig::from_lookup(lookup(&REQUIRED[..3])).unwrap_err();
        assert!(err.to_string().contains("ENVIRONMENT_NAME"));
    }

    #[test]
    fn test_blank_required_variable_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars[0] = ("BUILD_PROJECT_NAME", "   ");
        let err = ProvisionerConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("BUILD_PROJECT_NAME"));
    }

    #[test]
    fn test_tuning_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("POLL_INTERVAL_SECS", "10"),
            ("FETCH_ATTEMPTS", "5"),
            ("ARCHIVE_FORMAT", "tar-gz"),
            ("COMPATIBLE_ARCHITECTURES", "x86_64, arm64"),
        ]);
        let config = ProvisionerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.retry_policy().attempts, 5);
        assert_eq!(config.archive_format, ArchiveFormat::TarGz);
        assert_eq!(config.compatible_architectures, vec!["x86_64", "arm64"]);
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("FETCH_BACKOFF_SECS", "two"));
        let err = ProvisionerConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(ref msg) if msg.contains("FETCH_BACKOFF_SECS")));
    }

    #[test]
    fn test_resource_properties_override_present_fields_only() {
        let config = ProvisionerConfig::new("p", "b", "/ns/layer-arn", "dev").with_overrides(
            &ResourceProperties {
                environment_name: Some("prod".to_string()),
                artifact_bucket: Some(String::new()),
                ..ResourceProperties::default()
            },
        );
        assert_eq!(config.environment_name, "prod");
        assert_eq!(config.artifact_bucket, "b");
        assert_eq!(config.layer_name(), "prod-swetest-layer");
    }

    #[test]
    fn test_properties_fill_in_for_missing_variables() {
        let properties = ResourceProperties {
            build_project_name: Some("p".to_string()),
            artifact_bucket: Some("b".to_string()),
            config_parameter_name: Some("/ns/layer-arn".to_string()),
            environment_name: Some("dev".to_string()),
        };
        let config = ProvisionerConfig::from_lookup(|key| {
            property_for(&properties, key).map(str::to_string)
        })
        .unwrap();
        assert_eq!(config.build_project_name, "p");
        assert_eq!(config.config_parameter_name, "/ns/layer-arn");
        assert_eq!(property_for(&properties, "SOURCE_KEY"), None);
    }

    #[test]
    fn test_durations_outside_range_are_rejected() {
        for (key, raw) in [
            ("INVOCATION_BUDGET_SECS", "18446744073709551615"),
            ("INVOCATION_BUDGET_SECS", "0"),
            ("POLL_INTERVAL_SECS", "0"),
            ("FETCH_BACKOFF_SECS", "86401"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, raw));
            let err = ProvisionerConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(
                matches!(err, ProvisionError::Config(ref msg) if msg.contains(key)),
                "{key}={raw} accepted"
            );
        }
    }

    #[test]
    fn test_duration_bounds_are_inclusive() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("INVOCATION_BUDGET_SECS", "86400"),
            ("POLL_INTERVAL_SECS", "1"),
            ("FETCH_BACKOFF_SECS", "0"),
        ]);
        let config = ProvisionerConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.invocation_budget, Duration::from_secs(MAX_DURATION_SECS));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.fetch_backoff, Duration::ZERO);
    }

    #[test]
    fn test_property_beats_environment() {
        let properties = ResourceProperties {
            environment_name: Some("prod".to_string()),
            artifact_bucket: Some("event-bucket".to_string()),
            ..ResourceProperties::default()
        };
        let config =
            ProvisionerConfig::from_lookup_and_properties(lookup(&REQUIRED), &properties).unwrap();
        assert_eq!(config.environment_name, "prod");
        assert_eq!(config.artifact_bucket, "event-bucket");
        assert_eq!(config.build_project_name, "p");
        assert_eq!(config.layer_name(), "prod-swetest-layer");
    }

    #[test]
    fn test_blank_property_falls_back_to_environment() {
        let properties = ResourceProperties {
            build_project_name: Some("  ".to_string()),
            config_parameter_name: Some(String::new()),
            ..ResourceProperties::default()
        };
        let config =
            ProvisionerConfig::from_lookup_and_properties(lookup(&REQUIRED), &properties).unwrap();
        assert_eq!(config.build_project_name, "p");
        assert_eq!(config.config_parameter_name, "/ns/layer-arn");
    }

    #[test]
    fn test_environment_alone_still_names_missing_variable() {
        let err = ProvisionerConfig::from_lookup_and_properties(
            lookup(&REQUIRED[1..]),
            &ResourceProperties::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProvisionError::Config(ref msg) if msg.contains("BUILD_PROJECT_NAME")));
    }
}
