//! AWS client construction.
//!
//! Supports multiple credential sources, in order of priority:
//! 1. Hardcoded credentials (access_key, secret_key, session_token)
//! 2. AWS profile from ~/.aws/credentials
//! 3. Default credential chain (environment, instance profile, etc.)

use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_dynamodb::config::{Credentials, Region};
use serde::Deserialize;
use std::time::Duration;

use crate::errors::{Error, Result};

/// Connection settings shared by the DynamoDB and KMS clients.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    pub profile: Option<String>,
    /// Custom endpoint for local testing (localstack, DynamoDB Local).
    pub endpoint_url: Option<String>,
    /// Seconds.
    pub connect_timeout: Option<f64>,
    /// Seconds.
    pub read_timeout: Option<f64>,
    pub max_retries: Option<u32>,
}

impl AwsConfig {
    /// Settings from `AWS_REGION`, `AWS_PROFILE` and `AWS_ENDPOINT_URL`.
    pub fn from_env() -> Self {
        Self {
            region: std::env::var("AWS_REGION")
                .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                .ok(),
            profile: std::env::var("AWS_PROFILE").ok(),
            endpoint_url: std::env::var("AWS_ENDPOINT_URL").ok(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.access_key, &self.secret_key) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::Configuration(
                    "access_key and secret_key must be set together".to_string(),
                ));
            }
            _ => {}
        }
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
        ] {
            if let Some(secs) = value {
                timeout(name, secs)?;
            }
        }
        Ok(())
    }
}

fn timeout(name: &str, secs: f64) -> Result<Duration> {
    if secs <= 0.0 {
        return Err(Error::Configuration(format!(
            "{} must be a positive number of seconds, got {}",
            name, secs
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Configuration(format!("invalid {} of {} seconds: {}", name, secs, e)))
}

async fn load_sdk_config(config: &AwsConfig) -> Result<SdkConfig> {
    config.validate()?;

    // Region priority: param > env/profile > default
    let region_provider = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else("us-east-1");

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

    if let (Some(ak), Some(sk)) = (&config.access_key, &config.secret_key) {
        let creds = Credentials::new(
            ak,
            sk,
            config.session_token.clone(),
            None,
            "dynamodb-encryption-hardcoded",
        );
        loader = loader.credentials_provider(creds);
    } else if let Some(profile_name) = &config.profile {
        let provider = ProfileFileCredentialsProvider::builder()
            .profile_name(profile_name)
            .build();
        loader = loader.credentials_provider(provider);
    }

    if config.connect_timeout.is_some() || config.read_timeout.is_some() {
        let mut timeouts = TimeoutConfig::builder();
        if let Some(secs) = config.connect_timeout {
            timeouts = timeouts.connect_timeout(timeout("connect_timeout", secs)?);
        }
        if let Some(secs) = config.read_timeout {
            timeouts = timeouts.read_timeout(timeout("read_timeout", secs)?);
        }
        loader = loader.timeout_config(timeouts.build());
    }
    if let Some(max) = config.max_retries {
        let attempts = max.saturating_add(1);
        loader = loader.retry_config(RetryConfig::standard().with_max_attempts(attempts));
    }

    Ok(loader.load().await)
}

/// Build a DynamoDB client from `config`.
pub async fn build_dynamodb_client(config: &AwsConfig) -> Result<aws_sdk_dynamodb::Client> {
    let sdk_config = load_sdk_config(config).await?;
    let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
    if let Some(url) = &config.endpoint_url {
        builder = builder.endpoint_url(url);
    }
    tracing::debug!(endpoint = ?config.endpoint_url, "built DynamoDB client");
    Ok(aws_sdk_dynamodb::Client::from_conf(builder.build()))
}

/// Build a KMS client from the same settings, optionally in another region.
pub async fn build_kms_client(
    config: &AwsConfig,
    region_override: Option<&str>,
) -> Result<aws_sdk_kms::Client> {
    let mut config = config.clone();
    if let Some(region) = region_override {
        config.region = Some(region.to_string());
    }
    let sdk_config = load_sdk_config(&config).await?;
    let mut builder = aws_sdk_kms::config::Builder::from(&sdk_config);
    if let Some(url) = &config.endpoint_url {
        builder = builder.endpoint_url(url);
    }
    Ok(aws_sdk_kms::Client::from_conf(builder.build()))
}
