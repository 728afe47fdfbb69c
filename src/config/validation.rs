use crate::config::types::{
    ClientConfig, Config, Credentials, GovernorConfig, HarvestConfig, OutputConfig,
};
use crate::ConfigError;
use url::Url;

const MAX_SUBMISSIONS_PER_COMMUNITY: u32 = 1000;
const MAX_EXPANSION_DEPTH: u32 = 1000;
const MAX_RETRIES: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_client_config(&config.client)?;
    validate_governor_config(&config.governor)?;
    validate_credentials(&config.credentials)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates traversal parameters
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.communities.is_empty() {
        return Err(ConfigError::Validation(
            "at least one community must be configured".to_string(),
        ));
    }

    for community in &config.communities {
        validate_community_name(community)?;
    }

    if config.submissions_per_community < 1
        || config.submissions_per_community > MAX_SUBMISSIONS_PER_COMMUNITY
    {
        return Err(ConfigError::Validation(format!(
            "submissions_per_community must be between 1 and {}, got {}",
            MAX_SUBMISSIONS_PER_COMMUNITY, config.submissions_per_community
        )));
    }

    if config.comment_expansion_depth > MAX_EXPANSION_DEPTH {
        return Err(ConfigError::Validation(format!(
            "comment_expansion_depth must be <= {}, got {}",
            MAX_EXPANSION_DEPTH, config.comment_expansion_depth
        )));
    }

    Ok(())
}

/// Validates a community name: 1-21 characters of letters, digits and underscores
fn validate_community_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.len() > 21 {
        return Err(ConfigError::Validation(format!(
            "community name '{}' must be 1-21 characters long",
            name
        )));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "community name '{}' may only contain letters, digits and underscores",
            name
        )));
    }

    Ok(())
}

/// Validates upstream client configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Url::parse(&config.api_base)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api_base: {}", e)))?;
    Url::parse(&config.auth_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid auth_url: {}", e)))?;

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_retries > MAX_RETRIES {
        return Err(ConfigError::Validation(format!(
            "max_retries must be <= {}, got {}",
            MAX_RETRIES, config.max_retries
        )));
    }

    Ok(())
}

fn validate_governor_config(config: &GovernorConfig) -> Result<(), ConfigError> {
    if config.fallback_wait_secs == 0 {
        return Err(ConfigError::Validation(
            "fallback_wait_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

/// Validates that every credential is present after the environment overlay
fn validate_credentials(credentials: &Credentials) -> Result<(), ConfigError> {
    let required = [
        ("client-id", &credentials.client_id),
        ("client-secret", &credentials.client_secret),
        ("username", &credentials.username),
        ("password", &credentials.password),
    ];

    for (name, value) in required {
        if value.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingCredential(name));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    if config.ledger_path.is_empty() {
        return Err(ConfigError::Validation(
            "ledger_path cannot be empty".to_string(),
        ));
    }

    if matches!(&config.summary_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}
