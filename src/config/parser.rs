use crate::config::types::{Config, Credentials};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variables that override the `[credentials]` table
pub const ENV_CLIENT_ID: &str = "HARVEST_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "HARVEST_CLIENT_SECRET";
pub const ENV_USERNAME: &str = "HARVEST_USERNAME";
pub const ENV_PASSWORD: &str = "HARVEST_PASSWORD";

/// Loads and parses a configuration file from the given path
///
/// Credentials found in the process environment take precedence over the
/// values in the file.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use subreddit_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Communities: {:?}", config.harvest.communities);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;

    apply_credential_overrides(&mut config.credentials, |key| std::env::var(key).ok());

    validate(&config)?;

    Ok(config)
}

/// Parses configuration TOML without touching the environment or validating
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Overlays credentials from a key lookup (normally the process environment)
///
/// Empty values are ignored so an exported-but-blank variable does not wipe
/// a credential from the file.
pub fn apply_credential_overrides<F>(credentials: &mut Credentials, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let pick = |key: &str, current: &mut Option<String>| {
        if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
            *current = Some(value);
        }
    };

    pick(ENV_CLIENT_ID, &mut credentials.client_id);
    pick(ENV_CLIENT_SECRET, &mut credentials.client_secret);
    pick(ENV_USERNAME, &mut credentials.username);
    pick(ENV_PASSWORD, &mut credentials.password);
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored with every run in the ledger so runs made with
/// different parameters can be told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
