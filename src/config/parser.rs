use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads, parses, and validates the tracker configuration at `path`
///
/// Unknown sections are ignored; missing optional sections take their
/// defaults. Any validation failure is returned before the config is used.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use podrank::config::load_config;
///
/// let config = load_config(Path::new("podrank.toml")).unwrap();
/// println!("Tracking {} seeded targets", config.targets.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Hex SHA-256 fingerprint of the config file, logged at startup
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(fingerprint(&content))
}

/// Loads the configuration together with the fingerprint of the same bytes
///
/// The file is read once, so the hash always describes the config returned.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, fingerprint(&content)))
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
