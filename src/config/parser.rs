use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Loads a crawl configuration from a TOML file
///
/// Relative paths in `[source]` and `[state]` are resolved against the
/// directory holding the file, so the crawled root and the fingerprint
/// database do not depend on where `burrow` is started from.
///
/// # Errors
///
/// * `ConfigError::Io` - The file could not be read
/// * `ConfigError::Parse` - The file is not valid TOML or a setting has the wrong type
/// * `ConfigError::Validation` - A setting is out of range, such as a `max-depth` of 0
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use burrow::config::load_config;
///
/// let config = load_config(Path::new("burrow.toml")).unwrap();
/// println!("Crawling {}", config.source.root.display());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_hash(path).map(|(config, _)| config)
}

/// Parses and validates configuration text
///
/// Relative paths are resolved against `base`.
pub fn parse_config(content: &str, base: &Path) -> Result<Config, ConfigError> {
    let mut config: Config = toml::from_str(content)?;
    validate(&config)?;

    config.source.root = resolve(base, &config.source.root);
    config.state.fingerprint_path = resolve(base, &config.state.fingerprint_path);
    if let Some(report_path) = config.state.report_path.take() {
        config.state.report_path = Some(resolve(base, &report_path));
    }
    Ok(config)
}

/// Computes the SHA-256 of a configuration file, hex encoded
///
/// The hash is logged when a crawl starts, so a saved report can be matched
/// with the settings that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Loads a configuration together with the hash of the text it was parsed from
///
/// The file is read once, so the hash always describes the loaded settings.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let config = parse_config(&content, base)?;
    Ok((config, hash_content(&content)))
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
