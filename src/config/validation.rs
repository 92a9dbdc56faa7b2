use crate::config::types::{Config, CrawlerConfig, SourceConfig, StateConfig};
use crate::ConfigError;
use std::path::Path;

/// Bounds for `max-depth`
const MAX_DEPTH_RANGE: std::ops::RangeInclusive<u32> = 1..=64;

/// Bounds for `sniff-bytes`
const SNIFF_BYTES_RANGE: std::ops::RangeInclusive<usize> = 16..=65536;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_source_config(&config.source)?;
    validate_state_config(&config.state)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if !MAX_DEPTH_RANGE.contains(&config.max_depth) {
        return Err(ConfigError::Validation(format!(
            "[crawler] max-depth (container nesting limit) must be between {} and {}, got {}",
            MAX_DEPTH_RANGE.start(),
            MAX_DEPTH_RANGE.end(),
            config.max_depth
        )));
    }

    if !SNIFF_BYTES_RANGE.contains(&config.sniff_bytes) {
        return Err(ConfigError::Validation(format!(
            "[crawler] sniff-bytes (bytes read to identify a content type) \
             must be between {} and {}, got {}",
            SNIFF_BYTES_RANGE.start(),
            SNIFF_BYTES_RANGE.end(),
            config.sniff_bytes
        )));
    }

    Ok(())
}

/// Validates source configuration
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    if is_blank(&config.root) {
        return Err(ConfigError::Validation(
            "[source] root (directory to crawl) cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates state configuration
fn validate_state_config(config: &StateConfig) -> Result<(), ConfigError> {
    if is_blank(&config.fingerprint_path) {
        return Err(ConfigError::Validation(
            "[state] fingerprint-path cannot be empty".to_string(),
        ));
    }

    if let Some(report_path) = &config.report_path {
        if is_blank(report_path) {
            return Err(ConfigError::Validation(
                "[state] report-path cannot be empty".to_string(),
            ));
        }
        if report_path == &config.fingerprint_path {
            return Err(ConfigError::Validation(
                "[state] report-path must differ from fingerprint-path".to_string(),
            ));
        }
    }

    Ok(())
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn state(report: Option<&str>) -> StateConfig {
        StateConfig {
            fingerprint_path: PathBuf::from("state/fingerprints.db"),
            report_path: report.map(PathBuf::from),
        }
    }

    #[test]
    fn test_validate_crawler_bounds() {
        let ok = CrawlerConfig::default();
        assert!(validate_crawler_config(&ok).is_ok());

        let zero_depth = CrawlerConfig {
            max_depth: 0,
            ..ok.clone()
        };
        assert!(validate_crawler_config(&zero_depth).is_err());

        let deep = CrawlerConfig {
            max_depth: 65,
            ..ok.clone()
        };
        assert!(validate_crawler_config(&deep).is_err());

        let tiny_sniff = CrawlerConfig {
            sniff_bytes: 8,
            ..ok
        };
        assert!(validate_crawler_config(&tiny_sniff).is_err());
    }

    #[test]
    fn test_validate_source_root() {
        let empty = SourceConfig {
            root: PathBuf::new(),
            follow_symlinks: false,
            include_hidden: false,
        };
        assert!(validate_source_config(&empty).is_err());
    }

    #[test]
    fn test_messages_name_the_section() {
        let tiny_sniff = CrawlerConfig {
            sniff_bytes: 8,
            ..CrawlerConfig::default()
        };
        let message = validate_crawler_config(&tiny_sniff).unwrap_err().to_string();
        assert!(message.contains("[crawler] sniff-bytes"));
        assert!(message.contains("got 8"));

        let message = validate_state_config(&state(Some("state/fingerprints.db")))
            .unwrap_err()
            .to_string();
        assert!(message.contains("[state] report-path"));
    }

    #[test]
    fn test_validate_state_paths() {
        assert!(validate_state_config(&state(None)).is_ok());
        assert!(validate_state_config(&state(Some("state/report.toml"))).is_ok());
        assert!(validate_state_config(&state(Some(""))).is_err());
        assert!(validate_state_config(&state(Some("state/fingerprints.db"))).is_err());
    }
}
