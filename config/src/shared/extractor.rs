use std::path::PathBuf;

use serde::Deserialize;

use crate::Config;
use crate::shared::{ApiConfig, DestinationConfig, ExtractionConfig, ValidationError};

/// Top-level configuration of the extractor binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtractorConfig {
    pub api: ApiConfig,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// JSON file describing every endpoint and its declared columns.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Rebuild tables from scratch instead of appending rows newer than the watermark.
    #[serde(default)]
    pub full_rebuild: bool,
    /// Parent ids that are never extracted, e.g. the account-wide master campaign.
    #[serde(default)]
    pub excluded_parent_ids: Vec<String>,
}

impl ExtractorConfig {
    pub const DEFAULT_CATALOG_PATH: &'static str = "configuration/catalog.json";

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.api.validate()?;
        self.destination.validate()?;
        self.extraction.validate()
    }
}

impl Config for ExtractorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["excluded_parent_ids"];
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(ExtractorConfig::DEFAULT_CATALOG_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "api": {
            "base_url": "https://secure.mcommons.com/api",
            "username": "user",
            "password": "pass"
        },
        "destination": {
            "connection": {
                "host": "localhost",
                "port": 5432,
                "name": "warehouse",
                "username": "loader",
                "password": null
            }
        }
    }"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ExtractorConfig = serde_json::from_str(MINIMAL).unwrap();

        assert!(config.validate().is_ok());
        assert!(!config.full_rebuild);
        assert!(config.excluded_parent_ids.is_empty());
        assert_eq!(config.destination.schema, "public");
        assert_eq!(config.api.request_timeout_secs, 3600);
        assert_eq!(
            config.catalog_path,
            PathBuf::from(ExtractorConfig::DEFAULT_CATALOG_PATH)
        );
    }

    #[test]
    fn invalid_base_url_fails_validation() {
        let mut config: ExtractorConfig = serde_json::from_str(MINIMAL).unwrap();
        config.api.base_url = "secure.mcommons.com".to_string();

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { .. })
        ));
    }
}
