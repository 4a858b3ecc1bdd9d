use config::load_config;
use config::shared::ExtractorConfig;

/// Reads the layered extractor settings and rejects values a run cannot work with, such as a
/// zero request ceiling or inverted page bounds.
pub fn load_extractor_config() -> anyhow::Result<ExtractorConfig> {
    let config = load_config::<ExtractorConfig>()?;
    config.validate()?;

    Ok(config)
}
