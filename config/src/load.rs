use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use rust_cli_config::builder::{ConfigBuilder, DefaultState};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Supported extensions for base and environment configuration files, in lookup order.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Trait implemented by top-level configuration structures.
pub trait Config {
    /// Keys whose environment variable values are split on commas into lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

#[derive(Debug, Clone, Copy)]
enum ConfigFile {
    Base,
    Environment(Environment),
}

impl ConfigFile {
    fn stem(&self) -> &'static str {
        match self {
            ConfigFile::Base => "base",
            ConfigFile::Environment(environment) => environment.as_str(),
        }
    }
}

impl fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFile::Base => f.write_str("base configuration"),
            ConfigFile::Environment(environment) => {
                write!(f, "{environment} environment configuration")
            }
        }
    }
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    #[error("could not locate {description} in `{directory}`; attempted: {attempted}")]
    ConfigurationFileMissing {
        description: String,
        directory: PathBuf,
        attempted: String,
    },

    #[error("failed to load {description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        description: String,
        path: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("failed to build configuration: {0}")]
    Builder(#[source] rust_cli_config::ConfigError),

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),
}

/// Loads hierarchical configuration for the current working directory.
///
/// Reads `configuration/base.(yaml|yml|json)`, then `configuration/{environment}.(yaml|yml|json)`
/// where the environment comes from `APP_ENVIRONMENT`, and finally applies overrides from
/// `APP_`-prefixed environment variables. Nested keys use double underscores
/// (`APP_API__BASE_URL`) and list values are comma-separated.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads hierarchical configuration from an explicit directory and environment.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let base_file = find_configuration_file(directory, ConfigFile::Base)?;
    let environment_file =
        find_configuration_file(directory, ConfigFile::Environment(environment))?;

    let builder = rust_cli_config::Config::builder()
        .add_source(rust_cli_config::File::from(base_file.clone()));
    check_source(&builder, ConfigFile::Base, &base_file)?;

    let builder = builder.add_source(rust_cli_config::File::from(environment_file.clone()));
    check_source(
        &builder,
        ConfigFile::Environment(environment),
        &environment_file,
    )?;

    let builder = builder.add_source(environment_source::<T>());

    builder
        .build()
        .map_err(LoadConfigError::Builder)?
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)
}

fn environment_source<T: Config>() -> rust_cli_config::Environment {
    let mut source = rust_cli_config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        source = source.try_parsing(true).list_separator(LIST_SEPARATOR);

        for key in T::LIST_PARSE_KEYS {
            source = source.with_list_parse_key(key);
        }
    }

    source
}

fn find_configuration_file(directory: &Path, file: ConfigFile) -> Result<PathBuf, LoadConfigError> {
    let candidates: Vec<PathBuf> = CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{}.{extension}", file.stem())))
        .collect();

    if let Some(path) = candidates.iter().find(|path| path.is_file()) {
        return Ok(path.clone());
    }

    let attempted = candidates
        .iter()
        .map(|path| format!("`{}`", path.display()))
        .collect::<Vec<_>>()
        .join(", ");

    Err(LoadConfigError::ConfigurationFileMissing {
        description: file.to_string(),
        directory: directory.to_path_buf(),
        attempted,
    })
}

/// Builds the configuration accumulated so far so a broken file is reported by name.
fn check_source(
    builder: &ConfigBuilder<DefaultState>,
    file: ConfigFile,
    path: &Path,
) -> Result<(), LoadConfigError> {
    builder
        .clone()
        .build()
        .map(|_| ())
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            description: file.to_string(),
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde::Deserialize;
    use uuid::Uuid;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct SampleConfig {
        name: String,
        limit: u32,
        #[serde(default)]
        tags: Vec<String>,
    }

    impl Config for SampleConfig {
        const LIST_PARSE_KEYS: &'static [&'static str] = &["tags"];
    }

    fn config_dir() -> PathBuf {
        let directory = std::env::temp_dir().join(format!("config-test-{}", Uuid::new_v4()));
        fs::create_dir_all(&directory).unwrap();
        directory
    }

    #[test]
    fn environment_file_overrides_base_file() {
        let directory = config_dir();
        fs::write(directory.join("base.yaml"), "name: base\nlimit: 10\n").unwrap();
        fs::write(directory.join("prod.json"), r#"{"limit": 500}"#).unwrap();

        let config: SampleConfig = load_config_from(&directory, Environment::Prod).unwrap();

        assert_eq!(config.name, "base");
        assert_eq!(config.limit, 500);
        assert!(config.tags.is_empty());

        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn missing_environment_file_is_reported() {
        let directory = config_dir();
        fs::write(directory.join("base.yaml"), "name: base\nlimit: 10\n").unwrap();

        let err = load_config_from::<SampleConfig>(&directory, Environment::Dev).unwrap_err();

        assert!(matches!(
            err,
            LoadConfigError::ConfigurationFileMissing { .. }
        ));

        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn missing_directory_is_reported() {
        let directory = std::env::temp_dir().join(format!("missing-{}", Uuid::new_v4()));

        let err = load_config_from::<SampleConfig>(&directory, Environment::Dev).unwrap_err();

        assert!(matches!(
            err,
            LoadConfigError::MissingConfigurationDirectory(_)
        ));
    }
}
