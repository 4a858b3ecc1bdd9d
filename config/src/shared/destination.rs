use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Where extracted tables are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DestinationConfig {
    pub connection: PgConnectionConfig,
    /// Schema holding the endpoint tables.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Prefix of every table name, tables are named `{table_prefix}_{endpoint}`.
    #[serde(default)]
    pub table_prefix: String,
}

impl DestinationConfig {
    pub const DEFAULT_SCHEMA: &'static str = "public";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema.trim().is_empty() {
            return Err(ValidationError::invalid(
                "destination.schema",
                "must not be empty",
            ));
        }

        self.connection.validate()
    }
}

fn default_schema() -> String {
    DestinationConfig::DEFAULT_SCHEMA.to_string()
}
