//! Endpoint catalog loaded from a JSON file.
//!
//! ```json
//! {
//!   "endpoints": {
//!     "broadcasts": {
//!       "plural_key": "broadcasts",
//!       "singular_key": "broadcast",
//!       "api_incremental_key": "start_time",
//!       "db_incremental_key": "delivery_time",
//!       "page_size": 500,
//!       "columns": [{ "name": "id", "type": "int64" }]
//!     }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::types::{ColumnSchema, EndpointDescriptor};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    endpoints: BTreeMap<String, CatalogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogEntry {
    plural_key: String,
    singular_key: String,
    #[serde(default)]
    api_incremental_key: Option<String>,
    #[serde(default)]
    db_incremental_key: Option<String>,
    #[serde(default)]
    page_size: Option<u32>,
    #[serde(default = "default_paginated")]
    paginated: bool,
    columns: Vec<ColumnSchema>,
}

fn default_paginated() -> bool {
    true
}

/// Descriptors of every endpoint a run may extract, keyed by endpoint name.
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    endpoints: BTreeMap<String, Arc<EndpointDescriptor>>,
}

impl EndpointCatalog {
    /// Reads and validates a catalog file.
    pub fn from_file(path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Could not read endpoint catalog",
                path.display(),
                source: err
            )
        })?;

        Self::from_json_str(&contents)
    }

    /// Parses and validates a catalog from JSON text.
    pub fn from_json_str(json: &str) -> EtlResult<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;

        let mut endpoints = BTreeMap::new();
        for (name, entry) in file.endpoints {
            let descriptor = EndpointDescriptor {
                name: name.clone(),
                plural_key: entry.plural_key,
                singular_key: entry.singular_key,
                api_incremental_key: entry.api_incremental_key,
                db_incremental_key: entry.db_incremental_key,
                columns: entry.columns,
                page_size: entry.page_size,
                paginated: entry.paginated,
            };
            validate_descriptor(&descriptor)?;
            endpoints.insert(name, Arc::new(descriptor));
        }

        Ok(Self { endpoints })
    }

    /// Returns the descriptor of `name`.
    pub fn get(&self, name: &str) -> EtlResult<Arc<EndpointDescriptor>> {
        self.endpoints.get(name).cloned().ok_or_else(|| {
            etl_error!(
                ErrorKind::EndpointNotFound,
                "Endpoint is not in the catalog",
                name
            )
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn validate_descriptor(descriptor: &EndpointDescriptor) -> EtlResult<()> {
    let name = &descriptor.name;

    if name.trim().is_empty()
        || descriptor.plural_key.trim().is_empty()
        || descriptor.singular_key.trim().is_empty()
    {
        bail!(
            ErrorKind::ConfigError,
            "Catalog entry has an empty name or wrapper key",
            name
        );
    }

    if descriptor.columns.is_empty() {
        bail!(
            ErrorKind::ConfigError,
            "Catalog entry declares no columns",
            name
        );
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = descriptor
        .columns
        .iter()
        .find(|column| !seen.insert(column.name.as_str()))
    {
        bail!(
            ErrorKind::ConfigError,
            "Catalog entry declares a column twice",
            format!("{name}.{}", duplicate.name)
        );
    }

    if let Some(key) = &descriptor.db_incremental_key
        && !descriptor.has_column(key)
    {
        bail!(
            ErrorKind::ConfigError,
            "Incremental key is not a declared column",
            format!("{name}.{key}")
        );
    }

    if descriptor.page_size == Some(0) {
        bail!(
            ErrorKind::ConfigError,
            "Catalog entry page size must be positive",
            name
        );
    }

    Ok(())
}
