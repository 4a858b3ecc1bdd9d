use std::fmt;

use pg_escape::quote_identifier;

/// A fully qualified Postgres table name consisting of a schema and table name.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct TableName {
    /// The schema name containing the table.
    pub schema: String,
    /// The name of the table within the schema.
    pub name: String,
}

impl TableName {
    pub fn new(schema: String, name: String) -> TableName {
        Self { schema, name }
    }

    /// Builds the table name an endpoint is landed into.
    ///
    /// Tables are named `{prefix}_{endpoint}`, or just `{endpoint}` when the prefix is empty.
    pub fn for_endpoint(schema: &str, prefix: &str, endpoint: &str) -> TableName {
        let name = if prefix.is_empty() {
            endpoint.to_string()
        } else {
            format!("{prefix}_{endpoint}")
        };

        Self::new(schema.to_string(), name)
    }

    /// Returns the table name as a properly quoted Postgres identifier.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}
