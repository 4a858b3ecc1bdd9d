//! Shared configuration types for extraction runs.

mod api;
mod base;
mod batch;
mod connection;
mod destination;
mod extraction;
mod extractor;

pub use api::{ApiConfig, RetryConfig};
pub use base::ValidationError;
pub use batch::BatchConfig;
pub use connection::{DefaultPgConnectionOptions, IntoConnectOptions, PgConnectionConfig, TlsConfig};
pub use destination::DestinationConfig;
pub use extraction::{ExtractionConfig, PageRetryConfig};
pub use extractor::ExtractorConfig;
