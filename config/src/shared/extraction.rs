use std::time::Duration;

use serde::Deserialize;

use crate::shared::{BatchConfig, ValidationError};

/// Tuning knobs of the extraction engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtractionConfig {
    /// Process-wide ceiling of in-flight page requests.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Default `limit` query parameter, overridable per endpoint in the catalog.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Lower bound of the page count search. Page `min_pages` is assumed to hold results.
    #[serde(default = "default_min_pages")]
    pub min_pages: u32,
    /// Upper bound of the page count search. Page `max_pages` is assumed to be empty.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Page counts above this value are fetched in sequential chunks.
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: u32,
    /// Retry policy of individual page fetches.
    #[serde(default)]
    pub page_retry: PageRetryConfig,
    /// Batching of destination writes.
    #[serde(default)]
    pub load_batch: BatchConfig,
}

impl ExtractionConfig {
    pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 80;
    pub const DEFAULT_PAGE_SIZE: u32 = 500;
    pub const DEFAULT_MIN_PAGES: u32 = 1;
    pub const DEFAULT_MAX_PAGES: u32 = 20000;
    pub const DEFAULT_CHUNK_THRESHOLD: u32 = 500;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrent_requests == 0 {
            return Err(ValidationError::invalid(
                "extraction.max_concurrent_requests",
                "must be greater than 0",
            ));
        }

        if self.page_size == 0 {
            return Err(ValidationError::invalid(
                "extraction.page_size",
                "must be greater than 0",
            ));
        }

        if self.min_pages == 0 {
            return Err(ValidationError::invalid(
                "extraction.min_pages",
                "must be greater than 0",
            ));
        }

        if self.max_pages <= self.min_pages {
            return Err(ValidationError::invalid(
                "extraction.max_pages",
                "must be greater than `min_pages`",
            ));
        }

        if self.chunk_threshold < 2 {
            return Err(ValidationError::invalid(
                "extraction.chunk_threshold",
                "must be at least 2",
            ));
        }

        self.page_retry.validate()?;
        self.load_batch.validate()
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            page_size: default_page_size(),
            min_pages: default_min_pages(),
            max_pages: default_max_pages(),
            chunk_threshold: default_chunk_threshold(),
            page_retry: PageRetryConfig::default(),
            load_batch: BatchConfig::default(),
        }
    }
}

fn default_max_concurrent_requests() -> usize {
    ExtractionConfig::DEFAULT_MAX_CONCURRENT_REQUESTS
}

fn default_page_size() -> u32 {
    ExtractionConfig::DEFAULT_PAGE_SIZE
}

fn default_min_pages() -> u32 {
    ExtractionConfig::DEFAULT_MIN_PAGES
}

fn default_max_pages() -> u32 {
    ExtractionConfig::DEFAULT_MAX_PAGES
}

fn default_chunk_threshold() -> u32 {
    ExtractionConfig::DEFAULT_CHUNK_THRESHOLD
}

/// Fixed-delay retry policy for page fetches.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PageRetryConfig {
    /// Total number of attempts per page before it is dropped.
    #[serde(default = "default_page_max_attempts")]
    pub max_attempts: u32,
    /// Sleep between two attempts of the same page.
    #[serde(default = "default_page_delay_ms")]
    pub delay_ms: u64,
}

impl PageRetryConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_DELAY_MS: u64 = 1000;

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::invalid(
                "extraction.page_retry.max_attempts",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for PageRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_page_max_attempts(),
            delay_ms: default_page_delay_ms(),
        }
    }
}

fn default_page_max_attempts() -> u32 {
    PageRetryConfig::DEFAULT_MAX_ATTEMPTS
}

fn default_page_delay_ms() -> u64 {
    PageRetryConfig::DEFAULT_DELAY_MS
}
