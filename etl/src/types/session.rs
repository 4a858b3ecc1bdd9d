use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use config::shared::ExtractionConfig;

use crate::destination::LoadMode;
use crate::error::{ErrorKind, EtlError};
use crate::etl_error;
use crate::source::PageRequest;
use crate::types::EndpointDescriptor;
use crate::watermark::Watermark;

/// Whether a session rebuilds its table or appends rows newer than the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    FullRebuild,
    Incremental,
}

impl ExtractionMode {
    pub fn from_full_rebuild(full_rebuild: bool) -> Self {
        if full_rebuild {
            ExtractionMode::FullRebuild
        } else {
            ExtractionMode::Incremental
        }
    }
}

/// What an incremental session does when its endpoint declares no destination incremental key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingKeyPolicy {
    /// Switch the session to a full rebuild, so the table is replaced.
    #[default]
    ForceFullRebuild,
    /// Stay incremental without a watermark, so everything is fetched and appended.
    IncrementalWithoutWatermark,
}

/// Query parameter used to scope an endpoint to one parent entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentParam {
    GroupId,
    CampaignId,
    UrlId,
}

impl ParentParam {
    /// Name of the query parameter, which is also the name of the stamped column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParentParam::GroupId => "group_id",
            ParentParam::CampaignId => "campaign_id",
            ParentParam::UrlId => "url_id",
        }
    }
}

impl fmt::Display for ParentParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParentParam {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group_id" => Ok(ParentParam::GroupId),
            "campaign_id" => Ok(ParentParam::CampaignId),
            "url_id" => Ok(ParentParam::UrlId),
            other => Err(etl_error!(
                ErrorKind::ConfigError,
                "Unknown parent parameter",
                other
            )),
        }
    }
}

/// Restricts a session to the children of one parent entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentFilter {
    pub param: ParentParam,
    pub id: String,
}

impl ParentFilter {
    pub fn new(param: ParentParam, id: impl Into<String>) -> Self {
        Self {
            param,
            id: id.into(),
        }
    }
}

/// State of one extraction of one endpoint, optionally scoped to one parent.
///
/// The watermark and page count start unresolved and are filled in by the watermark tracker
/// and the page count resolver before any page is fetched.
#[derive(Debug, Clone)]
pub struct ExtractionSession {
    pub endpoint: Arc<EndpointDescriptor>,
    pub mode: ExtractionMode,
    pub missing_key_policy: MissingKeyPolicy,
    pub parent: Option<ParentFilter>,
    pub watermark: Watermark,
    pub page_count: Option<u32>,
    pub page_size: Option<u32>,
    pub min_pages: u32,
    pub max_pages: u32,
}

impl ExtractionSession {
    pub fn new(
        endpoint: Arc<EndpointDescriptor>,
        mode: ExtractionMode,
        config: &ExtractionConfig,
    ) -> Self {
        let page_size = endpoint.page_size.unwrap_or(config.page_size);

        Self {
            endpoint,
            mode,
            missing_key_policy: MissingKeyPolicy::default(),
            parent: None,
            watermark: Watermark::absent(),
            page_count: None,
            page_size: Some(page_size),
            min_pages: config.min_pages,
            max_pages: config.max_pages,
        }
    }

    pub fn with_parent(mut self, parent: ParentFilter) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_missing_key_policy(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_key_policy = policy;
        self
    }

    pub fn is_full_rebuild(&self) -> bool {
        self.mode == ExtractionMode::FullRebuild
    }

    pub fn load_mode(&self) -> LoadMode {
        match self.mode {
            ExtractionMode::FullRebuild => LoadMode::Replace,
            ExtractionMode::Incremental => LoadMode::Append,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_ref().map(|parent| parent.id.as_str())
    }

    /// Builds the request for `page` with every filter active in this session.
    ///
    /// The incremental parameter is only sent by incremental sessions holding a watermark.
    pub fn page_request(&self, page: u32) -> PageRequest {
        let mut request = PageRequest::new(&self.endpoint.name, page);

        if let Some(limit) = self.page_size {
            request = request.with_param("limit", limit.to_string());
        }

        if let Some(parent) = &self.parent {
            request = request.with_param(parent.param.as_str(), parent.id.clone());
        }

        if !self.is_full_rebuild()
            && let Some(key) = &self.endpoint.api_incremental_key
            && let Some(value) = self.watermark.to_query_value()
        {
            request = request.with_param(key, value);
        }

        request
    }
}
