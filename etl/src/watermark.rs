//! Incremental watermarks read back from the destination.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use crate::destination::{ColumnFilter, Destination};
use crate::error::EtlResult;
use crate::types::{ExtractionMode, ExtractionSession, MissingKeyPolicy, TableName};

/// Greatest incremental value already persisted for a session, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Watermark(Option<DateTime<Utc>>);

impl Watermark {
    pub fn absent() -> Self {
        Self(None)
    }

    pub fn at(value: DateTime<Utc>) -> Self {
        Self(Some(value))
    }

    pub fn value(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    /// Value sent as the incremental query parameter, e.g. `2024-01-01T00:00:00Z`.
    pub fn to_query_value(&self) -> Option<String> {
        self.0
            .map(|value| value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// Resolves the watermark of a session against a destination table.
#[derive(Debug)]
pub struct WatermarkTracker<'a, D> {
    destination: &'a D,
}

impl<'a, D> WatermarkTracker<'a, D>
where
    D: Destination,
{
    pub fn new(destination: &'a D) -> Self {
        Self { destination }
    }

    /// Stores the resolved watermark in the session and returns it.
    ///
    /// Full rebuilds never have a watermark. Endpoints without a destination incremental key
    /// have none either, and the session mode is adjusted by its [`MissingKeyPolicy`].
    pub async fn resolve(
        &self,
        table: &TableName,
        session: &mut ExtractionSession,
    ) -> EtlResult<Watermark> {
        session.watermark = Watermark::absent();

        let Some(key) = session.endpoint.db_incremental_key.clone() else {
            if session.missing_key_policy == MissingKeyPolicy::ForceFullRebuild
                && !session.is_full_rebuild()
            {
                info!(
                    endpoint = %session.endpoint.name,
                    "endpoint has no incremental key, switching to a full rebuild"
                );
                session.mode = ExtractionMode::FullRebuild;
            }

            return Ok(session.watermark);
        };

        if session.is_full_rebuild() {
            return Ok(session.watermark);
        }

        let filter = session.parent.as_ref().map(|parent| ColumnFilter {
            column: parent.param.as_str().to_string(),
            value: parent.id.clone(),
        });

        let latest = self
            .destination
            .max_timestamp(table, &key, filter.as_ref())
            .await?;
        session.watermark = latest.map(Watermark::at).unwrap_or_default();

        info!(
            endpoint = %session.endpoint.name,
            parent_id = session.parent_id().unwrap_or("-"),
            watermark = ?session.watermark.to_query_value(),
            "resolved watermark"
        );

        Ok(session.watermark)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use config::shared::ExtractionConfig;

    use super::*;
    use crate::destination::LoadMode;
    use crate::destination::memory::MemoryDestination;
    use crate::types::{
        Cell, ColumnSchema, ColumnType, EndpointDescriptor, ParentFilter, ParentParam, TableRow,
    };

    fn endpoint(db_key: Option<&str>) -> Arc<EndpointDescriptor> {
        Arc::new(EndpointDescriptor {
            name: "messages".to_string(),
            plural_key: "messages".to_string(),
            singular_key: "message".to_string(),
            api_incremental_key: Some("start_time".to_string()),
            db_incremental_key: db_key.map(str::to_string),
            columns: vec![
                ColumnSchema::new("id", ColumnType::Integer),
                ColumnSchema::new("campaign_id", ColumnType::String),
                ColumnSchema::new("received_at", ColumnType::Timestamp),
            ],
            page_size: None,
            paginated: true,
        })
    }

    fn table() -> TableName {
        TableName::for_endpoint("public", "mc", "messages")
    }

    async fn seeded_destination() -> MemoryDestination {
        let destination = MemoryDestination::new();
        let rows = [("42", 3), ("42", 7), ("9", 20)]
            .into_iter()
            .enumerate()
            .map(|(id, (campaign, day))| {
                TableRow::new(vec![
                    Cell::I64(id as i64),
                    Cell::String(campaign.to_string()),
                    Cell::TimestampTz(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()),
                ])
            })
            .collect();
        destination
            .write_table(&table(), &endpoint(None).columns, rows, LoadMode::Append)
            .await
            .unwrap();

        destination
    }

    #[test]
    fn query_value_uses_utc_suffix() {
        let watermark = Watermark::at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        assert_eq!(
            watermark.to_query_value().as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(Watermark::absent().to_query_value(), None);
    }

    #[tokio::test]
    async fn incremental_watermark_is_scoped_to_parent() {
        let destination = seeded_destination().await;
        let mut session = ExtractionSession::new(
            endpoint(Some("received_at")),
            ExtractionMode::Incremental,
            &ExtractionConfig::default(),
        )
        .with_parent(ParentFilter::new(ParentParam::CampaignId, "42"));

        let watermark = WatermarkTracker::new(&destination)
            .resolve(&table(), &mut session)
            .await
            .unwrap();

        assert_eq!(
            watermark.value(),
            Some(Utc.with_ymd_and_hms(2024, 1, 7, 0, 0, 0).unwrap())
        );
        assert_eq!(session.watermark, watermark);
    }

    #[tokio::test]
    async fn full_rebuild_ignores_stored_rows() {
        let destination = seeded_destination().await;
        let mut session = ExtractionSession::new(
            endpoint(Some("received_at")),
            ExtractionMode::FullRebuild,
            &ExtractionConfig::default(),
        );

        let watermark = WatermarkTracker::new(&destination)
            .resolve(&table(), &mut session)
            .await
            .unwrap();

        assert!(watermark.is_absent());
    }

    #[tokio::test]
    async fn missing_key_forces_full_rebuild_by_default() {
        let destination = MemoryDestination::new();
        let mut session = ExtractionSession::new(
            endpoint(None),
            ExtractionMode::Incremental,
            &ExtractionConfig::default(),
        );

        WatermarkTracker::new(&destination)
            .resolve(&table(), &mut session)
            .await
            .unwrap();

        assert_eq!(session.mode, ExtractionMode::FullRebuild);
    }

    #[tokio::test]
    async fn missing_key_can_stay_incremental() {
        let destination = MemoryDestination::new();
        let mut session = ExtractionSession::new(
            endpoint(None),
            ExtractionMode::Incremental,
            &ExtractionConfig::default(),
        )
        .with_missing_key_policy(MissingKeyPolicy::IncrementalWithoutWatermark);

        let watermark = WatermarkTracker::new(&destination)
            .resolve(&table(), &mut session)
            .await
            .unwrap();

        assert!(watermark.is_absent());
        assert_eq!(session.mode, ExtractionMode::Incremental);
    }

    #[tokio::test]
    async fn empty_destination_yields_absent_watermark() {
        let destination = MemoryDestination::new();
        let mut session = ExtractionSession::new(
            endpoint(Some("received_at")),
            ExtractionMode::Incremental,
            &ExtractionConfig::default(),
        );

        let watermark = WatermarkTracker::new(&destination)
            .resolve(&table(), &mut session)
            .await
            .unwrap();

        assert!(watermark.is_absent());
        assert_eq!(session.mode, ExtractionMode::Incremental);
    }
}
