use clap::Subcommand;
use etl::catalog::EndpointCatalog;
use etl::destination::Destination;
use etl::error::EtlResult;
use etl::pipeline::{Pipeline, RunSummary};
use etl::source::PageSource;
use etl::types::ParentParam;
use tracing::info;

/// Column of a parent table holding the ids its children are scoped by.
const PARENT_ID_COLUMN: &str = "id";

/// What a single extractor run extracts.
#[derive(Debug, Clone, Subcommand)]
pub enum Job {
    /// Extracts the `broadcasts` endpoint.
    Broadcasts,
    /// Extracts the `profiles` endpoint.
    Profiles,
    /// Extracts `campaigns`, then the incoming `messages` of every campaign.
    IncomingMessages,
    /// Extracts `campaigns`, then the `sent_messages` of every campaign.
    OutgoingMessages,
    /// Extracts `groups`, then the `group_members` of every group.
    GroupMembers,
    /// Extracts any endpoint of the catalog, without a parent.
    Endpoint {
        /// Endpoint name as listed in the catalog.
        name: String,
    },
}

/// How a job maps onto endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPlan {
    /// One endpoint, extracted once.
    Single { endpoint: String },
    /// A parent endpoint, then a child endpoint once per parent id.
    Parented {
        parent: String,
        child: String,
        param: ParentParam,
    },
}

impl Job {
    pub fn plan(&self) -> JobPlan {
        match self {
            Job::Broadcasts => single("broadcasts"),
            Job::Profiles => single("profiles"),
            Job::IncomingMessages => parented("campaigns", "messages", ParentParam::CampaignId),
            Job::OutgoingMessages => {
                parented("campaigns", "sent_messages", ParentParam::CampaignId)
            }
            Job::GroupMembers => parented("groups", "group_members", ParentParam::GroupId),
            Job::Endpoint { name } => single(name),
        }
    }
}

fn single(endpoint: &str) -> JobPlan {
    JobPlan::Single {
        endpoint: endpoint.to_string(),
    }
}

fn parented(parent: &str, child: &str, param: ParentParam) -> JobPlan {
    JobPlan::Parented {
        parent: parent.to_string(),
        child: child.to_string(),
        param,
    }
}

/// Runs `plan` against `pipeline` and returns the summary of the last extracted endpoint.
pub async fn run_plan<S, D>(
    pipeline: &Pipeline<S, D>,
    catalog: &EndpointCatalog,
    plan: &JobPlan,
    full_rebuild: bool,
    excluded_parent_ids: &[String],
) -> EtlResult<RunSummary>
where
    S: PageSource + Clone + Sync,
    D: Destination + Sync,
{
    match plan {
        JobPlan::Single { endpoint } => {
            let endpoint = catalog.get(endpoint)?;
            pipeline.run(endpoint, full_rebuild).await
        }
        JobPlan::Parented {
            parent,
            child,
            param,
        } => {
            let parent = catalog.get(parent)?;
            let child = catalog.get(child)?;

            // The parent table is loaded before its ids fan out into child sessions.
            let mut session = pipeline.session(parent.clone(), full_rebuild);
            let output = pipeline.extract(&mut session).await?;
            let parent_ids = parent_ids(
                output.batch.distinct_values(PARENT_ID_COLUMN),
                excluded_parent_ids,
            );
            let load = pipeline
                .load(&parent, session.load_mode(), output.batch)
                .await?;

            info!(
                endpoint = %parent.name,
                rows_loaded = load.as_ref().map(|load| load.rows).unwrap_or_default(),
                parents = parent_ids.len(),
                "loaded parent endpoint"
            );

            pipeline
                .run_for_parents(child, full_rebuild, *param, &parent_ids)
                .await
        }
    }
}

fn parent_ids(ids: Vec<String>, excluded: &[String]) -> Vec<String> {
    ids.into_iter()
        .filter(|id| !excluded.contains(id))
        .collect()
}
