//! Data source and node sync commands

use crate::api::sync::{HistoryQuery, SyncNode, TransferRequest, TransferStrategy};
use crate::error::Result;
use crate::state::AppState;
use clap::{Args, Subcommand};
use serde_json::{json, Map, Value};

use super::to_json;

#[derive(Debug, Clone, Subcommand)]
pub enum SyncCommand {
    /// Availability of every data source
    Sources,
    /// Data source currently in use
    Current,
    /// State of the last stock basics sync
    Status,
    /// Run the stock basics sync
    Run {
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Comma separated source names in order of preference
        #[arg(long)]
        preferred_sources: Option<String>,
    },
    /// Test connectivity of one or all data sources
    TestSources {
        #[arg(long)]
        source: Option<String>,
    },
    /// Suggested source order
    Recommendations,
    /// Past sync runs
    History {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Clear the sync cache
    ClearCache,
    /// Manage sync nodes
    Nodes {
        #[command(subcommand)]
        action: NodeCommand,
    },
    /// Node sync tasks
    Tasks {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        skip: Option<u32>,
    },
    /// One node sync task
    Task { task_id: String },
    /// Pull a collection from a node
    Pull(TransferArgs),
    /// Push a collection to a node
    Push(TransferArgs),
    /// Collections that can be synced between nodes
    Collections,
}

#[derive(Debug, Clone, Subcommand)]
pub enum NodeCommand {
    List,
    Get { node_id: String },
    Create(NodeArgs),
    /// Replace a node; `--node-id` in the body may rename it
    Update {
        id: String,
        #[command(flatten)]
        node: NodeArgs,
    },
    Delete { node_id: String },
    Test { node_id: String },
}

#[derive(Debug, Clone, Args)]
pub struct NodeArgs {
    #[arg(long)]
    pub node_id: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub url: String,
    #[arg(long, env = "MARKETDATA_ADMIN_NODE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long, default_value_t = false)]
    pub inactive: bool,
}

impl NodeArgs {
    fn node(&self) -> SyncNode {
        SyncNode {
            node_id: self.node_id.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            api_key: self.api_key.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            status: if self.inactive { "inactive" } else { "active" }.to_string(),
            ..SyncNode::default()
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct TransferArgs {
    /// Remote node id
    #[arg(long)]
    pub node: String,
    #[arg(long)]
    pub collection: String,
    #[arg(long, default_value_t = false)]
    pub full: bool,
    /// JSON object restricting the transferred rows
    #[arg(long)]
    pub filter: Option<String>,
}

impl TransferArgs {
    fn request(&self) -> Result<TransferRequest> {
        let filter = match &self.filter {
            Some(raw) => Some(serde_json::from_str::<Map<String, Value>>(raw)?),
            None => None,
        };
        Ok(TransferRequest {
            node: self.node.clone(),
            collection: self.collection.clone(),
            strategy: if self.full {
                TransferStrategy::Full
            } else {
                TransferStrategy::Incremental
            },
            filter,
        })
    }
}

pub async fn run(state: &AppState, command: &SyncCommand) -> Result<Value> {
    state.require_auth()?;
    let api = &state.sync;
    match command {
        SyncCommand::Sources => to_json(&api.sources_status().await?),
        SyncCommand::Current => to_json(&api.current_source().await?),
        SyncCommand::Status => to_json(&api.status().await?),
        SyncCommand::Run {
            force,
            preferred_sources,
        } => to_json(&api.run_stock_basics(*force, preferred_sources.as_deref()).await?),
        SyncCommand::TestSources { source } => to_json(&api.test_sources(source.as_deref()).await?),
        SyncCommand::Recommendations => to_json(&api.recommendations().await?),
        SyncCommand::History {
            page,
            page_size,
            status,
        } => {
            let query = HistoryQuery {
                page: *page,
                page_size: *page_size,
                status: status.clone(),
            };
            to_json(&api.history(&query).await?)
        }
        SyncCommand::ClearCache => Ok(json!({ "cleared": api.clear_cache().await? })),
        SyncCommand::Nodes { action } => match action {
            NodeCommand::List => to_json(&api.nodes().await?),
            NodeCommand::Get { node_id } => to_json(&api.node(node_id).await?),
            NodeCommand::Create(args) => to_json(&api.create_node(&args.node()).await?),
            NodeCommand::Update { id, node } => {
                to_json(&api.update_node(id, &node.node()).await?)
            }
            NodeCommand::Delete { node_id } => Ok(json!({ "message": api.delete_node(node_id).await? })),
            NodeCommand::Test { node_id } => to_json(&api.test_node(node_id).await?),
        },
        SyncCommand::Tasks { limit, skip } => to_json(&api.tasks(*limit, *skip).await?),
        SyncCommand::Task { task_id } => to_json(&api.task(task_id).await?),
        SyncCommand::Pull(args) => to_json(&api.pull(&args.request()?).await?),
        SyncCommand::Push(args) => to_json(&api.push(&args.request()?).await?),
        SyncCommand::Collections => to_json(&api.syncable_collections().await?),
    }
}
