//! Live distributed-query campaigns against a fleet server.
//!
//! `orchestrator::CampaignController` creates a campaign, streams per-host
//! results over the results websocket and folds them into a `CampaignState`.

pub mod cli;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod storage;
mod text_summary;

pub use engine::fleet::{CampaignCreator, FleetClient};
pub use engine::transport::{Connector, MemoryChannel, MemoryConnector, MemoryPeer, TransportChannel};
pub use error::CampaignError;
pub use model::{Campaign, CampaignState, CampaignSummary, LifecycleState, Targets};
pub use orchestrator::{CampaignController, CampaignHandle};
