//! Application-level orchestration utilities.
//!
//! This module owns campaign lifecycle control (start/stop) and post-run processing
//! such as auto-save and exports. The CLI calls into this module to keep
//! responsibilities separated.

mod controller;
mod post_process;

pub use controller::{CampaignController, CampaignHandle, StopHandle};
pub(crate) use post_process::process_campaign_completion;
