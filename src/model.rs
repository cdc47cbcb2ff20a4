use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// One result row as reported by a host: column name to value.
pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub fleet_url: String,
    #[serde(skip_serializing, default)]
    pub token: String,
    pub query: String,
    pub targets: Targets,
    #[serde(with = "humantime_serde")]
    pub open_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub tick_period: Duration,
    pub user_agent: String,
}

/// Hosts and labels selected to receive the query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(default)]
    pub hosts: Vec<u64>,
    #[serde(default)]
    pub labels: Vec<u64>,
}

impl Targets {
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.labels.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsCount {
    pub total: u64,
}

/// A distributed query run as created by the fleet server. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: u64,
    pub query: String,
    #[serde(default)]
    pub hosts_count: HostsCount,
}

/// Target totals pushed by the server while the campaign runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTotals {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub online: u64,
    #[serde(default)]
    pub offline: u64,
    #[serde(default)]
    pub missing_in_action: u64,
}

/// Server-side view of campaign progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub expected_results: u64,
    #[serde(default)]
    pub actual_results: u64,
}

impl CampaignStatus {
    pub const FINISHED: &'static str = "finished";

    pub fn is_finished(&self) -> bool {
        self.status == Self::FINISHED
    }
}

/// A host that reported a query execution error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostError {
    pub host_hostname: String,
    pub host_display_name: String,
    pub error: String,
}

/// Classification of one host's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Results { rows: usize },
    NoResults,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Idle,
    Opening,
    Running,
    Finished,
    Stopped,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Finished | LifecycleState::Stopped)
    }
}

/// Mutable aggregate for one campaign run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignState {
    pub campaign: Option<Campaign>,
    pub query_is_running: bool,
    pub run_query_milliseconds: u64,
    pub targeted: u64,
    pub responded: u64,
    pub responded_with_results: u64,
    pub responded_no_results: u64,
    pub responded_with_errors: u64,
    pub totals: Option<TargetTotals>,
    pub status: Option<CampaignStatus>,
    // Rows carry host_hostname / host_display_name columns for export.
    pub query_results: Vec<Row>,
    pub errors: Vec<HostError>,
    pub server_errors: Vec<String>,
}

impl CampaignState {
    /// Seed a fresh state from the campaign returned by the create call.
    pub fn for_campaign(campaign: Campaign) -> Self {
        Self {
            targeted: campaign.hosts_count.total,
            campaign: Some(campaign),
            ..Default::default()
        }
    }

    /// Share of targeted hosts that responded, rounded to the nearest percent.
    pub fn percent_responded(&self) -> u64 {
        crate::metrics::percent_of(self.responded, self.targeted)
    }

    pub fn counters_consistent(&self) -> bool {
        self.responded
            == self.responded_with_results + self.responded_no_results + self.responded_with_errors
            && self.responded <= self.targeted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CampaignEvent {
    StateChanged {
        state: LifecycleState,
    },
    HostResponded {
        host: String,
        outcome: Outcome,
    },
    Tick {
        run_query_milliseconds: u64,
    },
    Info(InfoEvent),
    Completed {
        // Boxed: the summary carries all result rows.
        summary: Box<CampaignSummary>,
    },
}

/// Structured info events emitted by the engine and consumed by CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    CampaignCreated { id: u64, targeted: u64 },
    ChannelOpened { url: String },
    ServerError(String),
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::CampaignCreated { id, targeted } => {
                format!("Created campaign {} targeting {} host(s)", id, targeted)
            }
            InfoEvent::ChannelOpened { url } => format!("Streaming results from {}", url),
            InfoEvent::ServerError(msg) => format!("Server error: {}", msg),
        }
    }
}

/// Final snapshot of a campaign run, used for printing, auto-save and export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub started_at_utc: String,
    pub ended_at_utc: String,
    pub outcome: LifecycleState,
    pub campaign: Option<Campaign>,
    pub run_query_milliseconds: u64,
    pub targeted: u64,
    pub responded: u64,
    pub responded_with_results: u64,
    pub responded_no_results: u64,
    pub responded_with_errors: u64,
    pub percent_responded: u64,
    #[serde(default)]
    pub totals: Option<TargetTotals>,
    #[serde(default)]
    pub query_results: Vec<Row>,
    #[serde(default)]
    pub errors: Vec<HostError>,
    #[serde(default)]
    pub server_errors: Vec<String>,
}

impl CampaignSummary {
    pub fn from_state(state: &CampaignState, outcome: LifecycleState, started_at_utc: String) -> Self {
        Self {
            started_at_utc,
            ended_at_utc: now_rfc3339(),
            outcome,
            campaign: state.campaign.clone(),
            run_query_milliseconds: state.run_query_milliseconds,
            targeted: state.targeted,
            responded: state.responded,
            responded_with_results: state.responded_with_results,
            responded_no_results: state.responded_no_results,
            responded_with_errors: state.responded_with_errors,
            percent_responded: state.percent_responded(),
            totals: state.totals,
            query_results: state.query_results.clone(),
            errors: state.errors.clone(),
            server_errors: state.server_errors.clone(),
        }
    }
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}
