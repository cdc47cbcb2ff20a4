//! Fleet REST collaborator: creates the campaign the stream subscribes to.

use crate::error::{CampaignError, CONFLICT_MESSAGE};
use crate::model::{Campaign, RunConfig, Targets};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

const CREATE_CAMPAIGN_PATH: &str = "api/latest/fleet/queries/run";
const ALREADY_CREATED: &str = "resource already created";

/// Creates a distributed query campaign for a query and target set.
pub trait CampaignCreator: Send + Sync + 'static {
    fn create_campaign(
        &self,
        query: &str,
        targets: &Targets,
    ) -> impl Future<Output = Result<Campaign, CampaignError>> + Send;
}

#[derive(Debug, Serialize)]
struct CreateCampaignRequest<'a> {
    query: &'a str,
    selected: &'a Targets,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateCampaignResponse {
    Wrapped { campaign: Campaign },
    Bare(Campaign),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

#[derive(Clone)]
pub struct FleetClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl FleetClient {
    pub fn new(cfg: &RunConfig) -> Result<Self, CampaignError> {
        let mut base_url = Url::parse(&cfg.fleet_url)
            .map_err(|e| CampaignError::Usage(format!("invalid fleet URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.open_timeout.max(Duration::from_secs(1)))
            .build()
            .map_err(|e| CampaignError::Establishment(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            token: cfg.token.clone(),
        })
    }

    fn create_url(&self) -> Result<Url, CampaignError> {
        self.base_url
            .join(CREATE_CAMPAIGN_PATH)
            .map_err(|e| CampaignError::Usage(format!("invalid fleet URL: {e}")))
    }
}

impl CampaignCreator for FleetClient {
    async fn create_campaign(&self, query: &str, targets: &Targets) -> Result<Campaign, CampaignError> {
        let url = self.create_url()?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&CreateCampaignRequest {
                query,
                selected: targets,
            })
            .send()
            .await
            .map_err(|e| CampaignError::Establishment(format!("create campaign: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CampaignError::Establishment(format!("create campaign body: {e}")))?;
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }
        let parsed: CreateCampaignResponse = serde_json::from_str(&body)
            .map_err(|e| CampaignError::Establishment(format!("unexpected create campaign response: {e}")))?;
        Ok(match parsed {
            CreateCampaignResponse::Wrapped { campaign } => campaign,
            CreateCampaignResponse::Bare(campaign) => campaign,
        })
    }
}

/// Turn a non-2xx create response into an error, singling out duplicate campaigns.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> CampaignError {
    let reason = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| {
            b.errors
                .into_iter()
                .map(|r| r.reason)
                .find(|r| !r.is_empty())
                .unwrap_or(b.message)
        })
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    if status == StatusCode::CONFLICT || reason.contains(ALREADY_CREATED) {
        tracing::warn!(%status, "{}", CONFLICT_MESSAGE);
        return CampaignError::Conflict;
    }
    CampaignError::Establishment(format!("create campaign failed ({status}): {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_api_shape() {
        let targets = Targets {
            hosts: vec![1, 2],
            labels: vec![7],
        };
        let body = serde_json::to_value(CreateCampaignRequest {
            query: "select 1",
            selected: &targets,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"query": "select 1", "selected": {"hosts": [1, 2], "labels": [7]}})
        );
    }

    #[test]
    fn accepts_bare_and_wrapped_campaigns() {
        let bare: CreateCampaignResponse =
            serde_json::from_str(r#"{"id":5,"query":"select 1","hosts_count":{"total":3}}"#).unwrap();
        let wrapped: CreateCampaignResponse = serde_json::from_str(
            r#"{"campaign":{"id":5,"query":"select 1","hosts_count":{"total":3}}}"#,
        )
        .unwrap();
        for parsed in [bare, wrapped] {
            let campaign = match parsed {
                CreateCampaignResponse::Wrapped { campaign } => campaign,
                CreateCampaignResponse::Bare(campaign) => campaign,
            };
            assert_eq!(campaign.id, 5);
            assert_eq!(campaign.hosts_count.total, 3);
        }
    }

    #[test]
    fn duplicate_campaign_is_a_conflict() {
        let err = classify_failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Validation Failed","errors":[{"name":"base","reason":"resource already created"}]}"#,
        );
        assert!(matches!(err, CampaignError::Conflict));
        assert_eq!(err.to_string(), CONFLICT_MESSAGE);

        assert!(matches!(
            classify_failure(StatusCode::CONFLICT, ""),
            CampaignError::Conflict
        ));
    }

    #[test]
    fn other_failures_carry_the_reason() {
        let err = classify_failure(
            StatusCode::FORBIDDEN,
            r#"{"message":"forbidden","errors":[{"reason":"forbidden"}]}"#,
        );
        let CampaignError::Establishment(msg) = err else {
            panic!("expected establishment error");
        };
        assert!(msg.contains("403"));
        assert!(msg.contains("forbidden"));
    }
}
