pub mod aggregator;
pub mod decoder;
pub mod fleet;
pub mod lifecycle;
pub mod protocol;
pub mod session;
pub mod timer;
pub mod transport;
pub mod websocket;

use crate::error::CampaignError;
use crate::model::{
    now_rfc3339, Campaign, CampaignEvent, CampaignState, CampaignSummary, InfoEvent, RunConfig,
};
use fleet::CampaignCreator;
use session::{CampaignSession, Input};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{mpsc, watch};
use transport::Connector;

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Stop the campaign: halt the clock and close the channel.
    Stop,
}

/// Drives one campaign from creation to teardown inside a single task.
pub struct CampaignEngine<K: Connector, R: CampaignCreator> {
    cfg: RunConfig,
    connector: Arc<K>,
    creator: Arc<R>,
}

impl<K: Connector, R: CampaignCreator> CampaignEngine<K, R> {
    pub fn new(cfg: RunConfig, connector: Arc<K>, creator: Arc<R>) -> Self {
        Self {
            cfg,
            connector,
            creator,
        }
    }

    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<CampaignEvent>,
        state_tx: watch::Sender<CampaignState>,
        cancel: Arc<AtomicBool>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> Result<CampaignSummary, CampaignError> {
        let started_at = now_rfc3339();
        let mut session: CampaignSession<K::Channel> =
            CampaignSession::new(self.cfg.tick_period, event_tx.clone(), state_tx);
        session.begin_opening();

        // Creating the campaign and opening the channel can both be interrupted by a stop.
        let opened = tokio::select! {
            biased;
            _ = control_rx.recv() => None,
            res = self.establish(&event_tx) => Some(res),
        };
        let (campaign, channel) = match opened {
            None => {
                session.stop().await;
                return Ok(self.complete(&session, started_at, &event_tx));
            }
            Some(Err(err)) => return Err(session.fail(err).await),
            Some(Ok(pair)) => pair,
        };

        session.on_open(campaign, channel, &self.cfg.token).await?;

        while !session.is_terminal() {
            if cancel.load(Ordering::SeqCst) {
                session.stop().await;
                break;
            }
            tokio::select! {
                biased;
                _ = control_rx.recv() => {
                    // A dropped handle counts as a stop as well.
                    session.stop().await;
                }
                input = session.next_input() => {
                    // A stop may have been requested while the input was pending.
                    if cancel.load(Ordering::SeqCst) {
                        session.stop().await;
                        continue;
                    }
                    match input {
                        Input::Tick => session.on_tick(),
                        Input::Frame(Some(Ok(raw))) => session.on_frame(&raw).await?,
                        Input::Frame(Some(Err(err))) => return Err(session.fail(err).await),
                        Input::Frame(None) => {
                            let err = session.closed_error();
                            return Err(session.fail(err).await);
                        }
                    }
                }
            }
        }

        Ok(self.complete(&session, started_at, &event_tx))
    }

    async fn establish(
        &self,
        event_tx: &mpsc::UnboundedSender<CampaignEvent>,
    ) -> Result<(Campaign, K::Channel), CampaignError> {
        let campaign = self
            .creator
            .create_campaign(&self.cfg.query, &self.cfg.targets)
            .await?;
        tracing::info!(campaign_id = campaign.id, targeted = campaign.hosts_count.total, "campaign created");
        let _ = event_tx.send(CampaignEvent::Info(InfoEvent::CampaignCreated {
            id: campaign.id,
            targeted: campaign.hosts_count.total,
        }));

        let endpoint = self.connector.endpoint();
        let channel = tokio::time::timeout(self.cfg.open_timeout, self.connector.open())
            .await
            .map_err(|_| {
                CampaignError::Establishment(format!(
                    "timed out after {:?} opening {endpoint}",
                    self.cfg.open_timeout
                ))
            })??;
        let _ = event_tx.send(CampaignEvent::Info(InfoEvent::ChannelOpened { url: endpoint }));
        Ok((campaign, channel))
    }

    fn complete(
        &self,
        session: &CampaignSession<K::Channel>,
        started_at: String,
        event_tx: &mpsc::UnboundedSender<CampaignEvent>,
    ) -> CampaignSummary {
        let summary = session.summary(started_at);
        let _ = event_tx.send(CampaignEvent::Completed {
            summary: Box::new(summary.clone()),
        });
        summary
    }
}
