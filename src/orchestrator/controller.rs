//! Campaign lifecycle controller.
//!
//! Validates run requests, owns the collaborators and spawns one engine task
//! per campaign. The returned `CampaignHandle` is how callers observe and
//! stop the run.

use crate::engine::fleet::CampaignCreator;
use crate::engine::transport::Connector;
use crate::engine::{CampaignEngine, EngineControl};
use crate::error::CampaignError;
use crate::model::{CampaignEvent, CampaignState, CampaignSummary, RunConfig, Targets};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Stop side of a running campaign. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopHandle {
    ctrl_tx: UnboundedSender<EngineControl>,
    cancel: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request a stop. Never fails; repeated or late calls are no-ops.
    ///
    /// Once this returns the engine applies no further frames or ticks.
    pub fn stop(&self) {
        if self.cancel.swap(true, Ordering::SeqCst) {
            return;
        }
        // The engine may already be gone after a finished campaign.
        let _ = self.ctrl_tx.send(EngineControl::Stop);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Handle to one live campaign.
pub struct CampaignHandle {
    stopper: StopHandle,
    state_rx: watch::Receiver<CampaignState>,
    events: Option<UnboundedReceiver<CampaignEvent>>,
    handle: JoinHandle<Result<CampaignSummary, CampaignError>>,
}

impl CampaignHandle {
    pub fn stop(&self) {
        self.stopper.stop();
    }

    pub fn stopper(&self) -> StopHandle {
        self.stopper.clone()
    }

    /// Latest published snapshot of the campaign state.
    pub fn state(&self) -> CampaignState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CampaignState> {
        self.state_rx.clone()
    }

    /// Take the event stream. Only the first call gets it.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<CampaignEvent>> {
        self.events.take()
    }

    /// Wait for the campaign to end and return its summary.
    pub async fn wait(self) -> Result<CampaignSummary, CampaignError> {
        match self.handle.await {
            Ok(res) => res,
            Err(e) => Err(CampaignError::Transport(format!("campaign task failed: {e}"))),
        }
    }
}

pub struct CampaignController<K: Connector, R: CampaignCreator> {
    base: RunConfig,
    connector: Arc<K>,
    creator: Arc<R>,
    current: Option<StopHandle>,
}

impl<K: Connector, R: CampaignCreator> CampaignController<K, R> {
    /// `base` supplies endpoint, credentials and timeouts; its query and targets are ignored.
    pub fn new(base: RunConfig, connector: K, creator: R) -> Self {
        Self {
            base,
            connector: Arc::new(connector),
            creator: Arc::new(creator),
            current: None,
        }
    }

    /// Start a campaign for `query_text` against `targets`.
    ///
    /// Input is validated before anything is created or opened. Starting a new
    /// campaign stops the previous one. Must be called from within a tokio runtime.
    pub fn start(
        &mut self,
        query_text: &str,
        targets: Targets,
    ) -> Result<CampaignHandle, CampaignError> {
        validate(query_text, &targets, self.base.tick_period)?;

        if let Some(previous) = self.current.take() {
            previous.stop();
        }

        let cfg = RunConfig {
            query: query_text.to_owned(),
            targets,
            ..self.base.clone()
        };
        let (event_tx, event_rx) = mpsc::unbounded_channel::<CampaignEvent>();
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
        let (state_tx, state_rx) = watch::channel(CampaignState::default());
        let cancel = Arc::new(AtomicBool::new(false));

        let engine = CampaignEngine::new(cfg, self.connector.clone(), self.creator.clone());
        let cancel2 = cancel.clone();
        let handle =
            tokio::spawn(async move { engine.run(event_tx, state_tx, cancel2, ctrl_rx).await });

        let stopper = StopHandle { ctrl_tx, cancel };
        self.current = Some(stopper.clone());
        Ok(CampaignHandle {
            stopper,
            state_rx,
            events: Some(event_rx),
            handle,
        })
    }

    /// Stop the most recently started campaign, if any.
    pub fn stop(&mut self) {
        if let Some(current) = self.current.as_ref() {
            current.stop();
        }
    }
}

fn validate(
    query_text: &str,
    targets: &Targets,
    tick_period: std::time::Duration,
) -> Result<(), CampaignError> {
    if tick_period.is_zero() {
        return Err(CampaignError::Usage("tick period must be greater than zero".into()));
    }
    if query_text.trim().is_empty() {
        return Err(CampaignError::Usage("query text must not be empty".into()));
    }
    if targets.is_empty() {
        return Err(CampaignError::Usage(
            "you must select a target with at least one host to run a query".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::timer::TICK_PERIOD;

    #[test]
    fn validation_rejects_blank_query_and_empty_targets() {
        let targets = Targets {
            hosts: vec![1],
            labels: vec![],
        };
        assert!(matches!(validate("", &targets, TICK_PERIOD), Err(CampaignError::Usage(_))));
        assert!(matches!(validate("  \n", &targets, TICK_PERIOD), Err(CampaignError::Usage(_))));
        assert!(matches!(
            validate("select 1", &Targets::default(), TICK_PERIOD),
            Err(CampaignError::Usage(_))
        ));
        assert!(validate("select 1", &targets, TICK_PERIOD).is_ok());
    }

    #[test]
    fn validation_rejects_zero_tick_period() {
        let targets = Targets {
            hosts: vec![1],
            labels: vec![],
        };
        assert!(matches!(
            validate("select 1", &targets, std::time::Duration::ZERO),
            Err(CampaignError::Usage(_))
        ));
    }

    #[tokio::test]
    async fn stop_handle_is_idempotent_without_engine() {
        let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel();
        let stopper = StopHandle {
            ctrl_tx,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        stopper.stop();
        stopper.stop();
        assert!(stopper.is_stop_requested());
        assert!(matches!(ctrl_rx.recv().await, Some(EngineControl::Stop)));
        assert!(ctrl_rx.try_recv().is_err());
        drop(ctrl_rx);
        stopper.stop();
    }
}
