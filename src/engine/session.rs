//! Per-campaign mutable core.
//!
//! A session is owned by exactly one task. Frames and timer ticks are fed to
//! it one at a time, so `CampaignState` only changes through
//! `aggregator::apply` or `on_tick`. Every way a campaign can end goes through
//! `terminate`, and teardown runs only for the call that moved the lifecycle
//! into its terminal state.

use crate::engine::aggregator::{self, Effect};
use crate::engine::decoder::{Decoded, FrameDecoder};
use crate::engine::lifecycle::Lifecycle;
use crate::engine::protocol::OutboundFrame;
use crate::engine::timer::ElapsedTimer;
use crate::engine::transport::TransportChannel;
use crate::error::CampaignError;
use crate::model::{
    Campaign, CampaignEvent, CampaignState, CampaignSummary, InfoEvent, LifecycleState,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Something the session is waiting on produced a value.
#[derive(Debug)]
pub enum Input {
    /// Inbound frame; `None` means the remote side closed the channel.
    Frame(Option<Result<String, CampaignError>>),
    Tick,
}

pub struct CampaignSession<C: TransportChannel> {
    state: CampaignState,
    decoder: FrameDecoder,
    lifecycle: Lifecycle,
    timer: ElapsedTimer,
    channel: Option<C>,
    event_tx: mpsc::UnboundedSender<CampaignEvent>,
    state_tx: watch::Sender<CampaignState>,
}

impl<C: TransportChannel> CampaignSession<C> {
    pub fn new(
        tick_period: Duration,
        event_tx: mpsc::UnboundedSender<CampaignEvent>,
        state_tx: watch::Sender<CampaignState>,
    ) -> Self {
        Self {
            state: CampaignState::default(),
            decoder: FrameDecoder::new(),
            lifecycle: Lifecycle::new(),
            timer: ElapsedTimer::new(tick_period),
            channel: None,
            event_tx,
            state_tx,
        }
    }

    pub fn state(&self) -> &CampaignState {
        &self.state
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn is_terminal(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    #[cfg(test)]
    fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Error for a channel the server closed before `finished`.
    ///
    /// A server `error` frame followed by a close, with no campaign data seen
    /// yet, is a rejected `auth` or `select_campaign`.
    pub fn closed_error(&self) -> CampaignError {
        let reason = self.state.server_errors.last().cloned();
        let saw_data =
            self.state.status.is_some() || self.state.totals.is_some() || self.state.responded > 0;
        match reason {
            Some(msg) if !saw_data => {
                CampaignError::Establishment(format!("server rejected the subscription: {msg}"))
            }
            reason => CampaignError::ChannelClosed(reason),
        }
    }

    pub fn begin_opening(&mut self) {
        match self.lifecycle.begin_opening() {
            Ok(()) => self.emit_lifecycle(),
            Err(err) => tracing::warn!(%err, "session already past idle"),
        }
    }

    /// The channel is open: authenticate, subscribe, start the clock.
    ///
    /// On a failed write the session is torn down and the error returned.
    pub async fn on_open(
        &mut self,
        campaign: Campaign,
        channel: C,
        token: &str,
    ) -> Result<(), CampaignError> {
        if self.is_terminal() {
            // Stopped while the channel was being opened; teardown already ran.
            let mut channel = channel;
            channel.close().await;
            return Ok(());
        }
        if self.lifecycle() == LifecycleState::Idle {
            self.begin_opening();
        }
        self.channel = Some(channel);

        let campaign_id = campaign.id;
        self.state = CampaignState::for_campaign(campaign);
        self.publish();

        let opening = [
            OutboundFrame::Auth {
                token: token.to_owned(),
            },
            OutboundFrame::SelectCampaign { campaign_id },
        ];
        for frame in opening {
            if let Err(err) = self.write(&frame).await {
                self.terminate(LifecycleState::Stopped).await;
                return Err(CampaignError::Establishment(err.to_string()));
            }
        }

        if let Err(err) = self.lifecycle.begin_running() {
            tracing::warn!(%err, "could not enter running state");
            return Ok(());
        }
        self.timer.start();
        self.state.query_is_running = true;
        self.publish();
        self.emit_lifecycle();
        tracing::info!(campaign_id, targeted = self.state.targeted, "subscribed to campaign");
        Ok(())
    }

    async fn write(&mut self, frame: &OutboundFrame) -> Result<(), CampaignError> {
        let text = frame
            .to_text()
            .map_err(|e| CampaignError::Transport(format!("encode frame: {e}")))?;
        match self.channel.as_mut() {
            Some(channel) => channel.send(text).await,
            None => Err(CampaignError::Transport("channel not open".into())),
        }
    }

    /// Wait for the next inbound frame or timer tick.
    pub async fn next_input(&mut self) -> Input {
        let channel = &mut self.channel;
        let timer = &mut self.timer;
        tokio::select! {
            biased;
            frame = recv_or_pending(channel) => Input::Frame(frame),
            _ = timer.tick() => Input::Tick,
        }
    }

    /// Decode and apply one raw frame. Malformed frames end the campaign.
    pub async fn on_frame(&mut self, raw: &str) -> Result<(), CampaignError> {
        if self.is_terminal() {
            return Ok(());
        }
        let frame = match self.decoder.decode(raw) {
            Ok(Decoded::Frame(frame)) => frame,
            Ok(Decoded::Suppressed) => return Ok(()),
            Err(err) => {
                tracing::warn!(%err, "dropping campaign on malformed frame");
                self.terminate(LifecycleState::Stopped).await;
                return Err(err.into());
            }
        };

        let applied = aggregator::apply(std::mem::take(&mut self.state), &frame);
        self.state = applied.state;
        self.publish();

        match applied.effect {
            Effect::None => {}
            Effect::HostResponded { host, outcome } => {
                let _ = self
                    .event_tx
                    .send(CampaignEvent::HostResponded { host, outcome });
            }
            Effect::ServerError(msg) => {
                tracing::warn!(error = %msg, "server reported an error");
                let _ = self
                    .event_tx
                    .send(CampaignEvent::Info(InfoEvent::ServerError(msg)));
            }
            Effect::Finished => {
                self.terminate(LifecycleState::Finished).await;
            }
        }
        Ok(())
    }

    pub fn on_tick(&mut self) {
        if self.is_terminal() || !self.state.query_is_running {
            return;
        }
        self.state.run_query_milliseconds += self.timer.period().as_millis() as u64;
        self.publish();
        let _ = self.event_tx.send(CampaignEvent::Tick {
            run_query_milliseconds: self.state.run_query_milliseconds,
        });
    }

    /// User cancellation. Safe from any state; a no-op once terminal.
    pub async fn stop(&mut self) -> bool {
        self.terminate(LifecycleState::Stopped).await
    }

    /// End the campaign because of `err` and hand the error back.
    pub async fn fail(&mut self, err: CampaignError) -> CampaignError {
        self.terminate(LifecycleState::Stopped).await;
        err
    }

    async fn terminate(&mut self, to: LifecycleState) -> bool {
        if !self.lifecycle.terminate(to) {
            return false;
        }
        self.teardown().await;
        self.emit_lifecycle();
        true
    }

    async fn teardown(&mut self) {
        self.timer.stop();
        if let Some(mut channel) = self.channel.take() {
            channel.close().await;
        }
        self.decoder.reset();
        self.state.query_is_running = false;
        self.publish();
        tracing::info!(
            outcome = ?self.lifecycle.state(),
            responded = self.state.responded,
            targeted = self.state.targeted,
            run_query_milliseconds = self.state.run_query_milliseconds,
            "campaign torn down"
        );
    }

    pub fn summary(&self, started_at_utc: String) -> CampaignSummary {
        CampaignSummary::from_state(&self.state, self.lifecycle.state(), started_at_utc)
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    fn emit_lifecycle(&self) {
        let _ = self.event_tx.send(CampaignEvent::StateChanged {
            state: self.lifecycle.state(),
        });
    }
}

async fn recv_or_pending<C: TransportChannel>(
    channel: &mut Option<C>,
) -> Option<Result<String, CampaignError>> {
    match channel.as_mut() {
        Some(channel) => channel.recv().await,
        None => futures::future::pending().await,
    }
}
