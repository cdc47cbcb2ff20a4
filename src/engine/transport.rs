//! The socket abstraction the campaign stream runs over.
//!
//! `Connector` opens one `TransportChannel` per campaign. The websocket
//! implementation lives in `engine::websocket`; `MemoryChannel` is an
//! in-process pair used when embedding the engine without a network, and by
//! the tests.

use crate::error::CampaignError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub trait TransportChannel: Send {
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), CampaignError>> + Send;

    /// Next text frame. `None` once the remote side closed the channel.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, CampaignError>>> + Send;

    /// Close the channel. Closing an already closed channel is not an error.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

pub trait Connector: Send + Sync + 'static {
    type Channel: TransportChannel + 'static;

    fn open(&self) -> impl Future<Output = Result<Self::Channel, CampaignError>> + Send;

    /// Human-readable endpoint, for logs and info events.
    fn endpoint(&self) -> String;
}

#[derive(Debug, Default)]
struct PeerShared {
    sent: Mutex<Vec<String>>,
    closes: AtomicUsize,
    closed: AtomicBool,
}

/// Client half of an in-process channel.
#[derive(Debug)]
pub struct MemoryChannel {
    inbound: mpsc::UnboundedReceiver<String>,
    shared: Arc<PeerShared>,
}

/// Remote half of an in-process channel: pushes frames and observes the client.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    inbound_tx: mpsc::UnboundedSender<String>,
    shared: Arc<PeerShared>,
}

impl MemoryChannel {
    pub fn pair() -> (MemoryChannel, MemoryPeer) {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let shared = Arc::new(PeerShared::default());
        (
            MemoryChannel {
                inbound,
                shared: shared.clone(),
            },
            MemoryPeer { inbound_tx, shared },
        )
    }
}

impl MemoryPeer {
    /// Deliver one raw frame to the client. Returns `false` if the client is gone.
    pub fn push(&self, raw: impl Into<String>) -> bool {
        self.inbound_tx.send(raw.into()).is_ok()
    }

    /// Frames the client has written, in order.
    pub fn sent(&self) -> Vec<String> {
        self.shared
            .sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// How many times the client called `close`.
    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl TransportChannel for MemoryChannel {
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), CampaignError>> + Send {
        let res = if self.shared.closed.load(Ordering::SeqCst) {
            Err(CampaignError::Transport("send on closed channel".into()))
        } else {
            match self.shared.sent.lock() {
                Ok(mut sent) => {
                    sent.push(text);
                    Ok(())
                }
                Err(_) => Err(CampaignError::Transport("peer state poisoned".into())),
            }
        };
        async move { res }
    }

    async fn recv(&mut self) -> Option<Result<String, CampaignError>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
        self.inbound.close();
    }
}

enum MemoryMode {
    Ready(Mutex<Option<MemoryChannel>>),
    Refuse(String),
    Hang,
}

/// Hands out a single prepared `MemoryChannel`.
pub struct MemoryConnector {
    mode: MemoryMode,
    opens: Arc<AtomicUsize>,
}

impl MemoryConnector {
    pub fn new(channel: MemoryChannel) -> Self {
        Self::with_mode(MemoryMode::Ready(Mutex::new(Some(channel))))
    }

    /// Every open attempt fails with the given reason.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self::with_mode(MemoryMode::Refuse(reason.into()))
    }

    /// Open attempts never complete; exercises the open timeout.
    pub fn hanging() -> Self {
        Self::with_mode(MemoryMode::Hang)
    }

    fn with_mode(mode: MemoryMode) -> Self {
        Self {
            mode,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of open attempts, readable after the connector moved.
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }
}

impl Connector for MemoryConnector {
    type Channel = MemoryChannel;

    fn open(&self) -> impl Future<Output = Result<MemoryChannel, CampaignError>> + Send {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (ready, hang) = match &self.mode {
            MemoryMode::Ready(slot) => (
                slot.lock()
                    .ok()
                    .and_then(|mut slot| slot.take())
                    .ok_or_else(|| CampaignError::Establishment("channel already used".into())),
                false,
            ),
            MemoryMode::Refuse(reason) => (Err(CampaignError::Establishment(reason.clone())), false),
            MemoryMode::Hang => (
                Err(CampaignError::Establishment("unreachable".into())),
                true,
            ),
        };
        async move {
            if hang {
                futures::future::pending::<()>().await;
            }
            ready
        }
    }

    fn endpoint(&self) -> String {
        "memory".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut channel, peer) = MemoryChannel::pair();
        channel.send("hello".into()).await.unwrap();
        assert_eq!(peer.sent(), vec!["hello".to_string()]);
        assert!(peer.push("world"));
        assert_eq!(channel.recv().await.unwrap().unwrap(), "world");
    }

    #[tokio::test]
    async fn close_is_counted_and_stops_delivery() {
        let (mut channel, peer) = MemoryChannel::pair();
        peer.push("late");
        channel.close().await;
        assert!(channel.recv().await.is_none());
        assert!(channel.send("x".into()).await.is_err());
        channel.close().await;
        assert_eq!(peer.close_count(), 2);
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn connector_hands_out_one_channel() {
        let (channel, _peer) = MemoryChannel::pair();
        let connector = MemoryConnector::new(channel);
        let opens = connector.open_counter();
        assert!(connector.open().await.is_ok());
        assert!(matches!(
            connector.open().await,
            Err(CampaignError::Establishment(_))
        ));
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }
}
