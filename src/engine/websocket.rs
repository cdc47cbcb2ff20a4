use crate::engine::transport::{Connector, TransportChannel};
use crate::error::CampaignError;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const RESULTS_WEBSOCKET_PATH: &str = "api/latest/fleet/results/websocket";

/// Map the fleet base URL onto the results websocket endpoint (`http -> ws`, `https -> wss`).
pub fn results_websocket_url(fleet_url: &str) -> Result<Url, CampaignError> {
    let mut base = Url::parse(fleet_url)
        .map_err(|e| CampaignError::Usage(format!("invalid fleet URL {fleet_url:?}: {e}")))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let mut url = base
        .join(RESULTS_WEBSOCKET_PATH)
        .map_err(|e| CampaignError::Usage(format!("invalid fleet URL {fleet_url:?}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CampaignError::Usage(format!(
                "unsupported URL scheme {other:?}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| CampaignError::Usage(format!("cannot use scheme {scheme} for {fleet_url}")))?;
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
}

impl WsConnector {
    pub fn new(fleet_url: &str) -> Result<Self, CampaignError> {
        Ok(Self {
            url: results_websocket_url(fleet_url)?,
        })
    }
}

impl Connector for WsConnector {
    type Channel = WsChannel;

    async fn open(&self) -> Result<WsChannel, CampaignError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| CampaignError::Establishment(format!("connect {}: {e}", self.url)))?;
        Ok(WsChannel { ws, closed: false })
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

pub struct WsChannel {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl TransportChannel for WsChannel {
    async fn send(&mut self, text: String) -> Result<(), CampaignError> {
        self.ws
            .send(Message::Text(text))
            .await
            .map_err(|e| CampaignError::Transport(format!("write failed: {e}")))
    }

    async fn recv(&mut self) -> Option<Result<String, CampaignError>> {
        if self.closed {
            return None;
        }
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite on the next read.
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(CampaignError::Transport(format!("read failed: {e}"))))
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.ws.close(None).await {
            tracing::debug!(error = %e, "websocket close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_http_schemes_to_websocket() {
        assert_eq!(
            results_websocket_url("https://fleet.example.com").unwrap().as_str(),
            "wss://fleet.example.com/api/latest/fleet/results/websocket"
        );
        assert_eq!(
            results_websocket_url("http://localhost:8080/").unwrap().as_str(),
            "ws://localhost:8080/api/latest/fleet/results/websocket"
        );
        assert_eq!(
            results_websocket_url("https://example.com/fleet").unwrap().as_str(),
            "wss://example.com/fleet/api/latest/fleet/results/websocket"
        );
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(matches!(
            results_websocket_url("not a url"),
            Err(CampaignError::Usage(_))
        ));
        assert!(matches!(
            results_websocket_url("ftp://example.com"),
            Err(CampaignError::Usage(_))
        ));
    }
}
